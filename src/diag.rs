//! Diagnostics side-channel.
//!
//! Diagnostic frames describe internal state transitions (library probes,
//! invocation outcomes, per-request sizes) so an opaque dynamic-loading
//! failure can be debugged from the extension console. They are advisory:
//! the far end may ignore every one of them, and a failure to emit one must
//! never disturb the request/response cadence. The reserved `"diag"` type
//! keeps them distinguishable from protocol responses.

use std::io::Write;

use serde::Serialize;

use crate::protocol::framing::FrameWriter;

/// One advisory out-of-band frame.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Always `"diag"` — reserved, never a protocol response type.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Which subsystem emitted this (`"host"`, `"engine"`, `"probe"`).
    pub path: String,
    /// Input size relevant to the event, if any.
    pub in_len: usize,
    /// Output size relevant to the event, if any.
    pub out_len: usize,
    /// Free-form note.
    pub note: String,
}

impl Diagnostic {
    /// Create a diagnostic with zero sizes.
    pub fn note(path: &str, note: impl Into<String>) -> Self {
        Self::sized(path, 0, 0, note)
    }

    /// Create a diagnostic carrying input/output sizes.
    pub fn sized(path: &str, in_len: usize, out_len: usize, note: impl Into<String>) -> Self {
        Self {
            kind: "diag",
            path: path.to_string(),
            in_len,
            out_len,
            note: note.into(),
        }
    }

    /// Serialize to the wire JSON.
    pub fn encode(&self) -> String {
        // A Diagnostic cannot fail to serialize: all fields are strings and
        // integers. serde_json still returns Result, so fall back to a bare
        // note rather than panicking in the side-channel.
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"type":"diag","path":"host","in_len":0,"out_len":0,"note":"{}"}}"#,
                crate::protocol::escape(&self.note)
            )
        })
    }
}

/// Sink for diagnostics.
///
/// The binding manager reports through this seam instead of owning the
/// transport; production uses [`TransportSink`], tests use [`CollectSink`].
pub trait DiagSink {
    /// Emit one diagnostic. Implementations must not propagate failure.
    fn emit(&mut self, diag: Diagnostic);
}

/// Sink that writes diagnostic frames through the shared outbound writer.
///
/// Holding the writer mutably for the duration of the emit keeps diagnostic
/// bytes from interleaving with a response frame.
pub struct TransportSink<'a, W> {
    writer: &'a mut FrameWriter<W>,
}

impl<'a, W: Write> TransportSink<'a, W> {
    /// Borrow the shared frame writer as a diagnostics sink.
    pub fn new(writer: &'a mut FrameWriter<W>) -> Self {
        Self { writer }
    }
}

impl<W: Write> DiagSink for TransportSink<'_, W> {
    fn emit(&mut self, diag: Diagnostic) {
        let encoded = diag.encode();
        if let Err(e) = self.writer.write_frame(encoded.as_bytes()) {
            // Advisory channel: log and move on.
            tracing::warn!("diagnostic frame dropped: {e}");
        }
    }
}

/// Sink that collects diagnostics in memory (tests, warmup probes).
#[derive(Debug, Default)]
pub struct CollectSink {
    /// Collected diagnostics, in emit order.
    pub entries: Vec<Diagnostic>,
}

impl DiagSink for CollectSink {
    fn emit(&mut self, diag: Diagnostic) {
        self.entries.push(diag);
    }
}

/// Sink that discards everything.
pub struct NullSink;

impl DiagSink for NullSink {
    fn emit(&mut self, _diag: Diagnostic) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_wire_shape() {
        let d = Diagnostic::sized("engine", 12, 34, "invoke ok");
        let v: serde_json::Value = serde_json::from_str(&d.encode()).unwrap();
        assert_eq!(v["type"], "diag");
        assert_eq!(v["path"], "engine");
        assert_eq!(v["in_len"], 12);
        assert_eq!(v["out_len"], 34);
        assert_eq!(v["note"], "invoke ok");
    }

    #[test]
    fn test_diag_type_is_reserved_value() {
        let d = Diagnostic::note("host", "x");
        assert_eq!(d.kind, "diag");
        // Must never collide with protocol response types.
        assert_ne!(d.kind, "pong");
    }

    #[test]
    fn test_transport_sink_writes_one_frame() {
        let mut writer = FrameWriter::new(Vec::new());
        {
            let mut sink = TransportSink::new(&mut writer);
            sink.emit(Diagnostic::note("host", "startup"));
        }
        let bytes = writer.into_inner();
        let len = u32::from_ne_bytes(bytes[..4].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), 4 + len);
        let v: serde_json::Value = serde_json::from_slice(&bytes[4..]).unwrap();
        assert_eq!(v["type"], "diag");
    }

    #[test]
    fn test_collect_sink_orders_entries() {
        let mut sink = CollectSink::default();
        sink.emit(Diagnostic::note("host", "first"));
        sink.emit(Diagnostic::note("engine", "second"));
        assert_eq!(sink.entries.len(), 2);
        assert_eq!(sink.entries[0].note, "first");
        assert_eq!(sink.entries[1].note, "second");
    }
}
