//! Request dispatcher: the protocol state machine.
//!
//! Reads one frame, fully processes it, writes exactly one response, then
//! reads the next — strict alternation, no in-flight overlap. End-of-stream
//! on the inbound side is the normal shutdown path. Engine trouble of any
//! kind becomes response *data* (an `"Error"`-tagged suggestions envelope),
//! never a missing or extra frame.

use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::json;

use crate::diag::{DiagSink, Diagnostic, TransportSink};
use crate::engine::{make_prompt, Engine, EngineManager};
use crate::error::{EngineStage, Result};
use crate::heuristic;
use crate::protocol::envelope::{
    normalize_engine_output, suggestions_envelope, EMPTY_ENGINE_FALLBACK,
};
use crate::protocol::extract::string_field;
use crate::protocol::framing::{FrameReader, FrameWriter};

/// Longest request preview carried in a receive diagnostic.
const RECV_PREVIEW_LEN: usize = 64;

/// The protocol loop over one inbound/outbound stream pair.
pub struct Dispatcher<R, W, E = EngineManager> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    engine: E,
}

impl<R: Read, W: Write, E: Engine> Dispatcher<R, W, E> {
    /// Build a dispatcher over a transport pair and an engine.
    pub fn new(reader: FrameReader<R>, writer: FrameWriter<W>, engine: E) -> Self {
        Self {
            reader,
            writer,
            engine,
        }
    }

    /// Best-effort engine warmup, diagnosed but never fatal.
    ///
    /// Runs the first load attempt before any request arrives so the first
    /// `analyze` does not pay discovery latency.
    pub fn warmup(&mut self) {
        let mut sink = TransportSink::new(&mut self.writer);
        let bound = self.engine.ensure_loaded(&mut sink);
        sink.emit(Diagnostic::note(
            "host",
            if bound {
                "startup-load-ok"
            } else {
                "startup-load-fail"
            },
        ));
        if !bound {
            tracing::warn!("engine warmup failed; heuristic fallback active");
        }
    }

    /// Run the request/response loop until end-of-stream.
    ///
    /// # Errors
    ///
    /// Only transport faults propagate; every decoded request is answered.
    pub fn run(&mut self) -> Result<()> {
        while let Some(frame) = self.reader.read_frame()? {
            let raw = String::from_utf8_lossy(&frame).into_owned();
            self.emit(Diagnostic::sized(
                "host",
                raw.len(),
                0,
                format!("recv: {}", preview(&raw)),
            ));

            let response = self.route(&raw);
            self.writer.write_frame(response.as_bytes())?;
        }
        tracing::debug!("inbound stream closed; session over");
        Ok(())
    }

    /// Map one decoded request to exactly one response payload.
    fn route(&mut self, raw: &str) -> String {
        match string_field(raw, "type").as_str() {
            "ping" => {
                // Attempt the binding now so a later analyze is warm.
                let mut sink = TransportSink::new(&mut self.writer);
                self.engine.ensure_loaded(&mut sink);
                self.emit(Diagnostic::note("host", "recv-ping"));
                json!({"type": "pong"}).to_string()
            }
            "analyze" => {
                let outcome = catch_unwind(AssertUnwindSafe(|| self.handle_analyze(raw)));
                outcome.unwrap_or_else(|_| {
                    tracing::error!("analyze handler panicked");
                    suggestions_envelope(&[
                        "Error",
                        &format!("{}: analyze handler panicked", EngineStage::Unexpected),
                    ])
                })
            }
            other => {
                tracing::debug!("unknown request type {other:?}");
                json!({"error": "unknown type"}).to_string()
            }
        }
    }

    /// Handle an `analyze` request end to end.
    fn handle_analyze(&mut self, raw: &str) -> String {
        let focus = string_field(raw, "focus");
        let context = string_field(raw, "context");
        let body = string_field(raw, "body");

        let target = if focus.trim().is_empty() {
            body.trim()
        } else {
            focus.trim()
        };
        self.emit(Diagnostic::sized(
            "host",
            target.len(),
            context.len(),
            "analyze-target",
        ));

        let mut sink = TransportSink::new(&mut self.writer);
        if !self.engine.ensure_loaded(&mut sink) {
            return heuristic::classify(&body);
        }

        let prompt = make_prompt(target);
        self.emit(Diagnostic::sized("engine", target.len(), 0, "invoke-before"));

        match self.engine.invoke(&prompt) {
            Ok(output) if output.trim().is_empty() => {
                self.emit(Diagnostic::sized(
                    "engine",
                    target.len(),
                    EMPTY_ENGINE_FALLBACK.len(),
                    "empty->fallback",
                ));
                EMPTY_ENGINE_FALLBACK.to_string()
            }
            Ok(output) => {
                let response = normalize_engine_output(&output);
                self.emit(Diagnostic::sized(
                    "engine",
                    target.len(),
                    response.len(),
                    "ok",
                ));
                response
            }
            Err(e) => {
                tracing::warn!("engine invocation failed: {e}");
                self.emit(Diagnostic::sized(
                    "engine",
                    target.len(),
                    0,
                    format!("invoke-error: {e}"),
                ));
                suggestions_envelope(&["Error", &e.to_string()])
            }
        }
    }

    fn emit(&mut self, diag: Diagnostic) {
        TransportSink::new(&mut self.writer).emit(diag);
    }

    /// Tear down into the transport halves (tests).
    pub fn into_parts(self) -> (FrameReader<R>, FrameWriter<W>, E) {
        (self.reader, self.writer, self.engine)
    }
}

/// Char-boundary-safe prefix for receive diagnostics.
fn preview(raw: &str) -> String {
    if raw.len() <= RECV_PREVIEW_LEN {
        return raw.to_string();
    }
    let mut end = RECV_PREVIEW_LEN;
    while end > 0 && !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_input_untruncated() {
        assert_eq!(preview("{\"type\":\"ping\"}"), "{\"type\":\"ping\"}");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "한".repeat(100);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert!(p.len() <= RECV_PREVIEW_LEN + 3);
    }
}
