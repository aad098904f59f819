//! Error types for the tonebridge host.

use thiserror::Error;

/// Main error type for host operations.
///
/// Only transport setup and transport write failures surface here; everything
/// at or below the engine binding is converted to data (see [`EngineError`])
/// so a misbehaving engine can never take the protocol loop down.
#[derive(Debug, Error)]
pub enum HostError {
    /// I/O error on the framed transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (host-originated messages only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using HostError.
pub type Result<T> = std::result::Result<T, HostError>;

/// Stage label attached to an engine invocation failure.
///
/// These names are part of the diagnostic vocabulary the extension console
/// shows to operators, so they are stable strings, not Debug output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStage {
    /// Library discovery or export resolution failed.
    Init,
    /// The prompt could not be handed to the engine (e.g. interior NUL).
    Prompt,
    /// The stdout gate could not be armed or restored.
    CwdGuard,
    /// The generate call itself failed.
    Query,
    /// The engine returned no usable text.
    EmptyOutput,
    /// Anything that escaped the layers below (panic at the FFI boundary).
    Unexpected,
}

impl EngineStage {
    /// Stable wire label for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineStage::Init => "init",
            EngineStage::Prompt => "prompt",
            EngineStage::CwdGuard => "cwd-guard",
            EngineStage::Query => "query",
            EngineStage::EmptyOutput => "empty-output",
            EngineStage::Unexpected => "unexpected-failure",
        }
    }
}

impl std::fmt::Display for EngineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single engine invocation.
///
/// Never propagated as a protocol fault: the dispatcher wraps it into an
/// `"Error"`-tagged suggestions envelope and answers the request normally.
#[derive(Debug, Error)]
#[error("{stage}: {message}")]
pub struct EngineError {
    /// Which stage of the invocation failed.
    pub stage: EngineStage,
    /// Human-readable detail.
    pub message: String,
}

impl EngineError {
    /// Create an engine error with a stage label.
    pub fn new(stage: EngineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}
