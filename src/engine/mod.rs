//! Engine layer: dynamic binding discovery, FFI guards, and prompt glue.

use crate::diag::DiagSink;
use crate::error::EngineError;

pub mod binding;
pub mod guard;
pub mod prompt;

/// Seam between the dispatcher and the engine lifecycle.
///
/// Production is [`EngineManager`]; tests substitute canned engines to
/// exercise the bound paths without a real library on disk.
pub trait Engine {
    /// Drive discovery to a terminal state; `true` when bound.
    fn ensure_loaded(&mut self, sink: &mut dyn DiagSink) -> bool;

    /// Run one generate call against the bound engine.
    fn invoke(&self, prompt: &str) -> Result<String, EngineError>;
}

impl Engine for binding::EngineManager {
    fn ensure_loaded(&mut self, sink: &mut dyn DiagSink) -> bool {
        binding::EngineManager::ensure_loaded(self, sink)
    }

    fn invoke(&self, prompt: &str) -> Result<String, EngineError> {
        binding::EngineManager::invoke(self, prompt)
    }
}

pub use binding::{
    platform_lib_name, Binding, EngineConfig, EngineManager, ENV_ENGINE_BASE_DIR,
    ENV_ENGINE_CONFIG, ENV_ENGINE_LIB,
};
pub use guard::StdoutGate;
pub use prompt::{make_prompt, PLACEHOLDER_TARGET};
