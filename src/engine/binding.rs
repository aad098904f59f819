//! Engine binding manager: discovery, loading, and invocation of the
//! external rewrite engine.
//!
//! The engine is a shared library exposing a small C ABI (see the symbol
//! constants below). The manager walks a fixed, ordered candidate list,
//! loads the first library that works, resolves two mandatory and two
//! optional exports, and then never probes again for the process lifetime:
//!
//! ```text
//! Unattempted ──► Loading ──► Bound
//!                    │
//!                    └──────► Unavailable   (permanent)
//! ```
//!
//! Terminal states are memoized so a broken install costs one probe pass,
//! not one failing syscall chain per request. Every probe emits a
//! [`Diagnostic`] regardless of outcome — a missing library is an
//! operational problem someone has to debug from the extension console.

use std::ffi::{c_char, c_int, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::diag::{DiagSink, Diagnostic};
use crate::error::{EngineError, EngineStage};
use crate::engine::guard::{FreeFn, OwnedEngineText, StdoutGate};

/// Environment override for the engine library path.
pub const ENV_ENGINE_LIB: &str = "TONEBRIDGE_ENGINE_LIB";
/// Environment override for the engine's model/asset base directory.
pub const ENV_ENGINE_BASE_DIR: &str = "TONEBRIDGE_ENGINE_BASE_DIR";
/// Environment override for the engine's config file path.
pub const ENV_ENGINE_CONFIG: &str = "TONEBRIDGE_ENGINE_CONFIG";

/// Mandatory export: `generate(text) -> owned-text-or-null`.
pub const SYM_GENERATE: &[u8] = b"generate_polite_rewrite\0";
/// Mandatory export: releases a buffer returned by generate.
pub const SYM_FREE: &[u8] = b"polite_rewrite_free\0";
/// Optional export: pushes the asset base directory into the engine.
pub const SYM_SET_BASE_DIR: &[u8] = b"polite_rewrite_set_base_dir\0";
/// Optional export: pushes the config file path into the engine.
pub const SYM_SET_CONFIG_PATH: &[u8] = b"polite_rewrite_set_config_path\0";

/// Config file expected beside the loaded library when no override is set.
pub const DEFAULT_CONFIG_NAME: &str = "engine_config.json";
/// Bundle directory probed relative to the executable.
pub const BUNDLE_DIR_NAME: &str = "engine_bundle";

type GenerateFn = unsafe extern "C" fn(*const c_char) -> *const c_char;
type SetPathFn = unsafe extern "C" fn(*const c_char) -> c_int;

/// Platform file name of the engine library.
pub fn platform_lib_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "rewrite_engine.dll"
    } else if cfg!(target_os = "macos") {
        "librewrite_engine.dylib"
    } else {
        "librewrite_engine.so"
    }
}

/// Explicit discovery configuration.
///
/// Read once from the environment at startup; absence of any override is
/// never an error, it only changes which candidate wins first. Changing the
/// configuration after binding resets the binding rather than mutating it
/// in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineConfig {
    /// Full path to the engine library, overriding discovery.
    pub lib_override: Option<PathBuf>,
    /// Asset base directory pushed via the optional export.
    pub base_dir_override: Option<PathBuf>,
    /// Config file path pushed via the optional export.
    pub config_override: Option<PathBuf>,
}

impl EngineConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self {
            lib_override: std::env::var_os(ENV_ENGINE_LIB).map(PathBuf::from),
            base_dir_override: std::env::var_os(ENV_ENGINE_BASE_DIR).map(PathBuf::from),
            config_override: std::env::var_os(ENV_ENGINE_CONFIG).map(PathBuf::from),
        }
    }

    /// Build the ordered candidate list for library discovery.
    ///
    /// Order is significant and fixed: environment override, then the
    /// executable-relative default, then the bundle-relative probe. First
    /// successful load wins; there is no scoring.
    pub fn candidates(&self, exe_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut list = Vec::with_capacity(3);
        if let Some(lib) = &self.lib_override {
            list.push(lib.clone());
        }
        if let Some(dir) = exe_dir {
            list.push(dir.join(platform_lib_name()));
            list.push(dir.join(BUNDLE_DIR_NAME).join(platform_lib_name()));
        }
        list
    }
}

/// A loaded, capability-resolved engine handle.
///
/// Owns the library for the process lifetime; the raw function pointers
/// stay valid as long as `_lib` is alive.
pub struct Binding {
    _lib: Library,
    generate: GenerateFn,
    free: FreeFn,
    set_base_dir: Option<SetPathFn>,
    set_config_path: Option<SetPathFn>,
    /// Directory the library was loaded from; default source for the
    /// base-dir and config-path capabilities.
    lib_dir: PathBuf,
}

impl Binding {
    /// Whether the optional configuration capabilities resolved.
    pub fn has_config_capabilities(&self) -> (bool, bool) {
        (self.set_base_dir.is_some(), self.set_config_path.is_some())
    }

    /// Run one generate call, guarding stdout and ownership.
    fn generate_text(&self, prompt: &str) -> Result<String, EngineError> {
        let c_prompt = CString::new(prompt)
            .map_err(|_| EngineError::new(EngineStage::Prompt, "prompt contains NUL byte"))?;

        let gate = StdoutGate::engage()?;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: the symbol was resolved from the live library and the
            // prompt pointer outlives the call.
            unsafe { (self.generate)(c_prompt.as_ptr()) }
        }));
        drop(gate); // restore stdout before anything else can write

        let ptr = outcome
            .map_err(|_| EngineError::new(EngineStage::Query, "engine call panicked"))?;

        // SAFETY: ptr came from generate; free is the matching release.
        match unsafe { OwnedEngineText::from_raw(ptr, self.free) } {
            Some(text) => Ok(text.to_string_lossy()),
            None => Ok(String::new()),
        }
    }

    /// Invoke one optional path-setting capability, diagnosing the outcome.
    fn push_path(&self, setter: SetPathFn, label: &str, path: &Path, sink: &mut dyn DiagSink) {
        let Ok(c_path) = CString::new(path.to_string_lossy().into_owned()) else {
            sink.emit(Diagnostic::note(
                "engine",
                format!("{label} skipped: path has NUL byte"),
            ));
            return;
        };
        // SAFETY: setter resolved from the live library; path outlives call.
        let rc = unsafe { setter(c_path.as_ptr()) };
        let verdict = if rc == 0 { "OK" } else { "FAIL" };
        sink.emit(Diagnostic::note(
            "engine",
            format!("{label} {verdict} {}", path.display()),
        ));
    }
}

enum BindingState {
    Unattempted,
    Bound(Binding),
    Unavailable,
}

/// Owns the binding lifecycle and the discovery state machine.
pub struct EngineManager {
    state: BindingState,
    config: EngineConfig,
    load_attempts: usize,
}

impl EngineManager {
    /// Create a manager with explicit configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: BindingState::Unattempted,
            config,
            load_attempts: 0,
        }
    }

    /// Create a manager configured from the environment.
    pub fn from_env() -> Self {
        Self::new(EngineConfig::from_env())
    }

    /// Number of library load probes performed so far.
    ///
    /// Stays constant once the state machine reaches a terminal state.
    pub fn load_attempts(&self) -> usize {
        self.load_attempts
    }

    /// Whether a binding is currently available.
    pub fn is_bound(&self) -> bool {
        matches!(self.state, BindingState::Bound(_))
    }

    /// Replace the discovery configuration.
    ///
    /// A changed configuration invalidates any terminal state so the next
    /// `ensure_loaded` runs discovery again; an identical configuration is a
    /// no-op.
    pub fn set_config(&mut self, config: EngineConfig) {
        if config != self.config {
            self.config = config;
            self.state = BindingState::Unattempted;
        }
    }

    /// Drive the state machine to a terminal state; returns `true` if bound.
    ///
    /// Idempotent after the first call: `Bound` and `Unavailable` are
    /// memoized for the process lifetime and repeated calls perform no
    /// further load attempts.
    pub fn ensure_loaded(&mut self, sink: &mut dyn DiagSink) -> bool {
        match self.state {
            BindingState::Bound(_) => return true,
            BindingState::Unavailable => return false,
            BindingState::Unattempted => {}
        }

        // Loading: transient, single-threaded by design, so plain sequential
        // code stands in for a once-guard.
        match self.load(sink) {
            Some(binding) => {
                sink.emit(Diagnostic::note("engine", "bound"));
                self.state = BindingState::Bound(binding);
                true
            }
            None => {
                self.state = BindingState::Unavailable;
                false
            }
        }
    }

    /// Invoke the engine with a fully built prompt.
    ///
    /// Valid only when bound; callers should check [`ensure_loaded`] first.
    ///
    /// [`ensure_loaded`]: Self::ensure_loaded
    pub fn invoke(&self, prompt: &str) -> Result<String, EngineError> {
        match &self.state {
            BindingState::Bound(binding) => binding.generate_text(prompt),
            _ => Err(EngineError::new(
                EngineStage::Init,
                "engine binding unavailable",
            )),
        }
    }

    fn load(&mut self, sink: &mut dyn DiagSink) -> Option<Binding> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        let candidates = self.config.candidates(exe_dir.as_deref());

        if candidates.is_empty() {
            sink.emit(Diagnostic::note("probe", "no candidate locations"));
            return None;
        }

        let mut library = None;
        for candidate in &candidates {
            self.load_attempts += 1;
            if !candidate.exists() {
                sink.emit(Diagnostic::note(
                    "probe",
                    format!("missing: {}", candidate.display()),
                ));
                continue;
            }
            // SAFETY: loading an arbitrary library runs its initializers;
            // that is the whole point of this host, and the path set is
            // operator-controlled.
            match unsafe { Library::new(candidate) } {
                Ok(lib) => {
                    sink.emit(Diagnostic::note(
                        "probe",
                        format!("load OK: {}", candidate.display()),
                    ));
                    library = Some((lib, candidate.clone()));
                    break;
                }
                Err(e) => {
                    sink.emit(Diagnostic::note(
                        "probe",
                        format!("load FAIL: {} ({e})", candidate.display()),
                    ));
                }
            }
        }

        let (lib, lib_path) = match library {
            Some(found) => found,
            None => {
                sink.emit(Diagnostic::note("engine", "no engine library available"));
                return None;
            }
        };

        let binding = match resolve_exports(lib, &lib_path, sink) {
            Some(b) => b,
            None => return None,
        };

        self.configure(&binding, sink);
        Some(binding)
    }

    /// Push base dir and config path into the engine, when it can take them.
    ///
    /// Preference order for each: environment override, else a path derived
    /// from the loaded library's own location. Failures are diagnosed but
    /// never fatal to the binding.
    fn configure(&self, binding: &Binding, sink: &mut dyn DiagSink) {
        if let Some(setter) = binding.set_base_dir {
            let (dir, source) = match &self.config.base_dir_override {
                Some(dir) => (dir.clone(), "env"),
                None => (binding.lib_dir.clone(), "lib"),
            };
            binding.push_path(setter, &format!("set_base_dir ({source})"), &dir, sink);
        }

        if let Some(setter) = binding.set_config_path {
            match &self.config.config_override {
                Some(cfg) => {
                    binding.push_path(setter, "set_config_path (env)", cfg, sink);
                }
                None => {
                    let cfg = binding.lib_dir.join(DEFAULT_CONFIG_NAME);
                    if cfg.exists() {
                        binding.push_path(setter, "set_config_path (lib)", &cfg, sink);
                    } else {
                        sink.emit(Diagnostic::note(
                            "engine",
                            format!("no {DEFAULT_CONFIG_NAME} beside library"),
                        ));
                    }
                }
            }
        }
    }
}

/// Resolve the capability set from a freshly loaded library.
///
/// Either mandatory export missing demotes the whole load; the optional
/// exports merely degrade configuration.
fn resolve_exports(lib: Library, lib_path: &Path, sink: &mut dyn DiagSink) -> Option<Binding> {
    // SAFETY: symbol signatures match the engine's published C header.
    let generate = unsafe { lib.get::<GenerateFn>(SYM_GENERATE) }.map(|s| *s);
    let free = unsafe { lib.get::<FreeFn>(SYM_FREE) }.map(|s| *s);

    let (generate, free) = match (generate, free) {
        (Ok(g), Ok(f)) => (g, f),
        (g, f) => {
            let mut missing = Vec::new();
            if g.is_err() {
                missing.push("generate_polite_rewrite");
            }
            if f.is_err() {
                missing.push("polite_rewrite_free");
            }
            sink.emit(Diagnostic::note(
                "engine",
                format!("missing exports: {}", missing.join(", ")),
            ));
            return None;
        }
    };

    let set_base_dir = unsafe { lib.get::<SetPathFn>(SYM_SET_BASE_DIR) }.ok().map(|s| *s);
    let set_config_path = unsafe { lib.get::<SetPathFn>(SYM_SET_CONFIG_PATH) }
        .ok()
        .map(|s| *s);

    let lib_dir = lib_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Some(Binding {
        generate,
        free,
        set_base_dir,
        set_config_path,
        lib_dir,
        _lib: lib,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CollectSink;

    fn bogus_config(dir: &Path) -> EngineConfig {
        EngineConfig {
            lib_override: Some(dir.join("no_such_engine.so")),
            base_dir_override: None,
            config_override: None,
        }
    }

    #[test]
    fn test_candidate_order_is_fixed() {
        let config = EngineConfig {
            lib_override: Some(PathBuf::from("/override/engine.so")),
            ..EngineConfig::default()
        };
        let exe_dir = PathBuf::from("/opt/host");
        let candidates = config.candidates(Some(&exe_dir));

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0], PathBuf::from("/override/engine.so"));
        assert_eq!(candidates[1], exe_dir.join(platform_lib_name()));
        assert_eq!(
            candidates[2],
            exe_dir.join(BUNDLE_DIR_NAME).join(platform_lib_name())
        );
    }

    #[test]
    fn test_candidates_without_override() {
        let config = EngineConfig::default();
        let exe_dir = PathBuf::from("/opt/host");
        let candidates = config.candidates(Some(&exe_dir));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], exe_dir.join(platform_lib_name()));
    }

    #[test]
    fn test_unavailable_is_memoized() {
        let tmp = tempfile::tempdir().unwrap();
        let mut manager = EngineManager::new(bogus_config(tmp.path()));
        let mut sink = CollectSink::default();

        assert!(!manager.ensure_loaded(&mut sink));
        let attempts_after_first = manager.load_attempts();
        assert!(attempts_after_first > 0);

        // Repeated calls must not probe again.
        assert!(!manager.ensure_loaded(&mut sink));
        assert!(!manager.ensure_loaded(&mut sink));
        assert_eq!(manager.load_attempts(), attempts_after_first);
    }

    #[test]
    fn test_every_probe_emits_a_diagnostic() {
        let tmp = tempfile::tempdir().unwrap();
        let mut manager = EngineManager::new(bogus_config(tmp.path()));
        let mut sink = CollectSink::default();

        manager.ensure_loaded(&mut sink);
        let probes: Vec<_> = sink
            .entries
            .iter()
            .filter(|d| d.path == "probe")
            .collect();
        assert!(!probes.is_empty());
        assert!(probes[0].note.contains("no_such_engine.so"));
    }

    #[test]
    fn test_unloadable_file_fails_and_is_diagnosed() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = tmp.path().join("librewrite_engine.so");
        std::fs::write(&fake, b"not a shared object").unwrap();

        let mut manager = EngineManager::new(EngineConfig {
            lib_override: Some(fake),
            ..EngineConfig::default()
        });
        let mut sink = CollectSink::default();

        assert!(!manager.ensure_loaded(&mut sink));
        assert!(sink
            .entries
            .iter()
            .any(|d| d.path == "probe" && d.note.starts_with("load FAIL")));
    }

    #[test]
    fn test_invoke_without_binding_is_init_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = EngineManager::new(bogus_config(tmp.path()));
        let err = manager.invoke("prompt").unwrap_err();
        assert_eq!(err.stage, EngineStage::Init);
    }

    #[test]
    fn test_config_change_resets_terminal_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut manager = EngineManager::new(bogus_config(tmp.path()));
        let mut sink = CollectSink::default();

        manager.ensure_loaded(&mut sink);
        let first_attempts = manager.load_attempts();

        // Same config: still memoized.
        manager.set_config(bogus_config(tmp.path()));
        manager.ensure_loaded(&mut sink);
        assert_eq!(manager.load_attempts(), first_attempts);

        // Different config: discovery runs again.
        manager.set_config(EngineConfig {
            lib_override: Some(tmp.path().join("other_missing.so")),
            ..EngineConfig::default()
        });
        manager.ensure_loaded(&mut sink);
        assert!(manager.load_attempts() > first_attempts);
    }

    #[test]
    fn test_platform_lib_name_matches_target() {
        let name = platform_lib_name();
        #[cfg(target_os = "linux")]
        assert_eq!(name, "librewrite_engine.so");
        #[cfg(target_os = "macos")]
        assert_eq!(name, "librewrite_engine.dylib");
        #[cfg(target_os = "windows")]
        assert_eq!(name, "rewrite_engine.dll");
    }
}
