//! Scoped guards for the engine FFI boundary.
//!
//! Two hazards cross that boundary: the engine may log to the process
//! stdout, which carries protocol frames, and it hands back heap text that
//! must be released through its own `free` export exactly once. Both are
//! modelled as RAII guards so every exit path — including panics — restores
//! the stream and releases the buffer.

use std::ffi::{c_char, CStr};

use crate::error::{EngineError, EngineStage};

/// Signature of the engine's `free` export.
pub(crate) type FreeFn = unsafe extern "C" fn(*const c_char);

/// Temporarily redirects fd 1 to the null device.
///
/// Armed for the duration of a `generate` call; dropping it restores the
/// original stdout unconditionally. Without this, a single `printf` inside
/// the engine corrupts the framed transport for the rest of the session.
#[cfg(unix)]
pub struct StdoutGate {
    saved_fd: libc::c_int,
}

#[cfg(unix)]
impl StdoutGate {
    /// Redirect stdout to `/dev/null`, remembering the original descriptor.
    pub fn engage() -> Result<Self, EngineError> {
        use std::io::Write;

        // Flush buffered host output before the descriptor swap so nothing
        // written so far lands in the null device.
        let _ = std::io::stdout().flush();

        // SAFETY: plain fd syscalls on descriptors this process owns.
        unsafe {
            let saved_fd = libc::dup(libc::STDOUT_FILENO);
            if saved_fd < 0 {
                return Err(EngineError::new(
                    EngineStage::CwdGuard,
                    "dup(stdout) failed",
                ));
            }
            let null_fd = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
            if null_fd < 0 {
                libc::close(saved_fd);
                return Err(EngineError::new(
                    EngineStage::CwdGuard,
                    "open(/dev/null) failed",
                ));
            }
            let rc = libc::dup2(null_fd, libc::STDOUT_FILENO);
            libc::close(null_fd);
            if rc < 0 {
                libc::close(saved_fd);
                return Err(EngineError::new(
                    EngineStage::CwdGuard,
                    "dup2(null, stdout) failed",
                ));
            }
            Ok(Self { saved_fd })
        }
    }
}

#[cfg(unix)]
impl Drop for StdoutGate {
    fn drop(&mut self) {
        use std::io::Write;
        let _ = std::io::stdout().flush();
        // SAFETY: saved_fd is the descriptor dup'd in engage().
        unsafe {
            libc::dup2(self.saved_fd, libc::STDOUT_FILENO);
            libc::close(self.saved_fd);
        }
    }
}

/// No-op gate on platforms without the fd plumbing.
#[cfg(not(unix))]
pub struct StdoutGate;

#[cfg(not(unix))]
impl StdoutGate {
    /// Redirection not implemented on this platform; the gate still exists
    /// so call sites stay uniform.
    pub fn engage() -> Result<Self, EngineError> {
        Ok(Self)
    }
}

/// Owned text returned by the engine.
///
/// Holds the raw pointer together with the engine's `free` export; `Drop`
/// releases it exactly once. The buffer must never go through the host
/// allocator.
pub(crate) struct OwnedEngineText {
    ptr: *const c_char,
    free: FreeFn,
}

impl OwnedEngineText {
    /// Take ownership of an engine-returned pointer.
    ///
    /// Returns `None` for a null pointer (the engine's way of saying "no
    /// output").
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a NUL-terminated buffer allocated by the same
    /// engine `free` releases.
    pub unsafe fn from_raw(ptr: *const c_char, free: FreeFn) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self { ptr, free })
        }
    }

    /// Copy the buffer into an owned `String`, replacing invalid UTF-8.
    pub fn to_string_lossy(&self) -> String {
        // SAFETY: from_raw guarantees a non-null NUL-terminated buffer.
        unsafe { CStr::from_ptr(self.ptr) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for OwnedEngineText {
    fn drop(&mut self) {
        // SAFETY: the matching release for from_raw; runs exactly once.
        unsafe { (self.free)(self.ptr) }
    }
}
