//! Inert backend: logs intent, changes nothing.
//!
//! Used when no sanitizer runtime is linked in. Pool behavior (reuse order,
//! capacity limits, discards) is identical to the active backend; only the
//! fault-detection side effect is missing.

use super::Instrumentation;

/// No-op instrumentation that records what it would have done through the
/// `log` crate.
#[derive(Debug, Default)]
pub struct InertBackend;

impl InertBackend {
    /// Create a new inert backend.
    pub fn new() -> Self {
        Self
    }
}

impl Instrumentation for InertBackend {
    fn name(&self) -> &'static str {
        "inert"
    }

    unsafe fn poison(&self, ptr: *mut u8, len: usize) {
        log::debug!("no-op: would poison {} bytes at {:p}", len, ptr);
    }

    unsafe fn unpoison(&self, ptr: *mut u8, len: usize) {
        log::debug!("no-op: would unpoison {} bytes at {:p}", len, ptr);
    }
}
