//! The instrumentation port.
//!
//! Pools call [`Instrumentation::poison`] on every block they take back and
//! [`Instrumentation::unpoison`] on every block they hand out. Which backend
//! observes those calls is decided when a pool is built, never inside the
//! pool algorithms, so reuse and capacity behavior are identical across
//! backends.

mod inert;
mod pattern;
#[cfg(feature = "asan")]
mod sanitizer;

pub use inert::InertBackend;
pub use pattern::{region_is_poisoned, PatternBackend, FREED_PATTERN};
#[cfg(feature = "asan")]
pub use sanitizer::{address_is_poisoned, SanitizerBackend};

use std::sync::Arc;

/// Marks memory ranges as off-limits or accessible for an external checking
/// mechanism.
///
/// Both operations are idempotent and never touch pool state. A pool only
/// invokes them on ranges it exclusively owns at that instant, so backends
/// need no synchronization of their own.
pub trait Instrumentation: Send + Sync {
    /// Backend name for logs and demo output.
    fn name(&self) -> &'static str;

    /// Mark `len` bytes starting at `ptr` as off-limits. Any later access to
    /// the range through a stale handle is the fault this crate surfaces.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation of at least `len` bytes that no
    /// handle currently reaches.
    unsafe fn poison(&self, ptr: *mut u8, len: usize);

    /// Reverse of [`poison`](Instrumentation::poison): mark the range as
    /// legitimately accessible again.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation of at least `len` bytes.
    unsafe fn unpoison(&self, ptr: *mut u8, len: usize);
}

/// The backend pools use when none is supplied: the sanitizer under the
/// `asan` feature, the logging no-op otherwise.
pub fn default_backend() -> Arc<dyn Instrumentation> {
    #[cfg(feature = "asan")]
    {
        Arc::new(SanitizerBackend::new())
    }
    #[cfg(not(feature = "asan"))]
    {
        Arc::new(InertBackend::new())
    }
}
