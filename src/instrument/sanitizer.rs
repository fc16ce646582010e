//! AddressSanitizer backend.
//!
//! Delegates to ASan's manual poisoning interface. Reads or writes inside a
//! poisoned range abort the process with a use-after-poison report. The
//! `__asan_*` symbols only resolve when the whole build runs under
//! `-Zsanitizer=address`; build.rs warns when the flag is missing.

use std::os::raw::c_void;

use super::Instrumentation;

extern "C" {
    fn __asan_poison_memory_region(addr: *const c_void, size: usize);
    fn __asan_unpoison_memory_region(addr: *const c_void, size: usize);
    fn __asan_address_is_poisoned(addr: *const c_void) -> i32;
}

/// Instrumentation backed by the native AddressSanitizer runtime.
#[derive(Debug, Default)]
pub struct SanitizerBackend;

impl SanitizerBackend {
    /// Create a new sanitizer backend.
    pub fn new() -> Self {
        Self
    }
}

impl Instrumentation for SanitizerBackend {
    fn name(&self) -> &'static str {
        "asan"
    }

    unsafe fn poison(&self, ptr: *mut u8, len: usize) {
        log::trace!("asan-poisoning {} bytes at {:p}", len, ptr);
        __asan_poison_memory_region(ptr as *const c_void, len);
    }

    unsafe fn unpoison(&self, ptr: *mut u8, len: usize) {
        log::trace!("asan-unpoisoning {} bytes at {:p}", len, ptr);
        __asan_unpoison_memory_region(ptr as *const c_void, len);
    }
}

/// Ask the sanitizer whether a single address is currently poisoned.
///
/// # Safety
///
/// `ptr` must point into a live allocation.
pub unsafe fn address_is_poisoned(ptr: *const u8) -> bool {
    __asan_address_is_poisoned(ptr as *const c_void) != 0
}
