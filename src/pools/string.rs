//! Variable-length string pool with first-fit slot reuse.
//!
//! Every slot carries one extra byte for a terminator, and a freed slot
//! keeps its capacity forever: first-fit never merges adjacent slots and
//! never shrinks an over-sized one, so a reused handle can report a capacity
//! larger than its length. Slots are poisoned while they sit in the free
//! list and unpoisoned for the lifetime of the handle renting them.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::api::config::PoolConfig;
use crate::api::stats::StringPoolStats;
use crate::diagnostics;
use crate::instrument::{default_backend, Instrumentation};
use crate::sync::mutex::Mutex;

/// A slot parked in the free list.
struct FreeSlot {
    ptr: NonNull<u8>,
    capacity: usize,
}

// SAFETY: ownership of the allocation transfers through the free list; the
// releasing thread stops touching the slot before the push
unsafe impl Send for FreeSlot {}

/// A rented string buffer.
///
/// Reports the length actually in use and the capacity of the underlying
/// slot (which can be larger after a first-fit reuse). After
/// [`StringPool::release`] the handle reads as empty; clones taken before
/// the release go stale and any access through them is judged by the
/// instrumentation backend.
#[derive(Debug, Clone)]
pub struct PooledString {
    ptr: *mut u8,
    len: usize,
    capacity: usize,
}

// SAFETY: the handle exclusively owns its slot while rented
unsafe impl Send for PooledString {}
// SAFETY: shared references to the handle only permit reads of the slot
unsafe impl Sync for PooledString {}

impl PooledString {
    /// Create a released/invalid handle (for default initialization).
    pub const fn dangling() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
            capacity: 0,
        }
    }

    /// Check if this handle has been released (or never rented).
    pub fn is_dangling(&self) -> bool {
        self.ptr.is_null()
    }

    /// Bytes currently in use, zero once released.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the handle currently reaches no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity of the underlying slot (excluding the terminator byte).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw pointer to the slot, null once released.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// View the in-use bytes. Empty once released.
    pub fn as_bytes(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        // SAFETY: non-null ptr means the handle still owns `len` live bytes
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// View the in-use bytes as UTF-8, if they are.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// Clear the handle, yielding the slot if it was still live.
    fn invalidate(&mut self) -> Option<(NonNull<u8>, usize, usize)> {
        let len = std::mem::take(&mut self.len);
        let capacity = std::mem::take(&mut self.capacity);
        NonNull::new(std::mem::replace(&mut self.ptr, std::ptr::null_mut()))
            .map(|ptr| (ptr, len, capacity))
    }
}

impl Default for PooledString {
    fn default() -> Self {
        Self::dangling()
    }
}

/// Pool of variable-length byte runs with first-fit reuse.
///
/// Unlike [`BlockPool`](crate::BlockPool), the free list is unbounded and
/// guarded by a mutex, and rent is fallible: it returns `None` when a fresh
/// allocation fails.
pub struct StringPool {
    /// Free slots in release order; first-fit scans from the front
    free: Mutex<Vec<FreeSlot>>,

    /// Instrumentation port observing every hand-out and return
    backend: Arc<dyn Instrumentation>,

    rents: AtomicU64,
    reuses: AtomicU64,
    fresh: AtomicU64,
    failed: AtomicU64,
    outstanding: AtomicU64,
}

impl StringPool {
    /// Create a pool with the default instrumentation backend.
    pub fn new(config: &PoolConfig) -> Self {
        Self::with_backend(config, default_backend())
    }

    /// Create a pool with an explicit instrumentation backend.
    pub fn with_backend(config: &PoolConfig, backend: Arc<dyn Instrumentation>) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(config.string_free_reserve)),
            backend,
            rents: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            fresh: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            outstanding: AtomicU64::new(0),
        }
    }

    /// Number of slots currently parked in the free list.
    pub fn free_len(&self) -> usize {
        self.free.lock().len()
    }

    /// Rent a buffer holding a copy of `data`.
    ///
    /// Scans the free list front to back and takes the first slot whose
    /// capacity fits (first-fit, never best-fit). On a miss, allocates a
    /// slot sized exactly to `data` plus the terminator byte. Returns `None`
    /// only if that fresh allocation fails; the pool stays usable.
    pub fn rent(&self, data: &[u8]) -> Option<PooledString> {
        self.rents.fetch_add(1, Ordering::Relaxed);

        let reused = {
            let mut free = self.free.lock();
            free.iter()
                .position(|slot| slot.capacity >= data.len())
                // remove, not swap_remove: the scan order of the remaining
                // slots is part of the first-fit contract
                .map(|idx| free.remove(idx))
        };

        let handle = if let Some(slot) = reused {
            // Exclusively ours once off the list; unpoison and copy cannot
            // be observed half-done through the pool.
            unsafe {
                self.backend.unpoison(slot.ptr.as_ptr(), slot.capacity + 1);
                copy_terminated(slot.ptr, data);
            }
            self.reuses.fetch_add(1, Ordering::Relaxed);
            log::trace!(
                "reused {}-byte slot at {:p} for {} bytes (unpoisoned)",
                slot.capacity,
                slot.ptr.as_ptr(),
                data.len()
            );
            PooledString {
                ptr: slot.ptr.as_ptr(),
                len: data.len(),
                capacity: slot.capacity,
            }
        } else {
            let ptr = self.allocate_fresh(data)?;
            PooledString {
                ptr: ptr.as_ptr(),
                len: data.len(),
                capacity: data.len(),
            }
        };

        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Some(handle)
    }

    /// Return a buffer to the pool.
    ///
    /// No-op if the handle was already released. Poisons the in-use bytes
    /// plus the terminator, parks `(ptr, capacity)` on the free list, and
    /// clears the handle so it reads as empty afterward.
    pub fn release(&self, handle: &mut PooledString) {
        let Some((ptr, len, capacity)) = handle.invalidate() else {
            return;
        };

        self.outstanding.fetch_sub(1, Ordering::Relaxed);

        // Still exclusively ours until the push; the reuse path unpoisons
        // the full capacity, which covers the tail bytes not poisoned here.
        unsafe { self.backend.poison(ptr.as_ptr(), len + 1) };
        log::trace!(
            "released {}-byte slot at {:p} (poisoned {} bytes)",
            capacity,
            ptr.as_ptr(),
            len + 1
        );

        self.free.lock().push(FreeSlot { ptr, capacity });
    }

    /// Deallocate every slot in the free list.
    ///
    /// Idempotent: the list is drained, so a second call finds nothing.
    /// Invoked automatically when the pool is dropped. Buffers still rented
    /// are not reclaimed; releasing them afterward is unsound, so they must
    /// be released (or leaked) by their holders before teardown.
    pub fn cleanup(&self) {
        let slots = std::mem::take(&mut *self.free.lock());
        for slot in slots {
            unsafe {
                // The allocator may touch the range during deallocation.
                self.backend.unpoison(slot.ptr.as_ptr(), slot.capacity + 1);
                dealloc(slot.ptr.as_ptr(), slot_layout(slot.capacity));
            }
        }
    }

    /// Snapshot the pool counters.
    pub fn stats(&self) -> StringPoolStats {
        StringPoolStats {
            rents: self.rents.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            fresh_allocations: self.fresh.load(Ordering::Relaxed),
            failed_allocations: self.failed.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Relaxed),
            free_len: self.free.lock().len(),
        }
    }

    fn allocate_fresh(&self, data: &[u8]) -> Option<NonNull<u8>> {
        let layout = slot_layout(data.len());
        // SAFETY: layout always covers at least the terminator byte
        let raw = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            diagnostics::emit_with_context(
                &diagnostics::PP001,
                &format!("{} bytes requested", data.len() + 1),
            );
            return None;
        };

        // SAFETY: freshly allocated, sized to data.len() + 1
        unsafe { copy_terminated(ptr, data) };
        self.fresh.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "allocated {}-byte slot at {:p}",
            data.len(),
            ptr.as_ptr()
        );
        Some(ptr)
    }
}

impl Drop for StringPool {
    fn drop(&mut self) {
        self.cleanup();

        let outstanding = self.outstanding.load(Ordering::Relaxed);
        if outstanding > 0 {
            diagnostics::emit_with_context(
                &diagnostics::PP101,
                &format!("{} pooled string(s) never released", outstanding),
            );
        }
    }
}

/// Layout of a slot: capacity plus the terminator byte.
fn slot_layout(capacity: usize) -> Layout {
    Layout::array::<u8>(capacity + 1).expect("slot size overflows layout")
}

/// Copy `data` into the slot and write the terminator after it.
///
/// # Safety
///
/// `ptr` must point to a live, unpoisoned allocation of at least
/// `data.len() + 1` bytes.
unsafe fn copy_terminated(ptr: NonNull<u8>, data: &[u8]) {
    std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), data.len());
    ptr.as_ptr().add(data.len()).write(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{region_is_poisoned, InertBackend, PatternBackend};

    fn inert_pool() -> StringPool {
        StringPool::with_backend(&PoolConfig::default(), Arc::new(InertBackend::new()))
    }

    #[test]
    fn test_rent_copies_data() {
        let pool = inert_pool();
        let mut s = pool.rent(b"hello").expect("alloc");
        assert_eq!(s.as_bytes(), b"hello");
        assert_eq!(s.as_str(), Some("hello"));
        assert_eq!(s.len(), 5);
        assert_eq!(s.capacity(), 5);
        pool.release(&mut s);
    }

    #[test]
    fn test_reuse_keeps_original_capacity() {
        let pool = inert_pool();

        let mut first = pool.rent(b"abc").expect("alloc");
        let addr = first.as_ptr();
        pool.release(&mut first);

        let mut second = pool.rent(b"de").expect("alloc");
        assert_eq!(second.as_ptr(), addr);
        assert_eq!(second.as_bytes(), b"de");
        assert_eq!(second.len(), 2);
        // capacity still records the slot's original size
        assert_eq!(second.capacity(), 3);
        pool.release(&mut second);
    }

    #[test]
    fn test_first_fit_takes_first_sufficient_slot() {
        let pool = inert_pool();

        let mut big = pool.rent(b"aaaa").expect("alloc");
        let mut small = pool.rent(b"bb").expect("alloc");
        let big_addr = big.as_ptr();
        // free list order: [4-byte slot, 2-byte slot]
        pool.release(&mut big);
        pool.release(&mut small);

        // A 2-byte request fits both; first-fit must take the 4-byte slot.
        let mut reused = pool.rent(b"cc").expect("alloc");
        assert_eq!(reused.as_ptr(), big_addr);
        assert_eq!(reused.capacity(), 4);
        pool.release(&mut reused);
    }

    #[test]
    fn test_too_small_slots_are_skipped() {
        let pool = inert_pool();

        let mut small = pool.rent(b"xy").expect("alloc");
        pool.release(&mut small);

        let mut big = pool.rent(b"longer than the slot").expect("alloc");
        assert_eq!(pool.free_len(), 1);
        assert_eq!(pool.stats().fresh_allocations, 2);
        pool.release(&mut big);
    }

    #[test]
    fn test_release_clears_handle() {
        let pool = inert_pool();
        let mut s = pool.rent(b"data").expect("alloc");
        pool.release(&mut s);

        assert!(s.is_dangling());
        assert!(s.as_bytes().is_empty());
        assert_eq!(s.len(), 0);
        assert_eq!(s.capacity(), 0);
    }

    #[test]
    fn test_double_release_is_noop() {
        let pool = inert_pool();
        let mut s = pool.rent(b"data").expect("alloc");
        pool.release(&mut s);

        let free_before = pool.free_len();
        pool.release(&mut s);
        assert_eq!(pool.free_len(), free_before);
    }

    #[test]
    fn test_release_dangling_is_noop() {
        let pool = inert_pool();
        let mut handle = PooledString::dangling();
        pool.release(&mut handle);
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn test_empty_data() {
        let pool = inert_pool();
        let mut s = pool.rent(b"").expect("alloc");
        assert_eq!(s.len(), 0);
        assert!(!s.is_dangling());
        pool.release(&mut s);
        assert_eq!(pool.free_len(), 1);
    }

    #[test]
    fn test_cleanup_drains_free_list() {
        let pool = inert_pool();
        let mut s = pool.rent(b"data").expect("alloc");
        pool.release(&mut s);
        assert_eq!(pool.free_len(), 1);

        pool.cleanup();
        assert_eq!(pool.free_len(), 0);

        // Second cleanup finds nothing
        pool.cleanup();
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn test_pattern_backend_poisons_released_bytes() {
        let pool =
            StringPool::with_backend(&PoolConfig::default(), Arc::new(PatternBackend::new()));

        let mut s = pool.rent(b"secret").expect("alloc");
        let stale = s.as_ptr();
        pool.release(&mut s);

        // len + terminator are shredded while the slot waits in the list
        assert!(unsafe { region_is_poisoned(stale, 7) });
    }

    #[test]
    fn test_reuse_carries_no_stale_bytes() {
        let pool =
            StringPool::with_backend(&PoolConfig::default(), Arc::new(PatternBackend::new()));

        let mut first = pool.rent(b"abcdef").expect("alloc");
        pool.release(&mut first);

        let mut second = pool.rent(b"xy").expect("alloc");
        assert_eq!(second.as_bytes(), b"xy");
        pool.release(&mut second);
    }
}
