//! Fixed-size block pool with a bounded, lock-free free queue.
//!
//! A block is poisoned for exactly as long as it sits in the free queue and
//! unpoisoned for exactly the lifetime of the handle renting it. The queue
//! is non-blocking in both directions: an empty queue makes `rent` allocate
//! fresh, a full queue makes `release` discard.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use crate::api::config::PoolConfig;
use crate::api::stats::BlockPoolStats;
use crate::diagnostics;
use crate::instrument::{default_backend, Instrumentation};

/// Alignment for block storage. Matches ASan's shadow granularity so region
/// edges poison precisely.
const BLOCK_ALIGN: usize = 8;

/// A block parked in the free queue.
struct FreeBlock(NonNull<u8>);

// SAFETY: ownership of the allocation transfers through the queue; the
// pushing thread stops touching the block before the push and exactly one
// popping thread receives it
unsafe impl Send for FreeBlock {}

/// A rented fixed-size block.
///
/// The handle is the only legitimate way to reach pool-owned memory. After
/// [`BlockPool::release`] the handle reads as an empty slice. Clones taken
/// before the release are not tracked by the pool and go stale with it;
/// touching the block through one of them afterward is exactly the
/// use-after-free this crate exists to surface.
#[derive(Debug, Clone)]
pub struct BlockHandle {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the handle exclusively owns its block while rented
unsafe impl Send for BlockHandle {}
// SAFETY: shared references to the handle only permit reads of the block
unsafe impl Sync for BlockHandle {}

impl BlockHandle {
    /// Create a released/invalid handle (for default initialization).
    pub const fn dangling() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Check if this handle has been released (or never rented).
    pub fn is_dangling(&self) -> bool {
        self.ptr.is_null()
    }

    /// Length of the block, zero once released.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the handle currently reaches no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer to the block, null once released.
    ///
    /// Keeping this pointer across a release is how a demo manufactures a
    /// stale reference; the instrumentation backend judges any access made
    /// through it afterward.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// View the block as a slice. Empty once released.
    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        // SAFETY: non-null ptr means the handle still owns `len` live bytes
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// View the block as a mutable slice. Empty once released.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            return &mut [];
        }
        // SAFETY: non-null ptr means the handle still owns `len` live bytes
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Clear the handle, yielding the block pointer if it was still live.
    fn invalidate(&mut self) -> Option<NonNull<u8>> {
        self.len = 0;
        NonNull::new(std::mem::replace(&mut self.ptr, std::ptr::null_mut()))
    }
}

impl Default for BlockHandle {
    fn default() -> Self {
        Self::dangling()
    }
}

impl std::ops::Deref for BlockHandle {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl std::ops::DerefMut for BlockHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

/// Pool of fixed-length byte blocks with poison-on-release.
///
/// Rent never blocks and never fails: an empty free queue falls back to a
/// fresh zeroed allocation. Only the free queue is bounded; the number of
/// simultaneously rented blocks is not.
pub struct BlockPool {
    /// Free blocks, each poisoned while parked here
    free: ArrayQueue<FreeBlock>,

    /// Fixed length of every block in this pool
    block_len: usize,

    /// Instrumentation port observing every hand-out and return
    backend: Arc<dyn Instrumentation>,

    rents: AtomicU64,
    reuses: AtomicU64,
    fresh: AtomicU64,
    discards: AtomicU64,
    outstanding: AtomicU64,
}

impl BlockPool {
    /// Create a pool with the default instrumentation backend.
    pub fn new(config: &PoolConfig) -> Self {
        Self::with_backend(config, default_backend())
    }

    /// Create a pool with an explicit instrumentation backend.
    ///
    /// # Panics
    ///
    /// Panics if `config.block_len` or `config.capacity` is zero.
    pub fn with_backend(config: &PoolConfig, backend: Arc<dyn Instrumentation>) -> Self {
        assert!(config.block_len > 0, "block_len must be non-zero");
        assert!(config.capacity > 0, "capacity must be non-zero");

        Self {
            free: ArrayQueue::new(config.capacity),
            block_len: config.block_len,
            backend,
            rents: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            fresh: AtomicU64::new(0),
            discards: AtomicU64::new(0),
            outstanding: AtomicU64::new(0),
        }
    }

    /// Fixed length of every block handed out by this pool.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Capacity of the free queue.
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Number of blocks currently parked in the free queue.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Rent a block, reusing a pooled one when available.
    ///
    /// A reused block is unpoisoned before the handle is returned and
    /// carries whatever the backend left in it; a fresh block is
    /// zero-initialized and was never poisoned.
    pub fn rent(&self) -> BlockHandle {
        self.rents.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_add(1, Ordering::Relaxed);

        if let Some(FreeBlock(ptr)) = self.free.pop() {
            // Exclusively ours once popped; no other caller can observe the
            // block between the pop and the unpoison.
            unsafe { self.backend.unpoison(ptr.as_ptr(), self.block_len) };
            self.reuses.fetch_add(1, Ordering::Relaxed);
            log::trace!("rented block at {:p} (unpoisoned)", ptr.as_ptr());
            BlockHandle {
                ptr: ptr.as_ptr(),
                len: self.block_len,
            }
        } else {
            let ptr = self.allocate_fresh();
            self.fresh.fetch_add(1, Ordering::Relaxed);
            log::trace!("created new block at {:p}", ptr);
            BlockHandle {
                ptr,
                len: self.block_len,
            }
        }
    }

    /// Return a block to the pool.
    ///
    /// No-op if the handle was already released. The block is poisoned and
    /// parked in the free queue; if the queue is full the block is discarded
    /// and deallocated instead. Either way the handle reads as empty
    /// afterward.
    pub fn release(&self, handle: &mut BlockHandle) {
        let Some(ptr) = handle.invalidate() else {
            return;
        };

        self.outstanding.fetch_sub(1, Ordering::Relaxed);

        // Still exclusively ours until the push makes it visible; the poison
        // and the transition to Free are one step as far as other callers
        // can tell.
        unsafe { self.backend.poison(ptr.as_ptr(), self.block_len) };
        log::trace!("released block at {:p} (poisoned)", ptr.as_ptr());

        if let Err(FreeBlock(ptr)) = self.free.push(FreeBlock(ptr)) {
            // Queue full: the block is discarded for good. Unpoison first;
            // the allocator may touch the range during deallocation.
            self.discards.fetch_add(1, Ordering::Relaxed);
            log::trace!("free queue full, discarding block at {:p}", ptr.as_ptr());
            unsafe {
                self.backend.unpoison(ptr.as_ptr(), self.block_len);
                dealloc(ptr.as_ptr(), self.layout());
            }
        }
    }

    /// Snapshot the pool counters.
    pub fn stats(&self) -> BlockPoolStats {
        BlockPoolStats {
            rents: self.rents.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            fresh_allocations: self.fresh.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Relaxed),
            free_len: self.free.len(),
            capacity: self.free.capacity(),
        }
    }

    fn layout(&self) -> Layout {
        Layout::from_size_align(self.block_len, BLOCK_ALIGN).expect("invalid block layout")
    }

    fn allocate_fresh(&self) -> *mut u8 {
        let layout = self.layout();
        // SAFETY: layout has non-zero size, enforced at construction
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        ptr
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        while let Some(FreeBlock(ptr)) = self.free.pop() {
            unsafe {
                self.backend.unpoison(ptr.as_ptr(), self.block_len);
                dealloc(ptr.as_ptr(), self.layout());
            }
        }

        let outstanding = self.outstanding.load(Ordering::Relaxed);
        if outstanding > 0 {
            diagnostics::emit_with_context(
                &diagnostics::PP101,
                &format!("{} block(s) still rented", outstanding),
            );
        }
    }
}
