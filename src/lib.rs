//! # poisonpool
//!
//! Poison-aware buffer pools for surfacing use-after-free in Rust.
//!
//! ## Features
//!
//! - Fixed-size [`BlockPool`] backed by a bounded, lock-free free queue
//! - Variable-size [`StringPool`] with first-fit slot reuse
//! - Pluggable [`Instrumentation`] port chosen when a pool is built:
//!   AddressSanitizer (`asan` feature), byte-pattern shredding, or a
//!   logging no-op
//! - Idempotent release; released handles read as empty
//! - Rent/reuse/discard statistics per pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use poisonpool::{BlockPool, PoolConfig};
//!
//! let pool = BlockPool::new(&PoolConfig::default());
//!
//! let mut block = pool.rent();
//! block.as_mut_slice()[..5].copy_from_slice(b"hello");
//! pool.release(&mut block);
//! assert!(block.is_dangling());
//! ```
//!
//! ## Catching a use-after-free
//!
//! A released block is poisoned until the pool hands it out again. Keep a
//! raw pointer (or a clone of the handle) across the release and read
//! through it: under the `asan` feature the process aborts with a sanitizer
//! report, under [`PatternBackend`] the read observes `0xCD` shred bytes,
//! and under the default [`InertBackend`] the violation is only logged.
//!
//! ```rust,no_run
//! use poisonpool::{BlockPool, PoolConfig};
//!
//! let pool = BlockPool::new(&PoolConfig::default());
//! let mut block = pool.rent();
//! let stale = block.as_ptr();
//! pool.release(&mut block);
//! // Any dereference of `stale` from here on is use-after-free.
//! ```

mod api;
mod diagnostics;
mod instrument;
mod pools;
mod sync;

// Re-export public API at crate root for convenience
pub use api::config::PoolConfig;
pub use api::stats::{BlockPoolStats, StringPoolStats};

// Pool cores and handles
pub use pools::block::{BlockHandle, BlockPool};
pub use pools::string::{PooledString, StringPool};

// Instrumentation port
pub use instrument::{
    default_backend, region_is_poisoned, InertBackend, Instrumentation, PatternBackend,
    FREED_PATTERN,
};
#[cfg(feature = "asan")]
pub use instrument::{address_is_poisoned, SanitizerBackend};

// Diagnostics
pub use diagnostics::{Diagnostic, DiagnosticKind, PP001, PP101};
