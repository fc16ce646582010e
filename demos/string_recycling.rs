//! First-fit string recycling walk-through.
//!
//! Shows a slot being reused for a smaller string: the second handle keeps
//! the slot's original capacity, and the pattern backend shreds the bytes
//! in between so the old contents never leak into the gap.
//!
//! ```text
//! RUST_LOG=trace cargo run --example string_recycling
//! ```

use std::sync::Arc;

use poisonpool::{PatternBackend, PoolConfig, StringPool};

fn main() {
    env_logger::init();

    println!("=== poisonpool string recycling demonstration ===");

    let pool = StringPool::with_backend(&PoolConfig::default(), Arc::new(PatternBackend::new()));

    println!("\n1. Renting a string...");
    let mut first = pool.rent(b"a fairly long message").expect("allocation failed");
    let addr = first.as_ptr();
    println!(
        "rented {:?} at {:p} (len {}, capacity {})",
        first.as_str().unwrap_or("<non-utf8>"),
        addr,
        first.len(),
        first.capacity()
    );

    println!("\n2. Releasing it (slot is poisoned and parked)...");
    pool.release(&mut first);

    println!("\n3. Renting a shorter string (first-fit reuse)...");
    let mut second = pool.rent(b"short").expect("allocation failed");
    println!(
        "rented {:?} at {:p} (len {}, capacity {})",
        second.as_str().unwrap_or("<non-utf8>"),
        second.as_ptr(),
        second.len(),
        second.capacity()
    );
    println!("reused the same slot: {}", std::ptr::eq(addr, second.as_ptr()));

    println!("\n4. Releasing and tearing down...");
    pool.release(&mut second);
    println!("{}", pool.stats());
}
