//! Use-after-free demonstration.
//!
//! The classic pool misuse: rent a block, keep a raw pointer, give the
//! block back, read through the pointer anyway. Built with the `asan`
//! feature (under `RUSTFLAGS="-Zsanitizer=address"`) step 5 aborts with a
//! sanitizer report; with the default inert backend the read succeeds and
//! only the log shows what would have faulted.
//!
//! ```text
//! RUST_LOG=debug cargo run --example use_after_free
//! RUSTFLAGS="-Zsanitizer=address" cargo +nightly run --example use_after_free --features asan
//! ```

use poisonpool::{BlockPool, PoolConfig};

fn main() {
    env_logger::init();

    println!("=== poisonpool use-after-free demonstration ===");

    // Two free slots, just like the classic demo.
    let pool = BlockPool::new(&PoolConfig::default().with_capacity(2));

    println!("\n1. Renting a block...");
    let mut block = pool.rent();
    println!("rented block at {:p}", block.as_ptr());

    println!("\n2. Writing data to the block...");
    let message = b"Hello, poisonpool!";
    block.as_mut_slice()[..message.len()].copy_from_slice(message);
    println!("written: {}", String::from_utf8_lossy(&block[..message.len()]));

    println!("\n3. Saving a raw pointer to the block...");
    let stale = block.as_ptr();
    println!("saved pointer: {:p}", stale);

    println!("\n4. Releasing the block (poisoning)...");
    pool.release(&mut block);
    println!("handle now dangling: {}", block.is_dangling());

    println!("\n5. Reading through the saved pointer (should trigger ASan)...");
    // SAFETY: deliberately unsound - this is the use-after-free the pool's
    // instrumentation exists to catch
    let bytes = unsafe { std::slice::from_raw_parts(stale, message.len()) };
    println!("read back: {}", String::from_utf8_lossy(bytes));

    println!("\nDemo completed! {}", pool.stats());
}
