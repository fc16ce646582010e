//! Build script for poisonpool.
//!
//! Provides build-time diagnostics and helpful messages for the
//! instrumentation backends, most importantly the ASan linking requirements.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_ASAN");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");
    println!("cargo:rerun-if-env-changed=RUSTFLAGS");

    let asan_enabled = env::var("CARGO_FEATURE_ASAN").is_ok();
    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // --- ASan backend ---
    if asan_enabled {
        emit_info("AddressSanitizer backend enabled");
        emit_note("The __asan_* symbols only resolve when the whole build is sanitized:");
        emit_note("  RUSTFLAGS=\"-Zsanitizer=address\" cargo +nightly run --features asan");
        emit_note("Reads through a stale handle will then abort with an ASan report.");

        if !rustflags_request_asan() {
            emit_warning("'asan' feature enabled but -Zsanitizer=address not found in RUSTFLAGS!");
            emit_note("Linking will fail without the sanitizer runtime.");
        }
        check_nightly_compiler();
    } else {
        emit_note("Tip: enable the 'asan' feature to turn stale-handle reads into hard faults:");
        emit_note("  poisonpool = { version = \"0.3\", features = [\"asan\"] }");
    }

    // --- Parking Lot ---
    if parking_lot_enabled {
        emit_info("Using parking_lot for mutexes (faster lock implementation)");
    }

    if is_release && asan_enabled {
        emit_warning("ASan backend enabled in release build!");
        emit_note("Sanitized builds carry significant overhead. Fine for soak tests,");
        emit_note("not something to ship.");
    }
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_info(msg: &str) {
    println!("cargo:warning=[poisonpool] ℹ️  {}", msg);
}

fn emit_note(msg: &str) {
    if msg.is_empty() {
        println!("cargo:warning=[poisonpool]");
    } else {
        println!("cargo:warning=[poisonpool]    {}", msg);
    }
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[poisonpool] ⚠️  {}", msg);
}

// =============================================================================
// Environment and toolchain checks
// =============================================================================

fn rustflags_request_asan() -> bool {
    let encoded = env::var("CARGO_ENCODED_RUSTFLAGS").unwrap_or_default();
    let plain = env::var("RUSTFLAGS").unwrap_or_default();
    encoded.contains("sanitizer=address") || plain.contains("sanitizer=address")
}

fn check_nightly_compiler() {
    if let Ok(rustc) = env::var("RUSTC") {
        if let Ok(output) = std::process::Command::new(&rustc)
            .arg("--version")
            .output()
        {
            let version = String::from_utf8_lossy(&output.stdout);
            if !version.contains("nightly") {
                emit_warning("'asan' feature enabled but compiler doesn't appear to be nightly!");
                emit_note("-Zsanitizer=address requires nightly Rust.");
                emit_note("Install nightly: rustup install nightly");
            }
        }
    }
}
