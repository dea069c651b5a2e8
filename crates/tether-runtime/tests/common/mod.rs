//! Shared helpers for runtime integration tests

#![allow(dead_code)]

use tether_runtime::BridgeSettings;

// Re-export testing utilities
pub use pretty_assertions::assert_eq;

/// Initialize the process-wide bridge with default settings
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_bridge() {
    tether_runtime::init(BridgeSettings::default());
}

/// Logical name of the platform C library
pub const LIBC: &str = "c";

/// Logical name of the platform math library
pub const LIBM: &str = "m";
