//! Production Environment implementation using the system clock and OS RNG.
//!
//! This module provides `SystemEnv`, the production implementation of the
//! `Environment` trait.

use std::time::{SystemTime, UNIX_EPOCH};

use lanshare_core::Environment;

/// Production environment using wall-clock time and cryptographic RNG.
///
/// This implementation:
/// - Uses `SystemTime::now()` for message timestamps
/// - Uses `getrandom` for access keys and capability tokens
///
/// # Security
///
/// The RNG uses `getrandom` which provides OS-level cryptographic randomness.
/// Access keys and capability tokens are the only barrier in front of stored
/// content, so nothing weaker is acceptable here.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn unix_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(e) = getrandom::fill(buffer) {
            // Predictable tokens would be worse than no server at all
            tracing::error!("getrandom failed: {}", e);
            std::process::abort();
        }
    }
}
