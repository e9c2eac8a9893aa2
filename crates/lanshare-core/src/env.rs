//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the store and the capability gate from
//! system resources (wall clock, randomness). This enables:
//!
//! - Deterministic tests: a fixed clock and a seeded RNG make ids, timestamps
//!   and access keys reproducible.
//!
//! - Production runtime: the server crate plugs in the real clock and OS
//!   entropy without any change to the store logic.
//!
//! # Invariants
//!
//! - Isolation: implementations must not share global state
//! - Unpredictability: production `random_bytes()` must be cryptographically
//!   secure, since access keys and capability tokens are derived from it

/// Abstract environment providing wall-clock time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// 1. RNG quality: `random_bytes()` uses cryptographically secure entropy in
///    production
/// 2. Minimal panics: methods are infallible except in exceptional
///    circumstances (e.g., OS entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time in seconds since the Unix epoch.
    ///
    /// Used to stamp `createdAt` on stored messages. Need not be monotonic;
    /// ordering comes from message ids.
    fn unix_time(&self) -> i64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Security
    ///
    /// Production implementations MUST use OS entropy (`getrandom`), NOT a
    /// seeded or thread-local PRNG.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates `len` random bytes rendered as lowercase hex.
    ///
    /// The result is `2 * len` characters long.
    fn random_hex(&self, len: usize) -> String {
        let mut bytes = vec![0u8; len];
        self.random_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
