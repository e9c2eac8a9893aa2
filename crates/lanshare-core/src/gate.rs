//! Access Gate
//!
//! Classifies a request by the capability token it carries. Classification
//! is a pure function of the presented token and the two process secrets.
//!
//! ## Tiers
//!
//! - Manage: full control (add, list, delete, share access)
//! - Remote access: a second device (add, list, share access)
//! - Unauthenticated: nothing except downloads by access key, which bypass
//!   the gate entirely

use zeroize::Zeroizing;

use crate::env::Environment;

/// Random bytes in the manage token (32 hex chars).
pub const MANAGE_TOKEN_BYTES: usize = 16;

/// Random bytes in the remote-access token (8 hex chars, short enough to
/// type on a phone).
pub const REMOTE_TOKEN_BYTES: usize = 4;

/// Trust tier of a request. Ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    /// No or unknown token
    Unauthenticated,
    /// Remote-access token
    RemoteAccess,
    /// Manage token
    Manage,
}

impl AccessLevel {
    /// List, add and view access info.
    pub fn can_remote_access(self) -> bool {
        self >= Self::RemoteAccess
    }

    /// Everything, including delete.
    pub fn can_manage(self) -> bool {
        self == Self::Manage
    }
}

/// The two process-lifetime capability secrets.
///
/// Held only in memory and wiped when dropped.
///
/// # Security
///
/// - **Debug Redaction**: the `Debug` impl never prints either token.
#[derive(Clone)]
pub struct Capabilities {
    manage: Zeroizing<String>,
    remote_access: Zeroizing<String>,
}

impl Capabilities {
    /// Generate fresh random tokens.
    pub fn generate(env: &impl Environment) -> Self {
        Self {
            manage: Zeroizing::new(env.random_hex(MANAGE_TOKEN_BYTES)),
            remote_access: Zeroizing::new(env.random_hex(REMOTE_TOKEN_BYTES)),
        }
    }

    /// Build from known tokens.
    pub fn from_tokens(manage: impl Into<String>, remote_access: impl Into<String>) -> Self {
        Self {
            manage: Zeroizing::new(manage.into()),
            remote_access: Zeroizing::new(remote_access.into()),
        }
    }

    /// The manage token.
    pub fn manage_token(&self) -> &str {
        &self.manage
    }

    /// The remote-access token, handed out through access info.
    pub fn remote_access_token(&self) -> &str {
        &self.remote_access
    }

    /// Classify a presented token.
    ///
    /// Comparison is exact and byte-for-byte. A missing or empty token is
    /// always `Unauthenticated`.
    pub fn classify(&self, token: Option<&str>) -> AccessLevel {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return AccessLevel::Unauthenticated;
        };

        if constant_time_eq(token.as_bytes(), self.manage.as_bytes()) {
            AccessLevel::Manage
        } else if constant_time_eq(token.as_bytes(), self.remote_access.as_bytes()) {
            AccessLevel::RemoteAccess
        } else {
            AccessLevel::Unauthenticated
        }
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("manage", &format!("<redacted {} chars>", self.manage.len()))
            .field("remote_access", &format!("<redacted {} chars>", self.remote_access.len()))
            .finish()
    }
}

/// Equality whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
