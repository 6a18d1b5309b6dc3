//! Pool key derivation.
//!
//! Connections are grouped by a SHA-256 digest of the full credential set,
//! so two requests share a pool only when endpoint, namespace, database,
//! username and password all match. The digest is fixed-length and does not
//! reveal the password it was derived from.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::credentials::Credentials;

/// Opaque key identifying a group of interchangeable connections.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PoolKey(String);

impl PoolKey {
    /// Derive the key for a credential set. Pure and deterministic.
    ///
    /// Every field is length-prefixed before hashing so that shifting bytes
    /// between adjacent fields cannot produce the same input.
    pub fn derive(credentials: &Credentials) -> Self {
        let mut hasher = Sha256::new();
        for field in [
            credentials.endpoint.as_str(),
            credentials.namespace_or_default(),
            credentials.database_or_default(),
            credentials.username.as_str(),
            credentials.password.as_str(),
        ] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Full 64-character hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolKey({})", self.short())
    }
}
