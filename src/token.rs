//! Token Generator
//!
//! Produces the unguessable identifiers embedded in receipt links.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes behind each receipt id (192 bits)
pub const DEFAULT_TOKEN_BYTES: usize = 24;

/// Entropy floor; generators refuse to produce anything weaker
pub const MIN_TOKEN_BYTES: usize = 16;

/// The OS randomness source failed. Fatal for credential issuance.
#[derive(Debug, thiserror::Error)]
#[error("Secure random source unavailable: {0}")]
pub struct TokenError(String);

impl TokenError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Produces fresh receipt identifiers.
///
/// Implementations must draw from a cryptographically secure source and
/// return an error rather than fall back to anything predictable.
pub trait TokenGenerator: Send + Sync {
    fn new_id(&self) -> Result<String, TokenError>;
}

/// OS-backed generator encoding random bytes as lowercase hex
/// (URL-safe without escaping).
#[derive(Debug, Clone, Copy)]
pub struct RandomTokenGenerator {
    bytes: usize,
}

impl RandomTokenGenerator {
    pub fn new() -> Self {
        Self {
            bytes: DEFAULT_TOKEN_BYTES,
        }
    }

    /// Generator with a custom byte length, clamped to [`MIN_TOKEN_BYTES`]
    pub fn with_bytes(bytes: usize) -> Self {
        Self {
            bytes: bytes.max(MIN_TOKEN_BYTES),
        }
    }
}

impl Default for RandomTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator for RandomTokenGenerator {
    fn new_id(&self) -> Result<String, TokenError> {
        let mut buf = vec![0u8; self.bytes];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| TokenError(e.to_string()))?;
        Ok(hex::encode(buf))
    }
}

/// SHA-256 hex digest of an id. Only digests are persisted.
pub fn digest_id(id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_id_length_and_alphabet() {
        let id = RandomTokenGenerator::new().new_id().unwrap();
        assert_eq!(id.len(), DEFAULT_TOKEN_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_ids_do_not_repeat() {
        let gen = RandomTokenGenerator::new();
        let ids: HashSet<String> = (0..1000).map(|_| gen.new_id().unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_with_bytes_enforces_entropy_floor() {
        let id = RandomTokenGenerator::with_bytes(4).new_id().unwrap();
        assert_eq!(id.len(), MIN_TOKEN_BYTES * 2);
    }

    #[test]
    fn test_digest_id() {
        let digest = digest_id("abc");
        // Hash should be 64 hex characters (SHA-256)
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_id("abc"));
        assert_ne!(digest, digest_id("abd"));
    }
}
