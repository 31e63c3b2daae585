//! Break-glass token material.
//!
//! A token is the only proof of a grant. It is handed to the operator once at
//! issue time and never persisted; the store keeps only its SHA-256 hash, so
//! a leaked database cannot mint working tokens.

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const TOKEN_PREFIX: &str = "bg_";
const TOKEN_BYTES: usize = 32;

/// The cleartext token returned by `issue`. One-shot by contract.
#[derive(Clone, PartialEq, Eq)]
pub struct BreakGlassToken(String);

impl BreakGlassToken {
    /// 32 bytes from the OS entropy source, hex-encoded with a recognisable
    /// prefix so leaked tokens can be found by secret scanners.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(format!("{TOKEN_PREFIX}{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hash(&self) -> TokenHash {
        TokenHash::of(&self.0)
    }
}

// The cleartext must not wander into logs via {:?}.
impl core::fmt::Debug for BreakGlassToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BreakGlassToken({TOKEN_PREFIX}\u{2026})")
    }
}

/// SHA-256 of a token, hex-encoded. The only token form that is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenHash(String);

impl TokenHash {
    /// Hash arbitrary presented input. Redemption hashes whatever arrives;
    /// malformed strings simply never match a stored hash.
    pub fn of(raw: &str) -> Self {
        Self(hex::encode(Sha256::digest(raw.as_bytes())))
    }

    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_prefixed() {
        let a = BreakGlassToken::generate();
        let b = BreakGlassToken::generate();

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("bg_"));
        assert_eq!(a.as_str().len(), 3 + 64);
    }

    #[test]
    fn hash_is_deterministic_and_not_the_cleartext() {
        let token = BreakGlassToken::generate();

        assert_eq!(token.hash(), TokenHash::of(token.as_str()));
        assert_ne!(token.hash().as_str(), token.as_str());
        assert_eq!(token.hash().as_str().len(), 64);
    }

    #[test]
    fn debug_output_redacts_the_cleartext() {
        let token = BreakGlassToken::generate();
        let rendered = format!("{token:?}");

        assert!(!rendered.contains(&token.as_str()[3..]));
    }
}
