use crate::error::ValidationError;
use std::fmt;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// A principal identifier: a base58 string derived from a public key,
/// serving as the top-level storage namespace (§3 Data model).
///
/// Validation is purely lexical (alphabet membership, non-empty) — it does
/// not check that the string actually decodes to a key-derived address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal(String);

impl Principal {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() || !raw.bytes().all(|b| BASE58_ALPHABET.contains(&b)) {
            return Err(ValidationError::InvalidPrincipal);
        }
        Ok(Self(raw.to_string()))
    }

    /// Derives a principal from a compressed secp256k1 public key, matching
    /// the Stacks/Blockstack convention: sha256 the key, base58-encode it.
    pub fn from_public_key_bytes(pubkey: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(pubkey);
        Self(bs58::encode(digest).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Principal {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
