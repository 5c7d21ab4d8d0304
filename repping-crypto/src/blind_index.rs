//! Blind indexes: keyed HMAC-SHA256 digests for equality search over
//! encrypted columns.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 digest (64 characters).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlindIndex(String);

impl BlindIndex {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BlindIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlindIndex {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Computes the blind index of `plaintext` under `key`.
///
/// Pure function of `(key, plaintext)`. The bytes are hashed as given, so
/// callers that want case- or whitespace-insensitive matching normalise first.
pub fn compute_blind_index(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<BlindIndex> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac.update(plaintext);
    Ok(BlindIndex(hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_random_key;

    #[test]
    fn deterministic() {
        let key = generate_random_key();
        let a = compute_blind_index(&key, b"Mario").unwrap();
        let b = compute_blind_index(&key, b"Mario").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn discriminates() {
        let key = generate_random_key();
        let a = compute_blind_index(&key, b"Mario").unwrap();
        let b = compute_blind_index(&key, b"Mario Rossi").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn keyed() {
        let a = compute_blind_index(&generate_random_key(), b"Mario").unwrap();
        let b = compute_blind_index(&generate_random_key(), b"Mario").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hex_encoded_sha256_width() {
        let idx = compute_blind_index(&generate_random_key(), b"x").unwrap();
        assert_eq!(idx.as_str().len(), 64);
        assert!(idx.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2, with the key zero-padded to 32 bytes
        // (HMAC pads short keys with zeros, so the digest is unchanged).
        let mut raw = [0u8; 32];
        raw[..4].copy_from_slice(b"Jefe");
        let key = DerivedKey::from_bytes(raw);
        let idx = compute_blind_index(&key, b"what do ya want for nothing?").unwrap();
        assert_eq!(
            idx.as_str(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let idx = compute_blind_index(&generate_random_key(), b"x").unwrap();
        let json = serde_json::to_string(&idx).unwrap();
        assert_eq!(json, format!("\"{}\"", idx.as_str()));
    }
}
