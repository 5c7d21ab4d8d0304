//! Per-scope key derivation.
//!
//! encryptionKey = HKDF-SHA256(masterKey, salt="repping:scope-salt:v1", info="repping:scope:v1:enc:{scope}")
//! blindIndexKey = HKDF-SHA256(masterKey, salt="repping:scope-salt:v1", info="repping:scope:v1:bi:{scope}")
//! checkKey      = HKDF-SHA256(masterKey, salt="repping:scope-salt:v1", info="repping:scope:v1:check:{scope}")

use crate::error::CryptoResult;
use crate::hkdf::derive_subkey;
use crate::key::DerivedKey;
use sha2::{Digest, Sha256};
use std::fmt;

const SCOPE_SALT: &[u8] = b"repping:scope-salt:v1";
const SCOPE_INFO_PREFIX: &str = "repping:scope:v1:";

/// Bytes of the check-key digest kept in a fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// The keys of one scope. Wiped on drop with their `DerivedKey`s.
#[derive(Clone)]
pub struct ScopeKeys {
    scope: String,
    encryption: DerivedKey,
    blind_index: DerivedKey,
    fingerprint: String,
}

impl ScopeKeys {
    /// Derives the keys for `scope` from the master key.
    pub fn derive(master: &DerivedKey, scope: &str) -> CryptoResult<Self> {
        let encryption = derive_subkey(master, SCOPE_SALT, info(scope, "enc").as_bytes())?;
        let blind_index = derive_subkey(master, SCOPE_SALT, info(scope, "bi").as_bytes())?;
        let check = derive_subkey(master, SCOPE_SALT, info(scope, "check").as_bytes())?;

        let digest = Sha256::digest(check.as_bytes());
        let fingerprint = hex::encode(&digest[..FINGERPRINT_LEN]);

        Ok(Self {
            scope: scope.to_string(),
            encryption,
            blind_index,
            fingerprint,
        })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Key for field AEAD.
    pub fn encryption(&self) -> &DerivedKey {
        &self.encryption
    }

    /// Key for blind-index HMAC.
    pub fn blind_index(&self) -> &DerivedKey {
        &self.blind_index
    }

    /// Public identifier of this key set, safe to store next to the data.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Debug for ScopeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeKeys")
            .field("scope", &self.scope)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn info(scope: &str, purpose: &str) -> String {
    format!("{SCOPE_INFO_PREFIX}{purpose}:{scope}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_random_key;

    #[test]
    fn deterministic() {
        let master = generate_random_key();
        let a = ScopeKeys::derive(&master, "table:accounts").unwrap();
        let b = ScopeKeys::derive(&master, "table:accounts").unwrap();
        assert_eq!(a.encryption().as_bytes(), b.encryption().as_bytes());
        assert_eq!(a.blind_index().as_bytes(), b.blind_index().as_bytes());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn scopes_are_independent() {
        let master = generate_random_key();
        let a = ScopeKeys::derive(&master, "table:accounts").unwrap();
        let b = ScopeKeys::derive(&master, "table:visits").unwrap();
        assert_ne!(a.encryption().as_bytes(), b.encryption().as_bytes());
        assert_ne!(a.blind_index().as_bytes(), b.blind_index().as_bytes());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn purposes_are_separated() {
        let master = generate_random_key();
        let keys = ScopeKeys::derive(&master, "table:accounts").unwrap();
        assert_ne!(keys.encryption().as_bytes(), keys.blind_index().as_bytes());
        assert_ne!(keys.encryption().as_bytes(), master.as_bytes());
    }

    #[test]
    fn fingerprint_is_short_hex() {
        let keys = ScopeKeys::derive(&generate_random_key(), "table:accounts").unwrap();
        assert_eq!(keys.fingerprint().len(), FINGERPRINT_LEN * 2);
        assert!(keys.fingerprint().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_omits_key_material() {
        let keys = ScopeKeys::derive(&generate_random_key(), "table:accounts").unwrap();
        let debug = format!("{keys:?}");
        assert!(debug.contains("table:accounts"));
        assert!(!debug.contains("encryption"));
    }
}
