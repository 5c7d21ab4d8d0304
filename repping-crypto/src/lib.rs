//! Field encryption primitives for Repping.
//!
//! Provides the building blocks of client-side field encryption:
//! - Argon2id for deriving the master key from a passphrase
//! - HKDF-SHA256 for per-scope subkeys
//! - ChaCha20-Poly1305 with record-bound associated data
//! - HMAC-SHA256 blind indexes for equality search
//!
//! # Architecture
//!
//! The key hierarchy has two tiers:
//!
//! 1. **Master Key**: Derived from the user's passphrase with Argon2id and an
//!    account-bound salt. Never stored; re-derived at every unlock.
//!
//! 2. **Scope Keys**: Derived from the master key with HKDF, one set per
//!    scope (e.g. `"table:accounts"`). Each set holds an encryption key and
//!    a blind-index key.
//!
//! Because both tiers are deterministic, every device unlocked with the same
//! passphrase converges on the same keys without server coordination.
//!
//! Field ciphertexts are bound to their record with [`RecordAad`], so a
//! ciphertext copied onto another record fails authentication.

mod aad;
mod blind_index;
mod cipher;
pub mod encoding;
mod error;
mod hkdf;
mod key;
mod scope;

pub use aad::RecordAad;
pub use blind_index::{compute_blind_index, BlindIndex};
pub use cipher::{
    decrypt, decrypt_string, decrypt_with_aad, encrypt, encrypt_string, encrypt_with_aad,
    EncryptedData, NONCE_SIZE, TAG_SIZE,
};
pub use encoding::{decode_column, encode_column, normalize_stored_value, HEX_ESCAPE_PREFIX};
pub use error::{CryptoError, CryptoResult};
pub use crate::hkdf::derive_subkey;
pub use key::{derive_key, generate_random_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
pub use scope::ScopeKeys;
