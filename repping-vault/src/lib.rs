//! Field-level encryption service for Repping.
//!
//! Provides the session object callers use around every sensitive read and
//! write:
//! - Passphrase unlock with an account-bound verifier
//! - Lazy per-scope key provisioning with single-flight registration
//! - Record-bound field encryption and best-effort decryption
//! - Blind indexes for equality search over ciphertext
//! - Adapters between stored column rows and typed records

pub mod config;
pub mod error;
pub mod record;
pub mod registry;
pub mod service;
pub mod wire;

pub use config::{CryptoConfig, DEFAULT_SCOPES};
pub use error::{FieldError, RegistryError, RegistryResult, VaultError, VaultResult};
pub use record::{DecryptedFields, EncryptedFields, EncryptedRecord, RecordId, StoredField};
pub use registry::{InMemoryKeyRegistry, KeyRegistry, ScopeMarker};
pub use service::CryptoService;
pub use wire::{
    decrypted_to_object, decrypted_to_pairs, encrypted_record_from_json,
    plaintext_fields_from_json,
};

pub use repping_crypto::{BlindIndex, EncryptedData, KdfParams, ScopeKeys};
