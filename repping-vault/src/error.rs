//! Error types for the encryption service.

use thiserror::Error;

/// Result type for service operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors surfaced by [`CryptoService`](crate::CryptoService).
#[derive(Debug, Error)]
pub enum VaultError {
    /// Passphrase rejected at unlock (empty, or does not match the account).
    #[error("unlock failed: {0}")]
    Authentication(String),

    /// A key operation was attempted while the service is locked.
    #[error("crypto service is locked")]
    NotUnlocked,

    /// Field encryption failed or its input was invalid.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed for a whole call, or a field error was escalated.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Scope or verifier round trip with the key registry failed.
    #[error("scope provisioning failed: {0}")]
    Provisioning(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl VaultError {
    /// Whether a caller may retry the same call (with backoff).
    ///
    /// Only registry round trips fail transiently; everything else is a
    /// wrong input or a wrong key and fails identically on retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, VaultError::Provisioning(_))
    }
}

/// Why one field of a record could not be decrypted.
///
/// Non-fatal: reported alongside the fields that did decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Tag mismatch: wrong record id or type, wrong key, or tampered bytes.
    #[error("field unavailable: authentication failed")]
    Authentication,

    /// The stored enc/iv values could not be decoded.
    #[error("field unavailable: malformed stored value: {0}")]
    Malformed(String),

    #[error("field unavailable: decrypted value is not UTF-8")]
    InvalidUtf8,
}

impl From<FieldError> for VaultError {
    fn from(err: FieldError) -> Self {
        VaultError::Decryption(err.to_string())
    }
}

/// Errors reported by a [`KeyRegistry`](crate::KeyRegistry) implementation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backing store could not be reached or timed out.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The store answered with data that cannot be interpreted.
    #[error("registry data corrupt: {0}")]
    Corrupt(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

impl From<RegistryError> for VaultError {
    fn from(err: RegistryError) -> Self {
        VaultError::Provisioning(err.to_string())
    }
}
