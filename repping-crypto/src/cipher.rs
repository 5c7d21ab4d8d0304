//! ChaCha20-Poly1305 authenticated encryption with optional associated data.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// A sealed value: random nonce plus ciphertext (tag appended).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Rebuilds a sealed value from a separately stored nonce and ciphertext.
    pub fn from_parts(nonce: &[u8], ciphertext: Vec<u8>) -> CryptoResult<Self> {
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| {
            CryptoError::Decryption(format!(
                "invalid nonce length: expected {NONCE_SIZE}, got {}",
                nonce.len()
            ))
        })?;
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "ciphertext too short: {} bytes, tag alone is {TAG_SIZE}",
                ciphertext.len()
            )));
        }
        Ok(Self { nonce, ciphertext })
    }

    /// Total encoded size (nonce + ciphertext).
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Encodes as base64 of `nonce || ciphertext`.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(bytes)
    }

    /// Decodes the `to_base64` form.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "encoded data too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        Self::from_parts(nonce, ciphertext.to_vec())
    }
}

fn cipher_for(key: &DerivedKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypts `plaintext` with a fresh random nonce and no associated data.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    encrypt_with_aad(key, plaintext, &[])
}

/// Decrypts a value sealed by [`encrypt`].
pub fn decrypt(key: &DerivedKey, encrypted: &EncryptedData) -> CryptoResult<Vec<u8>> {
    decrypt_with_aad(key, encrypted, &[])
}

/// Encrypts `plaintext` bound to `aad`. The same `aad` is required to decrypt.
pub fn encrypt_with_aad(
    key: &DerivedKey,
    plaintext: &[u8],
    aad: &[u8],
) -> CryptoResult<EncryptedData> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher_for(key)
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("AEAD seal failed: {e}")))?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts a value sealed by [`encrypt_with_aad`].
///
/// Fails on a wrong key, a different `aad`, or any tampering.
pub fn decrypt_with_aad(
    key: &DerivedKey,
    encrypted: &EncryptedData,
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    cipher_for(key)
        .decrypt(
            Nonce::from_slice(&encrypted.nonce),
            Payload {
                msg: &encrypted.ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            CryptoError::Decryption(
                "authentication failed (wrong key or tampered data)".to_string(),
            )
        })
}

/// Encrypts a UTF-8 string.
pub fn encrypt_string(key: &DerivedKey, plaintext: &str) -> CryptoResult<EncryptedData> {
    encrypt(key, plaintext.as_bytes())
}

/// Decrypts to a UTF-8 string.
pub fn decrypt_string(key: &DerivedKey, encrypted: &EncryptedData) -> CryptoResult<String> {
    let bytes = decrypt(key, encrypted)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::Decryption(format!("plaintext is not UTF-8: {e}")))
}
