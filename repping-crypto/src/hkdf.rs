//! HKDF-SHA256 subkey derivation.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{DerivedKey, KEY_SIZE};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

/// Derives a 256-bit subkey from `ikm` with HKDF-SHA256.
///
/// # Arguments
/// * `ikm` - Input keying material (normally the master key)
/// * `salt` - Salt for domain separation
/// * `info` - Context string; distinct `info` values yield independent keys
pub fn derive_subkey(ikm: &DerivedKey, salt: &[u8], info: &[u8]) -> CryptoResult<DerivedKey> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {e}")))?;
    let key = DerivedKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}
