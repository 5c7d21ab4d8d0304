//! Text encodings used at the record-store boundary.
//!
//! Ciphertext and nonce columns hold standard base64 text. Stores that
//! keep those columns as byte strings hand them back hex-escaped
//! (`\x` followed by hex pairs of the stored bytes), which
//! [`normalize_stored_value`] undoes.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::borrow::Cow;

/// Prefix of a backslash-escaped hex byte string.
pub const HEX_ESCAPE_PREFIX: &str = "\\x";

/// Returns the stored text with any hex escape removed.
///
/// `\x4142` becomes `AB`. Values without the prefix are returned unchanged
/// and without allocating.
pub fn normalize_stored_value(value: &str) -> CryptoResult<Cow<'_, str>> {
    match value.strip_prefix(HEX_ESCAPE_PREFIX) {
        None => Ok(Cow::Borrowed(value)),
        Some(hex_digits) => {
            let bytes = hex::decode(hex_digits)
                .map_err(|e| CryptoError::Encoding(format!("invalid hex escape: {e}")))?;
            String::from_utf8(bytes)
                .map(Cow::Owned)
                .map_err(|_| CryptoError::Encoding("hex escape is not UTF-8 text".to_string()))
        }
    }
}

/// Encodes bytes as a text column value.
pub fn encode_column(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a text column value, accepting the hex-escaped form too.
pub fn decode_column(value: &str) -> CryptoResult<Vec<u8>> {
    let text = normalize_stored_value(value)?;
    STANDARD
        .decode(text.trim().as_bytes())
        .map_err(|e| CryptoError::Encoding(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_value_passes_through_borrowed() {
        let out = normalize_stored_value("q83vASNFZ4k=").unwrap();
        assert!(matches!(out, Cow::Borrowed("q83vASNFZ4k=")));
    }

    #[test]
    fn hex_escape_is_decoded() {
        // "AB==" as stored bytes
        let out = normalize_stored_value("\\x41423d3d").unwrap();
        assert_eq!(out, "AB==");
    }

    #[test]
    fn uppercase_hex_accepted() {
        assert_eq!(normalize_stored_value("\\x4A4B").unwrap(), "JK");
    }

    #[test]
    fn empty_escape_is_empty_string() {
        assert_eq!(normalize_stored_value("\\x").unwrap(), "");
    }

    #[test]
    fn odd_length_escape_rejected() {
        let err = normalize_stored_value("\\x414").unwrap_err();
        assert!(matches!(err, CryptoError::Encoding(_)));
    }

    #[test]
    fn non_hex_escape_rejected() {
        assert!(normalize_stored_value("\\xzz").is_err());
    }

    #[test]
    fn non_utf8_escape_rejected() {
        assert!(normalize_stored_value("\\xff").is_err());
    }

    #[test]
    fn column_roundtrip_plain_and_escaped() {
        let raw = [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01];
        let text = encode_column(&raw);
        assert_eq!(decode_column(&text).unwrap(), raw);

        let escaped = format!("{HEX_ESCAPE_PREFIX}{}", hex::encode(text.as_bytes()));
        assert_eq!(decode_column(&escaped).unwrap(), raw);
    }

    #[test]
    fn bad_base64_rejected() {
        let err = decode_column("not base64!!").unwrap_err();
        assert!(matches!(err, CryptoError::Encoding(_)));
    }
}
