//! Associated data binding a field ciphertext to its record.
//!
//! Format: `"repping:aad:v1\0" || u32be(len(record_type)) || record_type || u32be(len(record_id)) || record_id`

const AAD_PREFIX: &[u8] = b"repping:aad:v1\0";

/// AAD bytes for one record. Every field of the record shares it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordAad(Vec<u8>);

impl RecordAad {
    /// Builds the AAD for `(record_type, record_id)`.
    ///
    /// Both parts are length-prefixed, so `("a:b", "c")` and `("a", "b:c")`
    /// never collide.
    pub fn new(record_type: &str, record_id: &str) -> Self {
        let mut bytes =
            Vec::with_capacity(AAD_PREFIX.len() + 8 + record_type.len() + record_id.len());
        bytes.extend_from_slice(AAD_PREFIX);
        push_len_prefixed(&mut bytes, record_type.as_bytes());
        push_len_prefixed(&mut bytes, record_id.as_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn push_len_prefixed(out: &mut Vec<u8>, part: &[u8]) {
    // Field values are bounded well below 4 GiB; saturate rather than wrap.
    let len = u32::try_from(part.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(part);
}
