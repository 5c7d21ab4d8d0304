//! Typed record model for encrypted columns.
//!
//! A logical field `name` is stored as two text columns, `name_enc`
//! (base64 ciphertext with tag) and `name_iv` (base64 nonce), plus an
//! optional `name_bi` blind-index column.

use crate::error::{FieldError, VaultError, VaultResult};
use repping_crypto::{decode_column, encode_column, BlindIndex, EncryptedData};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const ENC_SUFFIX: &str = "_enc";
pub const IV_SUFFIX: &str = "_iv";
pub const BI_SUFFIX: &str = "_bi";

/// Stable identifier of a record, bound into every field's AAD.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// A fresh random (v4) UUID. Generate it before the first encryption.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier. Empty identifiers are rejected.
    pub fn parse(id: impl Into<String>) -> VaultResult<Self> {
        let id = id.into();
        if crate::service::is_blank(&id) {
            return Err(VaultError::Encryption("record id must not be empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Output of an encryption call: sealed fields plus any blind indexes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptedFields {
    fields: BTreeMap<String, EncryptedData>,
    blind_indexes: BTreeMap<String, BlindIndex>,
}

impl EncryptedFields {
    pub(crate) fn new(fields: BTreeMap<String, EncryptedData>) -> Self {
        Self {
            fields,
            blind_indexes: BTreeMap::new(),
        }
    }

    pub(crate) fn attach_blind_index(&mut self, name: String, index: BlindIndex) {
        self.blind_indexes.insert(name, index);
    }

    pub fn get(&self, name: &str) -> Option<&EncryptedData> {
        self.fields.get(name)
    }

    pub fn blind_index(&self, name: &str) -> Option<&BlindIndex> {
        self.blind_indexes.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column form: `{name}_enc`, `{name}_iv` and `{name}_bi`.
    pub fn to_columns(&self) -> BTreeMap<String, String> {
        let mut columns = BTreeMap::new();
        for (name, sealed) in &self.fields {
            columns.insert(format!("{name}{ENC_SUFFIX}"), encode_column(&sealed.ciphertext));
            columns.insert(format!("{name}{IV_SUFFIX}"), encode_column(&sealed.nonce));
        }
        for (name, index) in &self.blind_indexes {
            columns.insert(format!("{name}{BI_SUFFIX}"), index.as_str().to_string());
        }
        columns
    }

    /// Column form as a JSON object, ready to merge into an upsert payload.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .to_columns()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Value::Object(map)
    }

    /// Reads the sealed fields back as a record for decryption.
    pub fn to_record(&self) -> EncryptedRecord {
        EncryptedRecord {
            fields: self
                .fields
                .iter()
                .map(|(name, sealed)| (name.clone(), StoredField::Sealed(sealed.clone())))
                .collect(),
        }
    }
}

/// One stored field as read back from the record store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredField {
    Sealed(EncryptedData),
    /// The enc/iv pair was present but could not be decoded.
    Malformed(String),
}

/// The encrypted columns of one stored record, normalised to binary form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptedRecord {
    fields: BTreeMap<String, StoredField>,
}

impl EncryptedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sealed field.
    pub fn insert(&mut self, name: impl Into<String>, sealed: EncryptedData) {
        self.fields.insert(name.into(), StoredField::Sealed(sealed));
    }

    /// Adds a field from its stored `enc`/`iv` column values.
    ///
    /// Either half may be hex-escaped. Missing or empty halves mean the
    /// field was never set and nothing is added; undecodable values are
    /// kept as [`StoredField::Malformed`].
    pub fn insert_columns(&mut self, name: impl Into<String>, enc: Option<&str>, iv: Option<&str>) {
        let (Some(enc), Some(iv)) = (enc, iv) else {
            return;
        };
        if enc.is_empty() || iv.is_empty() {
            return;
        }
        let field = match decode_pair(enc, iv) {
            Ok(sealed) => StoredField::Sealed(sealed),
            Err(reason) => StoredField::Malformed(reason),
        };
        self.fields.insert(name.into(), field);
    }

    /// Collects every `{name}_enc`/`{name}_iv` pair from a column map.
    pub fn from_columns(columns: &BTreeMap<String, String>) -> Self {
        let mut record = Self::new();
        for (column, enc) in columns {
            if let Some(name) = column.strip_suffix(ENC_SUFFIX) {
                let iv = columns.get(&format!("{name}{IV_SUFFIX}"));
                record.insert_columns(name, Some(enc.as_str()), iv.map(String::as_str));
            }
        }
        record
    }

    pub fn get(&self, name: &str) -> Option<&StoredField> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn decode_pair(enc: &str, iv: &str) -> Result<EncryptedData, String> {
    let ciphertext = decode_column(enc).map_err(|e| format!("enc: {e}"))?;
    let nonce = decode_column(iv).map_err(|e| format!("iv: {e}"))?;
    EncryptedData::from_parts(&nonce, ciphertext).map_err(|e| e.to_string())
}

/// Result of a best-effort decryption.
///
/// `values` holds every field that decrypted; `failures` holds the ones that
/// did not. Requested fields absent from the record appear in neither.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecryptedFields {
    pub values: BTreeMap<String, String>,
    pub failures: BTreeMap<String, FieldError>,
}

impl DecryptedFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// The plaintext, or `fallback` when the field is missing or failed.
    ///
    /// Used by views that still carry legacy plaintext columns.
    pub fn get_or<'a>(&'a self, name: &str, fallback: &'a str) -> &'a str {
        self.get(name).unwrap_or(fallback)
    }

    pub fn failure(&self, name: &str) -> Option<&FieldError> {
        self.failures.get(name)
    }

    /// True when no requested field failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Escalates the first failure into an error, for callers that need
    /// every field.
    pub fn into_complete(self) -> VaultResult<BTreeMap<String, String>> {
        match self.failures.into_iter().next() {
            None => Ok(self.values),
            Some((name, err)) => Err(VaultError::Decryption(format!("field {name}: {err}"))),
        }
    }
}
