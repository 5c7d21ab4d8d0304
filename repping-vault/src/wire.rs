//! Adapters between loosely-shaped JSON rows and the typed record model.
//!
//! Rows arrive either as plain objects (`{"name": "..."}`) or as arrays of
//! `{"name": ..., "value": ...}` pairs. Both are normalised here so the
//! service only ever sees typed maps.

use crate::error::{VaultError, VaultResult};
use crate::record::{DecryptedFields, EncryptedRecord, ENC_SUFFIX, IV_SUFFIX};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

static NULL: Value = Value::Null;

/// Reads plaintext fields from an object or an array of name/value pairs.
///
/// Every value must be a string; anything else is an encryption error, so
/// a number or null never reaches the cipher as its JSON rendering.
pub fn plaintext_fields_from_json(value: &Value) -> VaultResult<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    for (name, field_value) in entries(value)? {
        match field_value {
            Value::String(text) => {
                fields.insert(name, text.clone());
            }
            other => {
                return Err(VaultError::Encryption(format!(
                    "plaintext for field {name} is not a string (got {})",
                    json_type(other)
                )));
            }
        }
    }
    Ok(fields)
}

/// Builds an [`EncryptedRecord`] from a stored row.
///
/// Picks up every `{name}_enc`/`{name}_iv` string pair, decoding hex escapes.
/// Nulls and non-string columns count as "never set".
pub fn encrypted_record_from_json(row: &Value) -> VaultResult<EncryptedRecord> {
    let columns: BTreeMap<String, &Value> = entries(row)?.into_iter().collect();
    let mut record = EncryptedRecord::new();
    for (column, enc) in &columns {
        let Some(name) = column.strip_suffix(ENC_SUFFIX) else {
            continue;
        };
        let iv = columns.get(&format!("{name}{IV_SUFFIX}")).copied();
        record.insert_columns(name, enc.as_str(), iv.and_then(Value::as_str));
    }
    Ok(record)
}

impl EncryptedRecord {
    /// See [`encrypted_record_from_json`].
    pub fn from_json(row: &Value) -> VaultResult<Self> {
        encrypted_record_from_json(row)
    }
}

/// Renders decrypted values as an array of `{name, value}` pairs.
pub fn decrypted_to_pairs(decrypted: &DecryptedFields) -> Value {
    Value::Array(
        decrypted
            .values
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    )
}

/// Renders decrypted values as a flat JSON object.
pub fn decrypted_to_object(decrypted: &DecryptedFields) -> Value {
    let map: Map<String, Value> = decrypted
        .values
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();
    Value::Object(map)
}

fn entries(value: &Value) -> VaultResult<Vec<(String, &Value)>> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v)).collect()),
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| {
                let obj = item.as_object()?;
                let name = obj.get("name")?.as_str()?;
                Some((name.to_string(), obj.get("value").unwrap_or(&NULL)))
            })
            .collect()),
        other => Err(VaultError::Encryption(format!(
            "expected an object or an array of name/value pairs, got {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
