//! Row-level flows through the JSON adapters, as the import and list views
//! use them.

mod support;

use pretty_assertions::assert_eq;
use repping_vault::{
    decrypted_to_object, decrypted_to_pairs, encrypted_record_from_json,
    plaintext_fields_from_json, EncryptedRecord, FieldError, RecordId, VaultError,
};
use serde_json::{json, Value};
use support::*;

const SCOPE: &str = "table:contacts";
const RECORD_TYPE: &str = "contacts";

fn merge(row: &mut Value, columns: Value) {
    if let (Value::Object(row), Value::Object(columns)) = (row, columns) {
        row.extend(columns);
    }
}

#[tokio::test]
async fn import_row_round_trips_through_json() {
    let (service, _) = unlocked_service().await;
    let id = RecordId::generate();

    let input = json!([
        { "name": "contact_name", "value": "Mario Rossi" },
        { "name": "email", "value": "mario@bar.it" },
        { "name": "phone", "value": "+39 333 000 111" },
    ]);
    let fields = plaintext_fields_from_json(&input).unwrap();
    let encrypted = service
        .encrypt_record(SCOPE, RECORD_TYPE, id.as_str(), &fields, &["email"])
        .await
        .unwrap();

    let mut row = json!({ "id": id.as_str(), "account_id": ACCOUNT });
    merge(&mut row, encrypted.to_json());
    assert!(row["email_bi"].is_string());
    assert!(row.get("email").is_none());

    let record = EncryptedRecord::from_json(&row).unwrap();
    let decrypted = service
        .decrypt_fields(
            SCOPE,
            RECORD_TYPE,
            row["id"].as_str().unwrap(),
            &record,
            &["contact_name", "email", "phone"],
        )
        .await
        .unwrap();

    assert_eq!(
        decrypted_to_pairs(&decrypted),
        json!([
            { "name": "contact_name", "value": "Mario Rossi" },
            { "name": "email", "value": "mario@bar.it" },
            { "name": "phone", "value": "+39 333 000 111" },
        ])
    );
    assert_eq!(decrypted_to_object(&decrypted)["email"], "mario@bar.it");
}

#[tokio::test]
async fn duplicate_detection_via_blind_index_column() {
    let (service, _) = unlocked_service().await;
    let fields = plaintext_fields_from_json(&json!({ "email": "mario@bar.it" })).unwrap();

    let first = service
        .encrypt_record(SCOPE, RECORD_TYPE, RecordId::generate().as_str(), &fields, &["email"])
        .await
        .unwrap();
    let second = service
        .encrypt_record(SCOPE, RECORD_TYPE, RecordId::generate().as_str(), &fields, &["email"])
        .await
        .unwrap();

    let probe = service.compute_blind_index(SCOPE, "mario@bar.it").await.unwrap();
    assert_eq!(first.to_json()["email_bi"], probe.as_str());
    assert_eq!(second.to_json()["email_bi"], probe.as_str());
    assert_ne!(first.to_json()["email_enc"], second.to_json()["email_enc"]);
}

#[tokio::test]
async fn bytea_escaped_row_decrypts() {
    let (service, _) = unlocked_service().await;
    let id = RecordId::generate();
    let fields = plaintext_fields_from_json(&json!({ "vat_number": "IT01234567890" })).unwrap();
    let encrypted = service
        .encrypt_fields(SCOPE, RECORD_TYPE, id.as_str(), &fields)
        .await
        .unwrap();

    let escaped: serde_json::Map<String, Value> = encrypted
        .to_columns()
        .into_iter()
        .map(|(k, v)| (k, Value::String(format!("\\x{}", hex_of(&v)))))
        .collect();
    let record = encrypted_record_from_json(&Value::Object(escaped)).unwrap();

    let decrypted = service
        .decrypt_fields(SCOPE, RECORD_TYPE, id.as_str(), &record, &["vat_number"])
        .await
        .unwrap();
    assert_eq!(decrypted.get("vat_number"), Some("IT01234567890"));
}

#[tokio::test]
async fn legacy_row_without_ciphertext_falls_back_to_plaintext_column() {
    let (service, _) = unlocked_service().await;
    let row = json!({
        "id": "33333333-3333-3333-3333-333333333333",
        "name": "Trattoria Da Gino",
        "name_enc": null,
        "name_iv": null,
    });

    let record = encrypted_record_from_json(&row).unwrap();
    let decrypted = service
        .decrypt_fields(SCOPE, RECORD_TYPE, row["id"].as_str().unwrap(), &record, &["name"])
        .await
        .unwrap();

    assert!(decrypted.is_complete());
    assert_eq!(
        decrypted.get_or("name", row["name"].as_str().unwrap()),
        "Trattoria Da Gino"
    );
}

#[tokio::test]
async fn corrupt_iv_reported_per_field() {
    let (service, _) = unlocked_service().await;
    let id = RecordId::generate();
    let fields = plaintext_fields_from_json(&json!({ "name": "Bar", "email": "a@b.it" })).unwrap();
    let mut row = service
        .encrypt_fields(SCOPE, RECORD_TYPE, id.as_str(), &fields)
        .await
        .unwrap()
        .to_json();
    row["email_iv"] = json!("\\xZZ");

    let record = encrypted_record_from_json(&row).unwrap();
    let decrypted = service
        .decrypt_fields(SCOPE, RECORD_TYPE, id.as_str(), &record, &["name", "email"])
        .await
        .unwrap();

    assert_eq!(decrypted.get("name"), Some("Bar"));
    assert!(matches!(decrypted.failure("email"), Some(FieldError::Malformed(_))));

    let err = decrypted.into_complete().unwrap_err();
    assert!(matches!(err, VaultError::Decryption(_)));
}

fn hex_of(text: &str) -> String {
    text.bytes().map(|b| format!("{b:02x}")).collect()
}
