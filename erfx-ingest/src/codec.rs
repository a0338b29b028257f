//! Wire codec for inbound inspection results
//!
//! Station payloads are JSON objects whose field casing varies between
//! producers (`correlationId`, `CorrelationId`, `correlation_id`). Decoding is
//! schema-first: every known field has one canonical name, incoming keys are
//! matched against it ignoring case and `_`/`-` separators, and the rewritten
//! object is handed to `InspectionResult`'s serde impl.
//!
//! - Unknown keys are dropped.
//! - `null` is treated as missing, and missing fields take zero values.
//! - Keys of `expectedItems`/`actualItems` are SKUs and are never rewritten.

use erfx_common::InspectionResult;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a payload could not be decoded
///
/// Decode failures are final: redelivering the same bytes fails the same way,
/// so callers log and drop.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("payload does not match the inspection result shape: {0}")]
    Shape(#[source] serde_json::Error),
}

const RECORD_FIELDS: &[&str] = &[
    "correlationId",
    "storeCode",
    "region",
    "invoiceNumber",
    "barcodeRaw",
    "inspectedAtUtc",
    "isOk",
    "expectedTotal",
    "actualTotal",
    "declaredTotal",
    "elapsedMs",
    "differences",
    "expectedItems",
    "actualItems",
    "epcSkuPairs",
    "failedEpcCount",
    "errorMessage",
    "warningMessage",
    "uploadedAtUtc",
    "uploadAttempts",
    "isUploadPermanentlyFailed",
];

const DIFFERENCE_FIELDS: &[&str] = &["sku", "expected", "actual"];

const EPC_FIELDS: &[&str] = &["epc", "sku"];

/// Decode a raw message payload into an inspection result
pub fn decode(payload: &[u8]) -> Result<InspectionResult, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    // .NET producers may prepend a byte order mark
    let text = text.trim_start_matches('\u{feff}');

    let value: Value = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let object = match value {
        Value::Object(map) => map,
        other => return Err(DecodeError::NotAnObject(json_kind(&other))),
    };

    let normalized = normalize_record(object);
    serde_json::from_value(Value::Object(normalized)).map_err(DecodeError::Shape)
}

fn normalize_record(object: Map<String, Value>) -> Map<String, Value> {
    let mut record = normalize_object(object, RECORD_FIELDS);

    for (field, nested_fields) in [("differences", DIFFERENCE_FIELDS), ("epcSkuPairs", EPC_FIELDS)] {
        if let Some(Value::Array(items)) = record.get_mut(field) {
            for item in items.iter_mut() {
                if let Value::Object(map) = item {
                    *map = normalize_object(std::mem::take(map), nested_fields);
                }
            }
        }
    }

    for field in ["expectedItems", "actualItems"] {
        if let Some(Value::Object(items)) = record.get_mut(field) {
            items.retain(|_, quantity| !quantity.is_null());
        }
    }

    record
}

/// Keep only known fields, renamed to their canonical spelling
///
/// When a payload carries the same field under two spellings, the first
/// non-null one in payload order wins (`preserve_order` keeps the map in
/// document order).
fn normalize_object(object: Map<String, Value>, fields: &[&'static str]) -> Map<String, Value> {
    let mut normalized = Map::with_capacity(object.len());
    for (key, value) in object {
        if value.is_null() {
            continue;
        }
        if let Some(canonical) = canonical_name(fields, &key) {
            normalized.entry(canonical).or_insert(value);
        }
    }
    normalized
}

fn canonical_name(fields: &[&'static str], key: &str) -> Option<&'static str> {
    let folded = fold_key(key);
    fields.iter().copied().find(|field| fold_key(field) == folded)
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use erfx_common::DifferenceKind;

    const FULL_PAYLOAD: &str = r#"{
        "correlationId": "c0ffee-01",
        "storeCode": "S001",
        "region": "KR-11",
        "invoiceNumber": "INV-20250131-1234",
        "inspectedAtUtc": "2025-01-31T08:15:00.123Z",
        "isOk": false,
        "expectedTotal": 5,
        "actualTotal": 3,
        "declaredTotal": 5,
        "elapsedMs": 812,
        "differences": [{"sku": "SKU-A001", "expected": 5, "actual": 3}],
        "expectedItems": {"SKU-A001": 5},
        "actualItems": {"SKU-A001": 3},
        "epcSkuPairs": [{"epc": "E200341201", "sku": "SKU-A001"}, {"epc": "E200341202"}],
        "failedEpcCount": 1,
        "errorMessage": null,
        "warningMessage": "antenna 2 weak"
    }"#;

    #[test]
    fn test_decode_full_payload() {
        let record = decode(FULL_PAYLOAD.as_bytes()).unwrap();
        assert_eq!(record.correlation_id, "c0ffee-01");
        assert_eq!(record.store_code.as_deref(), Some("S001"));
        assert_eq!(record.inspected_at_utc.minute(), 15);
        assert!(!record.is_ok);
        assert_eq!(record.elapsed_ms, 812);
        assert_eq!(record.differences.len(), 1);
        assert_eq!(record.differences[0].delta(), -2);
        assert_eq!(record.differences[0].kind(), DifferenceKind::Under);
        assert_eq!(record.expected_items.get("SKU-A001"), Some(&5));
        assert_eq!(record.epc_sku_pairs[1].sku, None);
        assert_eq!(record.error_message, None);
        assert_eq!(record.warning_message.as_deref(), Some("antenna 2 weak"));
    }

    #[test]
    fn test_duplicate_spellings_keep_first_in_payload_order() {
        let record = decode(br#"{"correlationId": "a", "CORRELATIONID": "b"}"#).unwrap();
        assert_eq!(record.correlation_id, "a");

        let record = decode(br#"{"correlation_id": "z", "CorrelationId": "y"}"#).unwrap();
        assert_eq!(record.correlation_id, "z");

        let record = decode(br#"{"storeCode": null, "StoreCode": "S002"}"#).unwrap();
        assert_eq!(record.store_code.as_deref(), Some("S002"));
    }

    #[test]
    fn test_unknown_field_is_ignored() {
        let record = decode(br#"{"correlationId": "x-1", "foo": 123}"#).unwrap();
        assert_eq!(record.correlation_id, "x-1");
    }

    #[test]
    fn test_missing_fields_take_zero_values() {
        let record = decode(br#"{"correlationId": "x-2"}"#).unwrap();
        assert!(record.differences.is_empty());
        assert!(record.expected_items.is_empty());
        assert!(record.epc_sku_pairs.is_empty());
        assert_eq!(record.expected_total, 0);
        assert!(!record.is_ok);
        assert_eq!(record.invoice_number, None);
        assert_eq!(record.inspected_at_utc.timestamp(), 0);
    }

    #[test]
    fn test_field_names_are_case_insensitive() {
        let record = decode(
            br#"{"CorrelationID": "x-3", "ISOK": true, "Differences": [{"SKU": "A", "Expected": 1, "ACTUAL": 2}]}"#,
        )
        .unwrap();
        assert_eq!(record.correlation_id, "x-3");
        assert!(record.is_ok);
        assert_eq!(record.differences[0].sku, "A");
        assert_eq!(record.differences[0].kind(), DifferenceKind::Over);
    }

    #[test]
    fn test_snake_case_producer_fields() {
        let record = decode(br#"{"correlation_id": "x-4", "elapsed_ms": 7, "epc_sku_pairs": []}"#).unwrap();
        assert_eq!(record.correlation_id, "x-4");
        assert_eq!(record.elapsed_ms, 7);
    }

    #[test]
    fn test_sku_keys_are_preserved() {
        let record = decode(br#"{"correlationId": "x-5", "actualItems": {"sku-a001": 2, "SKU-A001": 1}}"#).unwrap();
        assert_eq!(record.actual_items.len(), 2);
        assert_eq!(record.actual_items.get("sku-a001"), Some(&2));
    }

    #[test]
    fn test_offsetless_timestamp_is_utc() {
        let record = decode(br#"{"correlationId": "x-6", "inspectedAtUtc": "2025-01-31T08:15:00.1234567"}"#).unwrap();
        assert_eq!(record.inspected_at_utc.day(), 31);
        assert_eq!(record.inspected_at_utc.hour(), 8);
    }

    #[test]
    fn test_null_collections_decode_as_empty() {
        let record = decode(br#"{"correlationId": "x-7", "differences": null, "expectedItems": {"A": null}}"#).unwrap();
        assert!(record.differences.is_empty());
        assert!(record.expected_items.is_empty());
    }

    #[test]
    fn test_byte_order_mark_is_accepted() {
        let mut payload = "\u{feff}".as_bytes().to_vec();
        payload.extend_from_slice(br#"{"correlationId": "x-8"}"#);
        assert_eq!(decode(&payload).unwrap().correlation_id, "x-8");
    }

    #[test]
    fn test_bare_string_is_rejected() {
        let err = decode(br#""just a string""#).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject("string")));
    }

    #[test]
    fn test_truncated_json_is_rejected() {
        let err = decode(br#"{"correlationId": "x-9", "isOk": tr"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_wrong_field_type_is_shape_error() {
        let err = decode(br#"{"correlationId": "x-10", "expectedTotal": "five"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Shape(_)));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let err = decode(&[0x7b, 0xff, 0xfe, 0x7d]).unwrap_err();
        assert!(matches!(err, DecodeError::NotUtf8(_)));
    }
}
