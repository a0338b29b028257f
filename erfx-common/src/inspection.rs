//! Inspection result data model
//!
//! One `InspectionResult` is produced per box scanned by a station. The
//! correlation id is the deduplication key; everything else is payload.
//!
//! Difference deltas and their classification are computed from
//! `expected`/`actual` on every read and are never stored on their own.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::time::to_millis_string;

/// Classification of a per-SKU count difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DifferenceKind {
    /// More items read than expected
    Over,
    /// Fewer items read than expected
    Under,
    /// Counts agree
    Match,
}

impl DifferenceKind {
    /// Classify a signed delta (`actual - expected`)
    pub fn from_delta(delta: i64) -> Self {
        match delta {
            d if d > 0 => DifferenceKind::Over,
            d if d < 0 => DifferenceKind::Under,
            _ => DifferenceKind::Match,
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            DifferenceKind::Over => "Over",
            DifferenceKind::Under => "Under",
            DifferenceKind::Match => "Match",
        }
    }
}

impl std::fmt::Display for DifferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected vs. actual count for one SKU
///
/// Serializes with the derived `difference` and `type` fields for observers;
/// deserialization ignores them and only reads the inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SkuDifference {
    pub sku: String,
    pub expected: i32,
    pub actual: i32,
}

impl SkuDifference {
    pub fn new(sku: impl Into<String>, expected: i32, actual: i32) -> Self {
        Self {
            sku: sku.into(),
            expected,
            actual,
        }
    }

    /// `actual - expected`, widened so extreme counts cannot overflow
    pub fn delta(&self) -> i64 {
        i64::from(self.actual) - i64::from(self.expected)
    }

    pub fn kind(&self) -> DifferenceKind {
        DifferenceKind::from_delta(self.delta())
    }
}

impl Serialize for SkuDifference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SkuDifference", 5)?;
        state.serialize_field("sku", &self.sku)?;
        state.serialize_field("expected", &self.expected)?;
        state.serialize_field("actual", &self.actual)?;
        state.serialize_field("difference", &self.delta())?;
        state.serialize_field("type", self.kind().as_str())?;
        state.end()
    }
}

/// Raw RFID tag read with its resolved SKU (if any)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpcSkuPair {
    pub epc: String,
    pub sku: Option<String>,
}

/// Result of inspecting one box
///
/// Field names on the wire are camelCase. Decoding from station payloads goes
/// through the ingest codec, which normalizes key casing before handing the
/// object to this type's `Deserialize` impl.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InspectionResult {
    // === Identity ===
    pub correlation_id: String,
    pub store_code: Option<String>,
    pub region: Option<String>,
    pub invoice_number: Option<String>,
    pub barcode_raw: Option<String>,
    #[serde(with = "crate::time::lenient_utc")]
    pub inspected_at_utc: DateTime<Utc>,

    // === Summary ===
    pub is_ok: bool,
    pub expected_total: i32,
    pub actual_total: i32,
    pub declared_total: i32,
    pub elapsed_ms: i64,

    // === Detail ===
    pub differences: Vec<SkuDifference>,
    pub expected_items: BTreeMap<String, i32>,
    pub actual_items: BTreeMap<String, i32>,
    pub epc_sku_pairs: Vec<EpcSkuPair>,

    // === Errors ===
    pub failed_epc_count: i32,
    pub error_message: Option<String>,
    pub warning_message: Option<String>,

    // === Upload bookkeeping (maintained by the store, not the pipeline) ===
    #[serde(with = "crate::time::lenient_utc_option")]
    pub uploaded_at_utc: Option<DateTime<Utc>>,
    pub upload_attempts: i32,
    pub is_upload_permanently_failed: bool,
}

impl InspectionResult {
    /// `OK` / `NG` label shown to operators
    pub fn result_label(&self) -> &'static str {
        if self.is_ok {
            "OK"
        } else {
            "NG"
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded_at_utc.is_some()
    }

    pub fn has_correlation_id(&self) -> bool {
        !self.correlation_id.is_empty()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectionView<'a> {
    correlation_id: &'a str,
    store_code: &'a Option<String>,
    region: &'a Option<String>,
    invoice_number: &'a Option<String>,
    barcode_raw: &'a Option<String>,
    inspected_at_utc: String,
    is_ok: bool,
    result: &'static str,
    expected_total: i32,
    actual_total: i32,
    declared_total: i32,
    elapsed_ms: i64,
    differences: &'a [SkuDifference],
    expected_items: &'a BTreeMap<String, i32>,
    actual_items: &'a BTreeMap<String, i32>,
    epc_sku_pairs: &'a [EpcSkuPair],
    failed_epc_count: i32,
    error_message: &'a Option<String>,
    warning_message: &'a Option<String>,
    uploaded_at_utc: Option<String>,
    is_uploaded: bool,
    upload_attempts: i32,
    is_upload_permanently_failed: bool,
}

impl Serialize for InspectionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        InspectionView {
            correlation_id: &self.correlation_id,
            store_code: &self.store_code,
            region: &self.region,
            invoice_number: &self.invoice_number,
            barcode_raw: &self.barcode_raw,
            inspected_at_utc: to_millis_string(&self.inspected_at_utc),
            is_ok: self.is_ok,
            result: self.result_label(),
            expected_total: self.expected_total,
            actual_total: self.actual_total,
            declared_total: self.declared_total,
            elapsed_ms: self.elapsed_ms,
            differences: &self.differences,
            expected_items: &self.expected_items,
            actual_items: &self.actual_items,
            epc_sku_pairs: &self.epc_sku_pairs,
            failed_epc_count: self.failed_epc_count,
            error_message: &self.error_message,
            warning_message: &self.warning_message,
            uploaded_at_utc: self.uploaded_at_utc.as_ref().map(to_millis_string),
            is_uploaded: self.is_uploaded(),
            upload_attempts: self.upload_attempts,
            is_upload_permanently_failed: self.is_upload_permanently_failed,
        }
        .serialize(serializer)
    }
}

/// An inspection result as committed by the store, with its row identity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredInspection {
    pub id: i64,
    #[serde(flatten)]
    pub record: InspectionResult,
}

impl StoredInspection {
    pub fn correlation_id(&self) -> &str {
        &self.record.correlation_id
    }
}
