//! SQLite inspection store
//!
//! Implements [`PersistenceGateway`] over the `inspections` table created by
//! `erfx_common::db`. Collections are stored as JSON text columns; difference
//! rows keep only `sku`/`expected`/`actual`, the derived fields are recomputed
//! on read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use erfx_common::time::{parse_utc_lenient, to_millis_string};
use erfx_common::{EpcSkuPair, InspectionResult, SkuDifference, StoredInspection};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::persistence::PersistenceGateway;

const SELECT_COLUMNS: &str = r#"
    SELECT id, correlation_id, store_code, region, invoice_number, barcode_raw,
           inspected_at_utc, is_ok, expected_total, actual_total, declared_total,
           elapsed_ms, differences_json, expected_items_json, actual_items_json,
           raw_epcs_json, failed_epc_count, error_message, warning_message,
           uploaded_at_utc, upload_attempts, is_upload_permanently_failed
    FROM inspections
"#;

/// Stored shape of one difference entry
#[derive(Serialize, Deserialize)]
struct DifferenceRow {
    sku: String,
    expected: i32,
    actual: i32,
}

/// SQLite-backed persistence gateway
#[derive(Clone)]
pub struct SqliteInspectionStore {
    db: SqlitePool,
}

impl SqliteInspectionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Number of committed inspection rows
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inspections")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl PersistenceGateway for SqliteInspectionStore {
    async fn exists(&self, correlation_id: &str) -> Result<bool> {
        if correlation_id.is_empty() {
            return Ok(false);
        }

        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM inspections WHERE correlation_id = ? LIMIT 1")
                .bind(correlation_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    async fn save(&self, record: &InspectionResult) -> Result<StoredInspection> {
        let differences: Vec<DifferenceRow> = record
            .differences
            .iter()
            .map(|d| DifferenceRow {
                sku: d.sku.clone(),
                expected: d.expected,
                actual: d.actual,
            })
            .collect();

        let result = sqlx::query(
            r#"
            INSERT INTO inspections (
                correlation_id, store_code, region, invoice_number, barcode_raw,
                inspected_at_utc, is_ok, expected_total, actual_total, declared_total,
                elapsed_ms, differences_json, expected_items_json, actual_items_json,
                raw_epcs_json, failed_epc_count, error_message, warning_message,
                uploaded_at_utc, upload_attempts, is_upload_permanently_failed
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.correlation_id)
        .bind(&record.store_code)
        .bind(&record.region)
        .bind(&record.invoice_number)
        .bind(&record.barcode_raw)
        .bind(to_millis_string(&record.inspected_at_utc))
        .bind(record.is_ok)
        .bind(record.expected_total)
        .bind(record.actual_total)
        .bind(record.declared_total)
        .bind(record.elapsed_ms)
        .bind(serde_json::to_string(&differences)?)
        .bind(serde_json::to_string(&record.expected_items)?)
        .bind(serde_json::to_string(&record.actual_items)?)
        .bind(serde_json::to_string(&record.epc_sku_pairs)?)
        .bind(record.failed_epc_count)
        .bind(&record.error_message)
        .bind(&record.warning_message)
        .bind(record.uploaded_at_utc.as_ref().map(to_millis_string))
        .bind(record.upload_attempts)
        .bind(record.is_upload_permanently_failed)
        .execute(&self.db)
        .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                debug!(id, correlation_id = %record.correlation_id, "Inspection stored");
                Ok(StoredInspection {
                    id,
                    record: record.clone(),
                })
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::DuplicateCorrelationId(record.correlation_id.clone()))
            }
            Err(e) => Err(Error::Database(e)),
        }
    }

    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<StoredInspection>> {
        let sql = format!("{} WHERE correlation_id = ?", SELECT_COLUMNS);
        sqlx::query(&sql)
            .bind(correlation_id)
            .fetch_optional(&self.db)
            .await?
            .map(|row| row_to_stored(&row))
            .transpose()
    }
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredInspection> {
    let differences: Vec<DifferenceRow> = parse_json_column(row.get("differences_json"))?;
    let expected_items: BTreeMap<String, i32> = parse_json_column(row.get("expected_items_json"))?;
    let actual_items: BTreeMap<String, i32> = parse_json_column(row.get("actual_items_json"))?;
    let epc_sku_pairs: Vec<EpcSkuPair> = parse_json_column(row.get("raw_epcs_json"))?;

    let inspected_at: String = row.get("inspected_at_utc");
    let inspected_at_utc = parse_utc_lenient(&inspected_at).ok_or_else(|| {
        Error::Internal(format!("Unparsable inspected_at_utc in store: {}", inspected_at))
    })?;
    let uploaded_at_utc: Option<DateTime<Utc>> = row
        .get::<Option<String>, _>("uploaded_at_utc")
        .as_deref()
        .and_then(parse_utc_lenient);

    Ok(StoredInspection {
        id: row.get("id"),
        record: InspectionResult {
            correlation_id: row.get("correlation_id"),
            store_code: row.get("store_code"),
            region: row.get("region"),
            invoice_number: row.get("invoice_number"),
            barcode_raw: row.get("barcode_raw"),
            inspected_at_utc,
            is_ok: row.get("is_ok"),
            expected_total: row.get("expected_total"),
            actual_total: row.get("actual_total"),
            declared_total: row.get("declared_total"),
            elapsed_ms: row.get("elapsed_ms"),
            differences: differences
                .into_iter()
                .map(|d| SkuDifference::new(d.sku, d.expected, d.actual))
                .collect(),
            expected_items,
            actual_items,
            epc_sku_pairs,
            failed_epc_count: row.get("failed_epc_count"),
            error_message: row.get("error_message"),
            warning_message: row.get("warning_message"),
            uploaded_at_utc,
            upload_attempts: row.get("upload_attempts"),
            is_upload_permanently_failed: row.get("is_upload_permanently_failed"),
        },
    })
}

/// Empty or NULL JSON columns read as the empty collection
fn parse_json_column<T>(raw: Option<String>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(text) => Ok(serde_json::from_str(text)?),
    }
}
