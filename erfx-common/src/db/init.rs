//! Database initialization
//!
//! Creates the SQLite database on first run and the `inspections` schema.
//! Every statement is idempotent, so opening an existing database is the same
//! call as creating a new one.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the inspections database at `db_path`
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the read side query while ingestion writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_inspections_table(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the same schema (tests, dry runs)
///
/// The pool is capped at one connection that never expires: every SQLite
/// `:memory:` connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_inspections_table(&pool).await?;
    Ok(pool)
}

/// Create the `inspections` table and its indexes
///
/// The unique index on `correlation_id` is the authoritative duplicate
/// barrier for ingestion; it must never be dropped or relaxed.
pub async fn create_inspections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inspections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            correlation_id TEXT NOT NULL,
            store_code TEXT,
            region TEXT,
            invoice_number TEXT,
            barcode_raw TEXT,
            inspected_at_utc TEXT NOT NULL,
            is_ok INTEGER NOT NULL,
            expected_total INTEGER NOT NULL,
            actual_total INTEGER NOT NULL,
            declared_total INTEGER NOT NULL DEFAULT 0,
            elapsed_ms INTEGER NOT NULL,
            differences_json TEXT,
            expected_items_json TEXT,
            actual_items_json TEXT,
            raw_epcs_json TEXT,
            failed_epc_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            warning_message TEXT,
            uploaded_at_utc TEXT,
            upload_attempts INTEGER NOT NULL DEFAULT 0,
            is_upload_permanently_failed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    const INDEXES: [&str; 5] = [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_inspections_correlation_id ON inspections(correlation_id)",
        "CREATE INDEX IF NOT EXISTS idx_inspections_invoice ON inspections(invoice_number)",
        "CREATE INDEX IF NOT EXISTS idx_inspections_date ON inspections(inspected_at_utc)",
        "CREATE INDEX IF NOT EXISTS idx_inspections_result ON inspections(is_ok)",
        "CREATE INDEX IF NOT EXISTS idx_inspections_uploaded ON inspections(uploaded_at_utc)",
    ];
    for statement in INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
