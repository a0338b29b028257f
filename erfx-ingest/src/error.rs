//! Error types for erfx-ingest
//!
//! Nothing in the ingestion pipeline is process-fatal; these errors are
//! logged at the point they are observed and the message or tick is dropped.

use thiserror::Error;

/// Main error type for erfx-ingest
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Insert rejected by the correlation id uniqueness constraint
    #[error("Duplicate correlation id: {0}")]
    DuplicateCorrelationId(String),

    /// Broker transport failure (connect, subscribe, publish, session drop)
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON encoding of a stored column or outbound payload failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors surfaced from erfx-common
    #[error(transparent)]
    Common(#[from] erfx_common::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using erfx-ingest Error
pub type Result<T> = std::result::Result<T, Error>;
