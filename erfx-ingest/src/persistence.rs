//! Persistence gateway seam
//!
//! The store behind this trait owns committed inspection results. The only
//! guarantee ingestion relies on is the uniqueness of `correlation_id`:
//! `save` must reject a second row for the same id with
//! [`Error::DuplicateCorrelationId`](crate::Error::DuplicateCorrelationId)
//! rather than overwrite the first or report a generic failure.

use async_trait::async_trait;
use erfx_common::{InspectionResult, StoredInspection};

use crate::error::Result;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Cheap pre-check: is a record with this correlation id already committed?
    ///
    /// Always `false` for an empty id.
    async fn exists(&self, correlation_id: &str) -> Result<bool>;

    /// Insert a record, returning it with its assigned identity
    async fn save(&self, record: &InspectionResult) -> Result<StoredInspection>;

    /// Read back a committed record by correlation id
    async fn find_by_correlation_id(&self, correlation_id: &str) -> Result<Option<StoredInspection>>;
}
