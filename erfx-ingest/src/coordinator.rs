//! Dedup-persist coordinator
//!
//! Applies one decoded record to the persistence gateway so that a
//! correlation id is committed at most once, however many times (and however
//! concurrently) the broker delivers it.
//!
//! Two layers:
//! 1. `exists` pre-check: filters the common redelivery case without touching the
//!    uniqueness constraint.
//! 2. Insert: the store's unique index is the real barrier. Two concurrent
//!    deliveries can both pass the pre-check; the loser's insert fails with
//!    `DuplicateCorrelationId`, which is resolved by reading back the winner.

use erfx_common::{InspectionResult, StoredInspection};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::persistence::PersistenceGateway;

/// Result of processing one delivery
#[derive(Debug)]
pub enum ProcessOutcome {
    /// First delivery of this correlation id; now committed
    Stored(StoredInspection),

    /// Already committed. `existing` is the committed record, `None` only when
    /// reading it back failed.
    DuplicateSkipped {
        correlation_id: String,
        existing: Option<StoredInspection>,
    },

    /// Any other store failure; the delivery is dropped
    PersistenceError(Error),
}

impl ProcessOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, ProcessOutcome::Stored(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ProcessOutcome::DuplicateSkipped { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Stored(_) => "stored",
            ProcessOutcome::DuplicateSkipped { .. } => "duplicate_skipped",
            ProcessOutcome::PersistenceError(_) => "persistence_error",
        }
    }
}

/// Exactly-once commit on top of an at-least-once channel
pub struct DedupCoordinator {
    gateway: Arc<dyn PersistenceGateway>,
}

impl DedupCoordinator {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// Process one delivery; never returns an error, every failure is an outcome
    pub async fn process(&self, record: &InspectionResult) -> ProcessOutcome {
        let correlation_id = record.correlation_id.as_str();

        if record.has_correlation_id() {
            match self.gateway.exists(correlation_id).await {
                Ok(true) => {
                    debug!(correlation_id, "Duplicate delivery skipped (already stored)");
                    return ProcessOutcome::DuplicateSkipped {
                        correlation_id: correlation_id.to_string(),
                        existing: self.committed(correlation_id).await,
                    };
                }
                Ok(false) => {}
                Err(e) => {
                    // The insert below still enforces uniqueness
                    warn!(correlation_id, error = %e, "Existence check failed, attempting insert");
                }
            }
        }

        match self.gateway.save(record).await {
            Ok(stored) => {
                debug!(correlation_id, id = stored.id, "Inspection committed");
                ProcessOutcome::Stored(stored)
            }
            Err(Error::DuplicateCorrelationId(id)) => {
                info!(correlation_id = %id, "Concurrent duplicate resolved by uniqueness constraint");
                let existing = self.committed(&id).await;
                ProcessOutcome::DuplicateSkipped {
                    correlation_id: id,
                    existing,
                }
            }
            Err(e) => {
                error!(correlation_id, error = %e, "Failed to persist inspection result, dropping");
                ProcessOutcome::PersistenceError(e)
            }
        }
    }

    /// Read back the record already committed under `correlation_id`
    async fn committed(&self, correlation_id: &str) -> Option<StoredInspection> {
        match self.gateway.find_by_correlation_id(correlation_id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(correlation_id, error = %e, "Could not read back committed duplicate");
                None
            }
        }
    }
}
