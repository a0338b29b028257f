//! Message dispatch
//!
//! One inbound delivery runs decode, then dedup-persist, then broadcast.
//! Every decoded record is broadcast whatever the storage outcome; payloads
//! that fail to decode are neither stored nor broadcast.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::broadcaster::RealtimeBroadcaster;
use crate::codec::{self, DecodeError};
use crate::coordinator::{DedupCoordinator, ProcessOutcome};

/// What happened to one delivery
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Decoded and handed to the coordinator (record was broadcast)
    Processed(ProcessOutcome),

    /// Payload dropped at decode; nothing stored or broadcast
    Rejected(DecodeError),
}

impl DispatchOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, DispatchOutcome::Rejected(_))
    }

    pub fn process_outcome(&self) -> Option<&ProcessOutcome> {
        match self {
            DispatchOutcome::Processed(outcome) => Some(outcome),
            DispatchOutcome::Rejected(_) => None,
        }
    }
}

pub struct Dispatcher {
    coordinator: Arc<DedupCoordinator>,
    broadcaster: Arc<dyn RealtimeBroadcaster>,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<DedupCoordinator>, broadcaster: Arc<dyn RealtimeBroadcaster>) -> Self {
        Self {
            coordinator,
            broadcaster,
        }
    }

    /// Handle one inbound message
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let record = match codec::decode(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(topic, bytes = payload.len(), error = %e, "Dropping undecodable message");
                return DispatchOutcome::Rejected(e);
            }
        };

        let outcome = self.coordinator.process(&record).await;
        match &outcome {
            ProcessOutcome::Stored(stored) => {
                info!(
                    correlation_id = %record.correlation_id,
                    id = stored.id,
                    result = record.result_label(),
                    "Inspection result received"
                );
            }
            ProcessOutcome::DuplicateSkipped { correlation_id, .. } => {
                debug!(%correlation_id, "Duplicate inspection result, broadcasting only");
            }
            ProcessOutcome::PersistenceError(e) => {
                error!(
                    correlation_id = %record.correlation_id,
                    error = %e,
                    "Inspection result not persisted, broadcasting anyway"
                );
            }
        }

        self.broadcaster.broadcast_inspection(record);
        DispatchOutcome::Processed(outcome)
    }
}
