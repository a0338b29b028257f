//! Realtime event types and EventBus
//!
//! Events fan out to every connected observer (SSE clients today). Delivery is
//! fire-and-forget: a slow observer lags and loses events instead of slowing
//! down ingestion.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::inspection::InspectionResult;

/// ERFX realtime event types
///
/// The event names are the ones existing dashboards listen for, including the
/// historical `MqttConnected` name for broker connectivity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ErfxEvent {
    /// A decoded inspection result (sent for duplicates too)
    InspectionResult(InspectionResult),

    /// Broker connectivity changed (true = connected)
    MqttConnected(bool),
}

impl ErfxEvent {
    /// Get event type as string for SSE `event:` lines and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ErfxEvent::InspectionResult(_) => "InspectionResult",
            ErfxEvent::MqttConnected(_) => "MqttConnected",
        }
    }

    /// Serialize only the payload part (what observers receive as `data:`)
    pub fn payload_json(&self) -> serde_json::Result<String> {
        match self {
            ErfxEvent::InspectionResult(record) => serde_json::to_string(record),
            ErfxEvent::MqttConnected(connected) => serde_json::to_string(connected),
        }
    }
}

/// Central event distribution bus for realtime observers
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use erfx_common::events::{ErfxEvent, EventBus};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(ErfxEvent::MqttConnected(true));
/// assert_eq!(rx.try_recv().unwrap().event_type(), "MqttConnected");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ErfxEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for that subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ErfxEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: ErfxEvent) -> Result<usize, broadcast::error::SendError<ErfxEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ErfxEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
