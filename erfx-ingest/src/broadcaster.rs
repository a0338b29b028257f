//! Realtime broadcaster seam
//!
//! Fire-and-forget fan-out to observers. Implementations must not block the
//! caller on slow observers and must not report "nobody listening" as an
//! error.

use erfx_common::{ErfxEvent, EventBus, InspectionResult};

pub trait RealtimeBroadcaster: Send + Sync {
    fn broadcast(&self, event: ErfxEvent);

    fn broadcast_inspection(&self, record: InspectionResult) {
        self.broadcast(ErfxEvent::InspectionResult(record));
    }

    fn broadcast_connectivity(&self, connected: bool) {
        self.broadcast(ErfxEvent::MqttConnected(connected));
    }
}

impl RealtimeBroadcaster for EventBus {
    fn broadcast(&self, event: ErfxEvent) {
        self.emit_lossy(event);
    }
}
