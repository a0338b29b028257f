//! Server-Sent Events (SSE) utilities
//!
//! Turns the EventBus into an SSE response for observer clients.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::events::{ErfxEvent, EventBus};

/// Keep-alive comment interval for idle SSE connections
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Convert one bus event into an SSE frame (`event:` = type, `data:` = payload)
pub fn to_sse_event(event: &ErfxEvent) -> Option<Event> {
    match event.payload_json() {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.event_type(), e);
            None
        }
    }
}

/// Create an SSE stream that forwards every EventBus event to one client
///
/// Lagged clients skip the events they missed and keep streaming.
pub fn create_event_sse_stream(
    bus: &EventBus,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        "New SSE client connected to {} (observers: {})",
        service_name,
        bus.subscriber_count() + 1
    );

    let stream = BroadcastStream::new(bus.subscribe()).filter_map(|result| async move {
        match result {
            Ok(event) => {
                debug!("SSE: forwarding {}", event.event_type());
                to_sse_event(&event).map(Ok)
            }
            Err(e) => {
                warn!("SSE client lagged: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
