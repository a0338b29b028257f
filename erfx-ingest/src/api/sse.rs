//! Realtime observer stream

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;

use super::AppState;

/// GET /events - SSE event stream
///
/// `event:` is the event name (`InspectionResult`, `MqttConnected`), `data:`
/// its JSON payload.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    erfx_common::sse::create_event_sse_stream(&state.bus, "erfx-ingest")
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}
