//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use super::AppState;

/// GET /health response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub mqtt_connected: bool,
    pub connection_state: String,
    pub uptime_seconds: f64,
    /// `None` when the store could not be queried
    pub stored_inspections: Option<i64>,
}

/// GET /health
///
/// Always 200 while the process serves HTTP; a disconnected broker is
/// reported, not treated as unhealthy.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.manager.snapshot().await;
    let stored_inspections = match state.store.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Health check could not count inspections: {}", e);
            None
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "erfx-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mqtt_connected: snapshot.connected,
        connection_state: snapshot.state.to_string(),
        uptime_seconds: state.manager.uptime_secs(),
        stored_inspections,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
