//! HTTP surface for observers
//!
//! - `GET /health`: liveness plus broker connectivity
//! - `GET /events`: realtime event stream (SSE)

mod health;
mod sse;

use axum::Router;
use erfx_common::EventBus;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection::ConnectionManager;
use crate::db::SqliteInspectionStore;

pub use health::HealthResponse;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub manager: Arc<ConnectionManager>,
    pub store: SqliteInspectionStore,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::health_routes())
        .merge(sse::event_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
