use axum::extract::State;
use axum::{routing::get, Json, Router};
use orch_events::QueueStats;
use serde::Serialize;

use crate::config::TransportMode;
use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store is unreachable.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub transport_mode: TransportMode,
    pub store_healthy: bool,
    /// Keys with work executing right now.
    pub active_keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

/// GET /health -- returns service and store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = state.store.health_check().await.is_ok();
    let status = if store_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        transport_mode: state.ingress.mode(),
        store_healthy,
        active_keys: state.coordinator.sequencer().active_lanes(),
        queue: state.ingress.queue_stats(),
    })
}

/// Mount health check routes (root level, not under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
