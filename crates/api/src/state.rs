use std::sync::Arc;

use orch_db::store::TaskStore;
use orch_pipeline::Coordinator;

use crate::config::ServerConfig;
use crate::ingress::Ingress;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Task State Store, read directly by the query endpoints.
    pub store: Arc<dyn TaskStore>,
    pub coordinator: Arc<Coordinator>,
    /// Active transport for `POST /api/orchestrate`.
    pub ingress: Arc<Ingress>,
    pub config: Arc<ServerConfig>,
}
