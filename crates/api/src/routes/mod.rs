pub mod health;
pub mod orchestrate;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /orchestrate          submit over the active transport (POST)
/// /orchestrate/direct   submit and wait for the result (POST)
/// /tasks                list tasks (GET)
/// /tasks/{task_id}      task detail with items and service requests (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/orchestrate", orchestrate::router())
        .nest("/tasks", tasks::router())
}
