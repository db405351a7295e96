use axum::routing::post;
use axum::Router;

use crate::handlers::orchestrate;
use crate::state::AppState;

/// Routes mounted at `/orchestrate`.
///
/// ```text
/// POST   /          -> submit
/// POST   /direct    -> submit_and_wait
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(orchestrate::submit))
        .route("/direct", post(orchestrate::submit_and_wait))
}
