//! Handlers for orchestration submissions.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use orch_core::compute::OrchestrationRequest;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/orchestrate
///
/// Accept a task over the active transport. Returns 202 once the task is
/// durably recorded (direct) or published (queue). A known `task_id` is
/// answered with the existing task's status instead of running it again.
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<OrchestrationRequest>,
) -> AppResult<impl IntoResponse> {
    let receipt = state.ingress.accept(request).await?;

    tracing::info!(
        task_id = %receipt.task_id,
        status = receipt.status,
        transport = %state.ingress.mode(),
        "Orchestration request accepted",
    );

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// POST /api/orchestrate/direct
///
/// Submit inline and wait for the task to finish, returning the task with
/// its items and per-service results. Bypasses the queue transport.
pub async fn submit_and_wait(
    State(state): State<AppState>,
    Json(request): Json<OrchestrationRequest>,
) -> AppResult<impl IntoResponse> {
    // Leave a second for the response itself before the request timeout fires.
    let wait = Duration::from_secs(state.config.request_timeout_secs.saturating_sub(1).max(1));
    let detail = state.coordinator.submit_and_wait(request, wait).await?;

    tracing::info!(
        task_id = %detail.task.task_id,
        status = %detail.task.status,
        "Direct orchestration finished",
    );

    Ok(Json(DataResponse { data: detail }))
}
