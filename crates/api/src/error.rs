use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orch_core::error::CoreError;
use orch_db::store::StoreError;
use orch_pipeline::OrchestrationError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent `{ "error", "code" }`
/// JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Orchestration(err) => classify_orchestration_error(err),
            AppError::Store(err) => classify_store_error(err),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn classify_orchestration_error(err: &OrchestrationError) -> Classified {
    match err {
        OrchestrationError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        OrchestrationError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Task with id {id} not found"),
        ),
        OrchestrationError::StoreWrite(source) => {
            tracing::error!(error = %source, "Task store write failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Task could not be recorded, retry later".to_string(),
            )
        }
        OrchestrationError::WaitTimeout(id) => (
            StatusCode::GATEWAY_TIMEOUT,
            "TIMEOUT",
            format!("Task {id} is still running; poll GET /api/tasks/{id}"),
        ),
        OrchestrationError::ShuttingDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            "SHUTTING_DOWN",
            "Server is shutting down".to_string(),
        ),
        OrchestrationError::Recovery(source) => {
            tracing::error!(error = %source, "Recovery error reached a handler");
            internal()
        }
    }
}

fn classify_store_error(err: &StoreError) -> Classified {
    match err {
        StoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        StoreError::DuplicateTask(id) => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Task {id} already exists"),
        ),
        StoreError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        StoreError::Unavailable(_) | StoreError::Database(_) => {
            tracing::error!(error = %err, "Task store error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Task store unavailable".to_string(),
            )
        }
    }
}
