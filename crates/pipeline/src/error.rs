use orch_core::error::CoreError;
use orch_db::store::StoreError;

/// Errors surfaced by the coordinator to its callers (ingress, recovery).
///
/// Downstream call failures never appear here: they are recorded on the
/// service request and reflected in the task's terminal status.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// Malformed ingress payload. No task record was created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The task does not exist.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Persistence failed. The submission must not be acknowledged.
    #[error("Store write failed: {0}")]
    StoreWrite(#[source] StoreError),

    /// Startup recovery could not complete.
    #[error("Recovery failed: {0}")]
    Recovery(#[source] StoreError),

    /// The task did not reach a terminal state within the wait budget.
    #[error("Timed out waiting for task {0}")]
    WaitTimeout(String),

    /// The coordinator is shutting down and no longer accepts work.
    #[error("Coordinator is shutting down")]
    ShuttingDown,
}

impl OrchestrationError {
    /// Whether the submission may succeed if delivered again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestrationError::StoreWrite(_))
    }
}

impl From<CoreError> for OrchestrationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { id, .. } => OrchestrationError::NotFound(id),
            CoreError::Validation(msg) | CoreError::Conflict(msg) => {
                OrchestrationError::Validation(msg)
            }
            other => OrchestrationError::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for OrchestrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => OrchestrationError::NotFound(id),
            other => OrchestrationError::StoreWrite(other),
        }
    }
}
