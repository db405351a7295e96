//! The [`TaskStore`] trait and its two backends.
//!
//! Every lifecycle change goes through one of the trait's atomic operations.
//! Multi-row changes (an item plus its task, a service request plus its
//! task's first error) happen inside a single transaction (Postgres) or a
//! single write-lock critical section (memory), so a reader never observes
//! half of an update.

mod memory;
mod postgres;

use async_trait::async_trait;
use orch_core::compute::TaskSubmission;
use uuid::Uuid;

use crate::models::service_request::{NewServiceRequest, ServiceRequest, ServiceRequestUpdate};
use crate::models::status::{ServiceRequestStatus, TaskStatus};
use crate::models::task::{ComputeItemRecord, Task, TaskDetail, TaskListQuery};

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors returned by [`TaskStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed task, item, or service request does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A task with this id was already accepted.
    #[error("Task {0} already exists")]
    DuplicateTask(String),

    /// The record is terminal, or its current status did not match the
    /// expected one (a concurrent writer got there first).
    #[error("Invalid {entity} transition for {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// The backend could not be reached or refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the failure is about persistence itself rather than about the
    /// state of the addressed record.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Database(_))
    }

    fn invalid(entity: &'static str, id: impl Into<String>, from: impl ToString, to: impl ToString) -> Self {
        StoreError::InvalidTransition {
            entity,
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn task_not_found(task_id: &str) -> Self {
        StoreError::NotFound {
            entity: "Task",
            id: task_id.to_string(),
        }
    }

    fn item_not_found(task_id: &str, item_index: i32) -> Self {
        StoreError::NotFound {
            entity: "ComputeItem",
            id: format!("{task_id}#{item_index}"),
        }
    }

    fn request_not_found(request_id: Uuid) -> Self {
        StoreError::NotFound {
            entity: "ServiceRequest",
            id: request_id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Durable, consistent record of the task lifecycle.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Insert a PENDING task with one PENDING item per compute item.
    ///
    /// Fails with [`StoreError::DuplicateTask`] if the id is already known.
    async fn create_task(&self, submission: &TaskSubmission) -> Result<Task, StoreError>;

    async fn get_task(&self, task_id: &str) -> Result<Task, StoreError>;

    /// The task together with its items and service requests.
    async fn get_task_detail(&self, task_id: &str) -> Result<TaskDetail, StoreError>;

    /// Tasks newest first, optionally filtered by status.
    async fn list_tasks(&self, query: &TaskListQuery) -> Result<Vec<Task>, StoreError>;

    /// Tasks in `status` with their details, oldest first.
    async fn list_task_details_by_status(
        &self,
        status: TaskStatus,
    ) -> Result<Vec<TaskDetail>, StoreError>;

    async fn list_service_requests(&self, task_id: &str) -> Result<Vec<ServiceRequest>, StoreError>;

    /// Compare-and-set the task status.
    ///
    /// With `from` set, the current status must equal it. Terminal tasks
    /// never change, and only forward transitions are accepted.
    async fn transition_task(
        &self,
        task_id: &str,
        from: Option<TaskStatus>,
        to: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<Task, StoreError>;

    /// Move a service request forward. A terminal record is never
    /// overwritten. A transition to FAILED also records the message as the
    /// task's error if the task has none yet.
    async fn transition_service_request(
        &self,
        request_id: Uuid,
        to: ServiceRequestStatus,
        update: ServiceRequestUpdate,
    ) -> Result<ServiceRequest, StoreError>;

    /// Admit a PENDING item: create its service requests (PENDING), move the
    /// item to IN_PROGRESS, and the task too if it is still PENDING.
    async fn admit_item(
        &self,
        task_id: &str,
        item_index: i32,
        requests: &[NewServiceRequest],
    ) -> Result<Vec<ServiceRequest>, StoreError>;

    /// Mark a PENDING item as superseded by `superseded_by`.
    async fn supersede_item(
        &self,
        task_id: &str,
        item_index: i32,
        superseded_by: &str,
    ) -> Result<ComputeItemRecord, StoreError>;

    /// Move an IN_PROGRESS item to COMPLETED or FAILED.
    async fn resolve_item(
        &self,
        task_id: &str,
        item_index: i32,
        to: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<ComputeItemRecord, StoreError>;

    /// Fail every unresolved service request of an item with `error_message`.
    /// Returns the requests that were changed.
    async fn fail_unresolved_requests(
        &self,
        task_id: &str,
        item_index: i32,
        error_message: &str,
    ) -> Result<Vec<ServiceRequest>, StoreError>;

    /// If every item of the task is terminal, move the task to its terminal
    /// status. Returns the task when this call finalized it, `None` if work
    /// is still outstanding or the task was already terminal.
    async fn finalize_task(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// Fail every IN_PROGRESS task left behind by a previous process, along
    /// with its unresolved items and service requests. Returns the ids.
    async fn fail_orphaned_tasks(&self, reason: &str) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// Terminal outcome
// ---------------------------------------------------------------------------

/// Terminal status a task resolves to once all of its items are terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: TaskStatus,
    pub superseded_by: Option<String>,
    /// Fallback error, used only when the task has no error recorded yet.
    pub error_message: Option<String>,
}

/// Decide a task's terminal outcome from its items and service requests.
///
/// - Any non-terminal item: no outcome yet.
/// - Every item superseded: `SUPERSEDED`, pointing at the newest displacer.
/// - Otherwise `COMPLETED` iff every executed item and every service request
///   completed; anything else is `FAILED`.
pub fn resolve_outcome(
    items: &[ComputeItemRecord],
    requests: &[ServiceRequest],
) -> Option<Resolution> {
    if items.is_empty() || items.iter().any(|item| !item.status.is_terminal()) {
        return None;
    }

    let executed: Vec<&ComputeItemRecord> = items
        .iter()
        .filter(|item| item.status != TaskStatus::Superseded)
        .collect();

    if executed.is_empty() {
        let newest = items
            .iter()
            .max_by_key(|item| (item.updated_at, item.item_index));
        return Some(Resolution {
            status: TaskStatus::Superseded,
            superseded_by: newest.and_then(|item| item.superseded_by.clone()),
            error_message: None,
        });
    }

    let all_completed = executed
        .iter()
        .all(|item| item.status == TaskStatus::Completed)
        && requests
            .iter()
            .all(|r| r.status == ServiceRequestStatus::Completed);

    if all_completed {
        return Some(Resolution {
            status: TaskStatus::Completed,
            superseded_by: None,
            error_message: None,
        });
    }

    let first_request_error = requests
        .iter()
        .filter(|r| r.status == ServiceRequestStatus::Failed)
        .min_by_key(|r| (r.completed_at.unwrap_or(r.updated_at), r.request_id))
        .and_then(|r| r.error_message.clone());
    let first_item_error = executed
        .iter()
        .filter(|item| item.status == TaskStatus::Failed)
        .min_by_key(|item| (item.updated_at, item.item_index))
        .and_then(|item| item.error_message.clone());

    Some(Resolution {
        status: TaskStatus::Failed,
        superseded_by: None,
        error_message: first_request_error
            .or(first_item_error)
            .or_else(|| Some("One or more service requests failed".to_string())),
    })
}
