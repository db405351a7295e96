//! Postgres [`TaskStore`] built on the repository layer.
//!
//! Multi-row operations run in one transaction and lock the task row first
//! (`SELECT ... FOR UPDATE`), so admission and finalization of the same task
//! serialize against each other.

use async_trait::async_trait;
use orch_core::compute::TaskSubmission;
use uuid::Uuid;

use super::{resolve_outcome, StoreError, TaskStore};
use crate::models::service_request::{NewServiceRequest, ServiceRequest, ServiceRequestUpdate};
use crate::models::status::{ServiceRequestStatus, TaskStatus};
use crate::models::task::{ComputeItemRecord, Task, TaskDetail, TaskListQuery};
use crate::repositories::{ComputeItemRepo, ServiceRequestRepo, TaskRepo};
use crate::DbPool;

/// Durable store backed by a Postgres pool.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn item_transition(
        &self,
        task_id: &str,
        item_index: i32,
        from: TaskStatus,
        to: TaskStatus,
        superseded_by: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<ComputeItemRecord, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = ComputeItemRepo::update_status(
            &mut *tx,
            task_id,
            item_index,
            from,
            to,
            superseded_by,
            error_message,
        )
        .await?;

        let Some(item) = updated else {
            let current = ComputeItemRepo::find_for_update(&mut *tx, task_id, item_index)
                .await?
                .ok_or_else(|| StoreError::item_not_found(task_id, item_index))?;
            return Err(StoreError::invalid(
                "ComputeItem",
                format!("{task_id}#{item_index}"),
                current.status,
                to,
            ));
        };

        if to == TaskStatus::Failed {
            if let Some(message) = error_message {
                TaskRepo::set_error_if_absent(&mut *tx, task_id, message).await?;
            }
        }
        tx.commit().await?;
        Ok(item)
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn create_task(&self, submission: &TaskSubmission) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepo::insert(
            &mut *tx,
            &submission.task_id,
            &submission.name,
            submission.description.as_deref(),
        )
        .await?
        .ok_or_else(|| StoreError::DuplicateTask(submission.task_id.clone()))?;

        for (index, item) in submission.items.iter().enumerate() {
            ComputeItemRepo::insert(&mut *tx, &task.task_id, index as i32, item).await?;
        }
        tx.commit().await?;

        tracing::debug!(
            task_id = %task.task_id,
            items = submission.items.len(),
            "Task persisted",
        );
        Ok(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, StoreError> {
        TaskRepo::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| StoreError::task_not_found(task_id))
    }

    async fn get_task_detail(&self, task_id: &str) -> Result<TaskDetail, StoreError> {
        let task = self.get_task(task_id).await?;
        let items = ComputeItemRepo::list_by_task(&self.pool, task_id).await?;
        let service_requests = ServiceRequestRepo::list_by_task(&self.pool, task_id).await?;
        Ok(TaskDetail {
            task,
            items,
            service_requests,
        })
    }

    async fn list_tasks(&self, query: &TaskListQuery) -> Result<Vec<Task>, StoreError> {
        Ok(TaskRepo::list(&self.pool, query).await?)
    }

    async fn list_task_details_by_status(
        &self,
        status: TaskStatus,
    ) -> Result<Vec<TaskDetail>, StoreError> {
        let tasks = TaskRepo::list_by_status(&self.pool, status).await?;
        let mut details = Vec::with_capacity(tasks.len());
        for task in tasks {
            let items = ComputeItemRepo::list_by_task(&self.pool, &task.task_id).await?;
            let service_requests =
                ServiceRequestRepo::list_by_task(&self.pool, &task.task_id).await?;
            details.push(TaskDetail {
                task,
                items,
                service_requests,
            });
        }
        Ok(details)
    }

    async fn list_service_requests(&self, task_id: &str) -> Result<Vec<ServiceRequest>, StoreError> {
        self.get_task(task_id).await?;
        Ok(ServiceRequestRepo::list_by_task(&self.pool, task_id).await?)
    }

    async fn transition_task(
        &self,
        task_id: &str,
        from: Option<TaskStatus>,
        to: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current = TaskRepo::find_for_update(&mut *tx, task_id)
            .await?
            .ok_or_else(|| StoreError::task_not_found(task_id))?;

        let expected = from.is_none_or(|f| f == current.status);
        if !expected || !current.status.can_transition_to(to) {
            return Err(StoreError::invalid("Task", task_id, current.status, to));
        }

        let task = TaskRepo::update_status(&mut *tx, task_id, current.status, to, error_message)
            .await?
            .ok_or_else(|| StoreError::invalid("Task", task_id, current.status, to))?;
        tx.commit().await?;
        Ok(task)
    }

    async fn transition_service_request(
        &self,
        request_id: Uuid,
        to: ServiceRequestStatus,
        update: ServiceRequestUpdate,
    ) -> Result<ServiceRequest, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(request) = ServiceRequestRepo::update_status(&mut *tx, request_id, to, &update).await?
        else {
            let current = ServiceRequestRepo::find_by_id(&mut *tx, request_id)
                .await?
                .ok_or_else(|| StoreError::request_not_found(request_id))?;
            return Err(StoreError::invalid(
                "ServiceRequest",
                request_id.to_string(),
                current.status,
                to,
            ));
        };

        if to == ServiceRequestStatus::Failed {
            if let Some(message) = &request.error_message {
                TaskRepo::set_error_if_absent(&mut *tx, &request.task_id, message).await?;
            }
        }
        tx.commit().await?;
        Ok(request)
    }

    async fn admit_item(
        &self,
        task_id: &str,
        item_index: i32,
        requests: &[NewServiceRequest],
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepo::find_for_update(&mut *tx, task_id)
            .await?
            .ok_or_else(|| StoreError::task_not_found(task_id))?;
        if task.status.is_terminal() {
            return Err(StoreError::invalid(
                "Task",
                task_id,
                task.status,
                TaskStatus::InProgress,
            ));
        }

        let admitted = ComputeItemRepo::update_status(
            &mut *tx,
            task_id,
            item_index,
            TaskStatus::Pending,
            TaskStatus::InProgress,
            None,
            None,
        )
        .await?;
        if admitted.is_none() {
            let current = ComputeItemRepo::find_for_update(&mut *tx, task_id, item_index)
                .await?
                .ok_or_else(|| StoreError::item_not_found(task_id, item_index))?;
            return Err(StoreError::invalid(
                "ComputeItem",
                format!("{task_id}#{item_index}"),
                current.status,
                TaskStatus::InProgress,
            ));
        }

        if task.status == TaskStatus::Pending {
            TaskRepo::update_status(
                &mut *tx,
                task_id,
                TaskStatus::Pending,
                TaskStatus::InProgress,
                None,
            )
            .await?;
        }

        let mut created = Vec::with_capacity(requests.len());
        for request in requests {
            created.push(ServiceRequestRepo::insert(&mut *tx, task_id, item_index, request).await?);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn supersede_item(
        &self,
        task_id: &str,
        item_index: i32,
        superseded_by: &str,
    ) -> Result<ComputeItemRecord, StoreError> {
        self.item_transition(
            task_id,
            item_index,
            TaskStatus::Pending,
            TaskStatus::Superseded,
            Some(superseded_by),
            None,
        )
        .await
    }

    async fn resolve_item(
        &self,
        task_id: &str,
        item_index: i32,
        to: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<ComputeItemRecord, StoreError> {
        if !matches!(to, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(StoreError::invalid(
                "ComputeItem",
                format!("{task_id}#{item_index}"),
                TaskStatus::InProgress,
                to,
            ));
        }
        self.item_transition(
            task_id,
            item_index,
            TaskStatus::InProgress,
            to,
            None,
            error_message,
        )
        .await
    }

    async fn fail_unresolved_requests(
        &self,
        task_id: &str,
        item_index: i32,
        error_message: &str,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let changed = ServiceRequestRepo::fail_unresolved_for_item(
            &mut *tx,
            task_id,
            item_index,
            error_message,
        )
        .await?;
        if !changed.is_empty() {
            TaskRepo::set_error_if_absent(&mut *tx, task_id, error_message).await?;
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn finalize_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepo::find_for_update(&mut *tx, task_id)
            .await?
            .ok_or_else(|| StoreError::task_not_found(task_id))?;
        if task.status.is_terminal() {
            return Ok(None);
        }

        let items = ComputeItemRepo::list_by_task(&mut *tx, task_id).await?;
        let requests = ServiceRequestRepo::list_by_task(&mut *tx, task_id).await?;
        let Some(outcome) = resolve_outcome(&items, &requests) else {
            return Ok(None);
        };

        let finalized = TaskRepo::finalize(
            &mut *tx,
            task_id,
            outcome.status,
            outcome.superseded_by.as_deref(),
            outcome.error_message.as_deref(),
        )
        .await?;
        tx.commit().await?;
        Ok(finalized)
    }

    async fn fail_orphaned_tasks(&self, reason: &str) -> Result<Vec<String>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let task_ids = TaskRepo::fail_in_progress(&mut *tx, reason).await?;
        if !task_ids.is_empty() {
            ComputeItemRepo::fail_unresolved_for_tasks(&mut *tx, &task_ids, reason).await?;
            ServiceRequestRepo::fail_unresolved_for_tasks(&mut *tx, &task_ids, reason).await?;
        }
        tx.commit().await?;
        Ok(task_ids)
    }
}
