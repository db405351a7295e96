//! In-process [`TaskStore`] backed by a single `RwLock`.
//!
//! Used when `STORE_BACKEND=memory` and by the engine and API test suites.
//! Every operation runs under one write-lock acquisition, which gives it the
//! same all-or-nothing behavior the Postgres backend gets from transactions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use orch_core::compute::TaskSubmission;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{resolve_outcome, StoreError, TaskStore};
use crate::models::service_request::{NewServiceRequest, ServiceRequest, ServiceRequestUpdate};
use crate::models::status::{ServiceRequestStatus, TaskStatus};
use crate::models::task::{ComputeItemRecord, Task, TaskDetail, TaskListQuery};

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, Task>,
    /// Task ids in creation order.
    order: Vec<String>,
    items: HashMap<String, Vec<ComputeItemRecord>>,
    requests: HashMap<String, Vec<ServiceRequest>>,
    /// request_id -> task_id
    request_owner: HashMap<Uuid, String>,
}

impl Inner {
    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task, StoreError> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::task_not_found(task_id))
    }

    fn item_mut(
        &mut self,
        task_id: &str,
        item_index: i32,
    ) -> Result<&mut ComputeItemRecord, StoreError> {
        self.items
            .get_mut(task_id)
            .and_then(|items| items.iter_mut().find(|i| i.item_index == item_index))
            .ok_or_else(|| StoreError::item_not_found(task_id, item_index))
    }

    fn detail(&self, task_id: &str) -> Result<TaskDetail, StoreError> {
        let task = self
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::task_not_found(task_id))?;
        Ok(TaskDetail {
            task,
            items: self.items.get(task_id).cloned().unwrap_or_default(),
            service_requests: self.requests.get(task_id).cloned().unwrap_or_default(),
        })
    }

    /// Record `message` as the task's error unless one is already set.
    fn set_task_error_if_absent(&mut self, task_id: &str, message: &str) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            if task.error_message.is_none() && !task.status.is_terminal() {
                task.error_message = Some(message.to_string());
                task.updated_at = Utc::now();
            }
        }
    }
}

/// Keeps every record in memory. State is lost when the process exits.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`]
    /// until switched back off. Reads keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store is rejecting writes".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_writable()
    }

    async fn create_task(&self, submission: &TaskSubmission) -> Result<Task, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if inner.tasks.contains_key(&submission.task_id) {
            return Err(StoreError::DuplicateTask(submission.task_id.clone()));
        }

        let now = Utc::now();
        let task = Task {
            task_id: submission.task_id.clone(),
            name: submission.name.clone(),
            description: submission.description.clone(),
            status: TaskStatus::Pending,
            superseded_by: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };
        let items = submission
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| ComputeItemRecord {
                task_id: submission.task_id.clone(),
                item_index: index as i32,
                scenario_id: item.scenario_id.clone(),
                business_type_id: item.business_type_id.clone(),
                status: TaskStatus::Pending,
                superseded_by: None,
                error_message: None,
                revenue: item.revenue.clone(),
                rebates: item.rebates.clone(),
                specialty: item.specialty.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        inner.tasks.insert(task.task_id.clone(), task.clone());
        inner.order.push(task.task_id.clone());
        inner.items.insert(task.task_id.clone(), items);
        inner.requests.insert(task.task_id.clone(), Vec::new());
        Ok(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, StoreError> {
        self.inner
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::task_not_found(task_id))
    }

    async fn get_task_detail(&self, task_id: &str) -> Result<TaskDetail, StoreError> {
        self.inner.read().await.detail(task_id)
    }

    async fn list_tasks(&self, query: &TaskListQuery) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|task| query.status.is_none_or(|s| task.status == s))
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .cloned()
            .collect())
    }

    async fn list_task_details_by_status(
        &self,
        status: TaskStatus,
    ) -> Result<Vec<TaskDetail>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter(|id| inner.tasks.get(*id).is_some_and(|t| t.status == status))
            .map(|id| inner.detail(id))
            .collect()
    }

    async fn list_service_requests(&self, task_id: &str) -> Result<Vec<ServiceRequest>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.tasks.contains_key(task_id) {
            return Err(StoreError::task_not_found(task_id));
        }
        Ok(inner.requests.get(task_id).cloned().unwrap_or_default())
    }

    async fn transition_task(
        &self,
        task_id: &str,
        from: Option<TaskStatus>,
        to: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<Task, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let task = inner.task_mut(task_id)?;
        let expected = from.is_none_or(|f| f == task.status);
        if !expected || !task.status.can_transition_to(to) {
            return Err(StoreError::invalid("Task", task_id, task.status, to));
        }

        let now = Utc::now();
        task.status = to;
        task.updated_at = now;
        if to == TaskStatus::InProgress {
            task.started_at.get_or_insert(now);
        }
        if to.is_terminal() {
            task.completed_at = Some(now);
        }
        if let Some(message) = error_message {
            task.error_message = Some(message.to_string());
        }
        Ok(task.clone())
    }

    async fn transition_service_request(
        &self,
        request_id: Uuid,
        to: ServiceRequestStatus,
        update: ServiceRequestUpdate,
    ) -> Result<ServiceRequest, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let task_id = inner
            .request_owner
            .get(&request_id)
            .cloned()
            .ok_or_else(|| StoreError::request_not_found(request_id))?;
        let request = inner
            .requests
            .get_mut(&task_id)
            .and_then(|reqs| reqs.iter_mut().find(|r| r.request_id == request_id))
            .ok_or_else(|| StoreError::request_not_found(request_id))?;

        if !request.status.can_transition_to(to) {
            return Err(StoreError::invalid(
                "ServiceRequest",
                request_id.to_string(),
                request.status,
                to,
            ));
        }

        let now = Utc::now();
        request.status = to;
        request.updated_at = now;
        if to.is_terminal() {
            request.completed_at = Some(now);
        }
        if let Some(payload) = update.response_payload {
            request.response_payload = Some(payload);
        }
        if let Some(message) = &update.error_message {
            request.error_message = Some(message.clone());
        }
        if let Some(attempts) = update.attempts {
            request.attempts = attempts;
        }
        let updated = request.clone();

        if to == ServiceRequestStatus::Failed {
            if let Some(message) = &updated.error_message {
                inner.set_task_error_if_absent(&task_id, message);
            }
        }
        Ok(updated)
    }

    async fn admit_item(
        &self,
        task_id: &str,
        item_index: i32,
        requests: &[NewServiceRequest],
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;

        let task_status = inner.task_mut(task_id)?.status;
        if task_status.is_terminal() {
            return Err(StoreError::invalid(
                "Task",
                task_id,
                task_status,
                TaskStatus::InProgress,
            ));
        }
        let item = inner.item_mut(task_id, item_index)?;
        if item.status != TaskStatus::Pending {
            return Err(StoreError::invalid(
                "ComputeItem",
                format!("{task_id}#{item_index}"),
                item.status,
                TaskStatus::InProgress,
            ));
        }

        let now = Utc::now();
        item.status = TaskStatus::InProgress;
        item.updated_at = now;

        let task = inner.task_mut(task_id)?;
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::InProgress;
            task.started_at = Some(now);
            task.updated_at = now;
        }

        let created: Vec<ServiceRequest> = requests
            .iter()
            .map(|new| ServiceRequest {
                request_id: new.request_id,
                task_id: task_id.to_string(),
                item_index,
                service_name: new.service.as_str().to_string(),
                status: ServiceRequestStatus::Pending,
                request_payload: new.request_payload.clone(),
                response_payload: None,
                error_message: None,
                attempts: 0,
                created_at: now,
                updated_at: now,
                completed_at: None,
            })
            .collect();
        for request in &created {
            inner
                .request_owner
                .insert(request.request_id, task_id.to_string());
        }
        inner
            .requests
            .entry(task_id.to_string())
            .or_default()
            .extend(created.iter().cloned());
        Ok(created)
    }

    async fn supersede_item(
        &self,
        task_id: &str,
        item_index: i32,
        superseded_by: &str,
    ) -> Result<ComputeItemRecord, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let item = inner.item_mut(task_id, item_index)?;
        if item.status != TaskStatus::Pending {
            return Err(StoreError::invalid(
                "ComputeItem",
                format!("{task_id}#{item_index}"),
                item.status,
                TaskStatus::Superseded,
            ));
        }
        item.status = TaskStatus::Superseded;
        item.superseded_by = Some(superseded_by.to_string());
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn resolve_item(
        &self,
        task_id: &str,
        item_index: i32,
        to: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<ComputeItemRecord, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let item = inner.item_mut(task_id, item_index)?;
        let valid = matches!(to, TaskStatus::Completed | TaskStatus::Failed)
            && item.status == TaskStatus::InProgress;
        if !valid {
            return Err(StoreError::invalid(
                "ComputeItem",
                format!("{task_id}#{item_index}"),
                item.status,
                to,
            ));
        }
        item.status = to;
        item.updated_at = Utc::now();
        if let Some(message) = error_message {
            item.error_message = Some(message.to_string());
        }
        let updated = item.clone();

        if to == TaskStatus::Failed {
            if let Some(message) = error_message {
                inner.set_task_error_if_absent(task_id, message);
            }
        }
        Ok(updated)
    }

    async fn fail_unresolved_requests(
        &self,
        task_id: &str,
        item_index: i32,
        error_message: &str,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if !inner.tasks.contains_key(task_id) {
            return Err(StoreError::task_not_found(task_id));
        }

        let now = Utc::now();
        let mut changed = Vec::new();
        if let Some(requests) = inner.requests.get_mut(task_id) {
            for request in requests
                .iter_mut()
                .filter(|r| r.item_index == item_index && !r.status.is_terminal())
            {
                request.status = ServiceRequestStatus::Failed;
                request.error_message = Some(error_message.to_string());
                request.updated_at = now;
                request.completed_at = Some(now);
                changed.push(request.clone());
            }
        }
        if !changed.is_empty() {
            inner.set_task_error_if_absent(task_id, error_message);
        }
        Ok(changed)
    }

    async fn finalize_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let detail = inner.detail(task_id)?;
        if detail.task.status.is_terminal() {
            return Ok(None);
        }
        let Some(outcome) = resolve_outcome(&detail.items, &detail.service_requests) else {
            return Ok(None);
        };

        let now = Utc::now();
        let task = inner.task_mut(task_id)?;
        task.status = outcome.status;
        task.superseded_by = outcome.superseded_by;
        if task.error_message.is_none() {
            task.error_message = outcome.error_message;
        }
        task.updated_at = now;
        task.completed_at = Some(now);
        Ok(Some(task.clone()))
    }

    async fn fail_orphaned_tasks(&self, reason: &str) -> Result<Vec<String>, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let orphaned: Vec<String> = inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .tasks
                    .get(*id)
                    .is_some_and(|t| t.status == TaskStatus::InProgress)
            })
            .cloned()
            .collect();

        let now = Utc::now();
        for task_id in &orphaned {
            if let Some(requests) = inner.requests.get_mut(task_id) {
                for request in requests.iter_mut().filter(|r| !r.status.is_terminal()) {
                    request.status = ServiceRequestStatus::Failed;
                    request.error_message = Some(reason.to_string());
                    request.updated_at = now;
                    request.completed_at = Some(now);
                }
            }
            if let Some(items) = inner.items.get_mut(task_id) {
                for item in items.iter_mut().filter(|i| !i.status.is_terminal()) {
                    item.status = TaskStatus::Failed;
                    item.error_message = Some(reason.to_string());
                    item.updated_at = now;
                }
            }
            let task = inner.task_mut(task_id)?;
            task.status = TaskStatus::Failed;
            task.error_message = Some(reason.to_string());
            task.updated_at = now;
            task.completed_at = Some(now);
        }
        Ok(orphaned)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use orch_core::compute::{ComputeItem, ServiceKind};
    use serde_json::json;

    use super::*;

    fn submission(task_id: &str, keys: &[(&str, &str)]) -> TaskSubmission {
        TaskSubmission {
            task_id: task_id.to_string(),
            name: "test".to_string(),
            description: None,
            items: keys
                .iter()
                .map(|(s, b)| {
                    ComputeItem::new(*s, *b).with_service(ServiceKind::Revenue, json!({"x": 1}))
                })
                .collect(),
        }
    }

    fn revenue_request() -> NewServiceRequest {
        NewServiceRequest::new(ServiceKind::Revenue, json!({"scenario_id": "s1"}))
    }

    #[tokio::test]
    async fn create_task_starts_pending_with_pending_items() {
        let store = MemoryTaskStore::new();
        let task = store
            .create_task(&submission("t1", &[("s1", "b1"), ("s2", "b1")]))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let detail = store.get_task_detail("t1").await.unwrap();
        assert_eq!(detail.items.len(), 2);
        assert!(detail.items.iter().all(|i| i.status == TaskStatus::Pending));
        assert!(detail.service_requests.is_empty());
    }

    #[tokio::test]
    async fn duplicate_task_id_rejected() {
        let store = MemoryTaskStore::new();
        store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();
        let err = store
            .create_task(&submission("t1", &[("s9", "b9")]))
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::DuplicateTask(id) if id == "t1");
    }

    #[tokio::test]
    async fn admit_moves_item_and_task_in_progress() {
        let store = MemoryTaskStore::new();
        store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();

        let created = store
            .admit_item("t1", 0, &[revenue_request()])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, ServiceRequestStatus::Pending);
        assert_eq!(created[0].service_name, "revenue");

        let task = store.get_task("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.started_at.is_some());
    }

    #[tokio::test]
    async fn admit_twice_rejected() {
        let store = MemoryTaskStore::new();
        store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();
        store.admit_item("t1", 0, &[revenue_request()]).await.unwrap();
        let err = store
            .admit_item("t1", 0, &[revenue_request()])
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::InvalidTransition { .. });
    }

    #[tokio::test]
    async fn terminal_service_request_not_overwritten() {
        let store = MemoryTaskStore::new();
        store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();
        let created = store.admit_item("t1", 0, &[revenue_request()]).await.unwrap();
        let id = created[0].request_id;

        store
            .transition_service_request(id, ServiceRequestStatus::InProgress, Default::default())
            .await
            .unwrap();
        store
            .transition_service_request(
                id,
                ServiceRequestStatus::Completed,
                ServiceRequestUpdate {
                    response_payload: Some(json!({"ok": true})),
                    attempts: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = store
            .transition_service_request(
                id,
                ServiceRequestStatus::Failed,
                ServiceRequestUpdate {
                    error_message: Some("late".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::InvalidTransition { .. });

        let reqs = store.list_service_requests("t1").await.unwrap();
        assert_eq!(reqs[0].status, ServiceRequestStatus::Completed);
        assert_eq!(reqs[0].response_payload, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn first_failure_sets_task_error_once() {
        let store = MemoryTaskStore::new();
        store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();
        let created = store
            .admit_item("t1", 0, &[revenue_request(), revenue_request()])
            .await
            .unwrap();

        for (request, message) in created.iter().zip(["first", "second"]) {
            store
                .transition_service_request(
                    request.request_id,
                    ServiceRequestStatus::Failed,
                    ServiceRequestUpdate {
                        error_message: Some(message.to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let task = store.get_task("t1").await.unwrap();
        assert_eq!(task.error_message.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn finalize_waits_for_every_item() {
        let store = MemoryTaskStore::new();
        store
            .create_task(&submission("t1", &[("s1", "b1"), ("s2", "b1")]))
            .await
            .unwrap();
        let created = store.admit_item("t1", 0, &[revenue_request()]).await.unwrap();
        store
            .transition_service_request(
                created[0].request_id,
                ServiceRequestStatus::InProgress,
                Default::default(),
            )
            .await
            .unwrap();
        store
            .transition_service_request(
                created[0].request_id,
                ServiceRequestStatus::Completed,
                Default::default(),
            )
            .await
            .unwrap();
        store
            .resolve_item("t1", 0, TaskStatus::Completed, None)
            .await
            .unwrap();

        assert!(store.finalize_task("t1").await.unwrap().is_none());

        store.supersede_item("t1", 1, "t2").await.unwrap();
        let task = store.finalize_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());

        // Already terminal: a second finalize is a no-op.
        assert!(store.finalize_task("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fully_superseded_task_never_runs() {
        let store = MemoryTaskStore::new();
        store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();
        store.supersede_item("t1", 0, "t2").await.unwrap();

        let task = store.finalize_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Superseded);
        assert_eq!(task.superseded_by.as_deref(), Some("t2"));
        assert!(task.started_at.is_none());
    }

    #[tokio::test]
    async fn terminal_task_rejects_transition() {
        let store = MemoryTaskStore::new();
        store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();
        store
            .transition_task("t1", None, TaskStatus::Failed, Some("boom"))
            .await
            .unwrap();
        let err = store
            .transition_task("t1", None, TaskStatus::InProgress, None)
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::InvalidTransition { .. });
    }

    #[tokio::test]
    async fn transition_task_checks_expected_status() {
        let store = MemoryTaskStore::new();
        store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();
        let err = store
            .transition_task(
                "t1",
                Some(TaskStatus::InProgress),
                TaskStatus::Completed,
                None,
            )
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::InvalidTransition { .. });
    }

    #[tokio::test]
    async fn orphaned_tasks_fail_with_reason() {
        let store = MemoryTaskStore::new();
        store
            .create_task(&submission("running", &[("s1", "b1"), ("s2", "b1")]))
            .await
            .unwrap();
        store.create_task(&submission("waiting", &[("s3", "b1")])).await.unwrap();
        store
            .admit_item("running", 0, &[revenue_request()])
            .await
            .unwrap();

        let failed = store.fail_orphaned_tasks("recovery: restarted").await.unwrap();
        assert_eq!(failed, vec!["running".to_string()]);

        let detail = store.get_task_detail("running").await.unwrap();
        assert_eq!(detail.task.status, TaskStatus::Failed);
        assert_eq!(
            detail.task.error_message.as_deref(),
            Some("recovery: restarted")
        );
        assert!(detail.items.iter().all(|i| i.status == TaskStatus::Failed));
        assert!(detail
            .service_requests
            .iter()
            .all(|r| r.status == ServiceRequestStatus::Failed));

        let waiting = store.get_task("waiting").await.unwrap();
        assert_eq!(waiting.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn list_tasks_newest_first_with_filter() {
        let store = MemoryTaskStore::new();
        for id in ["a", "b", "c"] {
            store.create_task(&submission(id, &[("s1", "b1")])).await.unwrap();
        }
        store
            .transition_task("b", None, TaskStatus::Failed, None)
            .await
            .unwrap();

        let all = store.list_tasks(&TaskListQuery::default()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let pending = store
            .list_tasks(&TaskListQuery {
                status: Some(TaskStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        let paged = store
            .list_tasks(&TaskListQuery {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged[0].task_id, "b");
    }

    #[tokio::test]
    async fn failed_writes_surface_as_unavailable() {
        let store = MemoryTaskStore::new();
        store.fail_writes(true);
        let err = store
            .create_task(&submission("t1", &[("s1", "b1")]))
            .await
            .unwrap_err();
        assert!(err.is_write_failure());

        store.fail_writes(false);
        assert!(store.create_task(&submission("t1", &[("s1", "b1")])).await.is_ok());
    }
}
