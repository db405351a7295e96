//! The orchestration coordinator.
//!
//! A task moves RECEIVED -> (persisted PENDING) -> per item: sequenced ->
//! admitted -> executed -> resolved, and finally the task is finalized to
//! COMPLETED, FAILED, or SUPERSEDED once every item is terminal.
//!
//! Each busy key is driven by one lane worker spawned on a [`TaskTracker`].
//! The worker claims a unit from the sequencer only when it is about to
//! execute it, releases the key afterwards, and keeps claiming until the
//! lane is empty, so a key is always released even when execution fails or
//! panics.
//!
//! After a task is acknowledged every store write is retried until it lands
//! (see [`retry_write`]). Retrying stops only when the shutdown grace period
//! runs out; whatever is left is reconciled by [`Coordinator::recover`] on the
//! next start.

use std::sync::Arc;
use std::time::Duration;

use orch_core::compute::{OrchestrationRequest, TaskSubmission};
use orch_core::retry::RetryPolicy;
use orch_core::types::TaskKey;
use orch_db::models::service_request::NewServiceRequest;
use orch_db::models::status::TaskStatus;
use orch_db::models::task::{Task, TaskDetail};
use orch_db::store::{StoreError, TaskStore};
use orch_events::{EventBus, TaskEvent, TaskEventKind};
use orch_services::ServiceClient;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::EngineConfig;
use crate::error::OrchestrationError;
use crate::executor::FanOutExecutor;
use crate::persist::retry_write;
use crate::sequencer::{KeySequencer, SubmitOutcome, WorkUnit};

/// Error recorded on tasks that were executing when the process stopped.
pub const RECOVERY_ERROR: &str = "recovery: task was in progress when the service restarted";

/// Result of a successful [`Coordinator::submit`].
#[derive(Debug, Clone)]
pub enum Submission {
    /// Newly persisted and handed to the sequencer.
    Accepted(Task),
    /// The task id was already known; the existing record is returned and
    /// nothing is executed again.
    Duplicate(Task),
}

impl Submission {
    pub fn task(&self) -> &Task {
        match self {
            Submission::Accepted(task) | Submission::Duplicate(task) => task,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Submission::Duplicate(_))
    }
}

/// What startup recovery did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryReport {
    /// IN_PROGRESS tasks marked FAILED.
    pub failed: Vec<String>,
    /// PENDING tasks handed back to the sequencer.
    pub resumed: Vec<String>,
}

pub struct Coordinator {
    store: Arc<dyn TaskStore>,
    sequencer: KeySequencer,
    executor: FanOutExecutor,
    bus: Arc<EventBus>,
    tracker: TaskTracker,
    /// Backoff for store writes made after acceptance.
    retry: RetryPolicy,
    /// Cancelled when the shutdown grace period runs out.
    stop: CancellationToken,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        client: Arc<dyn ServiceClient>,
        bus: Arc<EventBus>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let stop = CancellationToken::new();
        let executor = FanOutExecutor::new(client, Arc::clone(&store), config, stop.clone());
        Arc::new(Self {
            store,
            sequencer: KeySequencer::new(),
            executor,
            bus,
            tracker: TaskTracker::new(),
            retry: config.retry.clone(),
            stop,
        })
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn sequencer(&self) -> &KeySequencer {
        &self.sequencer
    }

    /// Number of lane tasks still running.
    pub fn active_lanes(&self) -> usize {
        self.tracker.len()
    }

    // -----------------------------------------------------------------------
    // Ingress
    // -----------------------------------------------------------------------

    /// Validate a raw request and submit it.
    pub async fn accept(
        self: &Arc<Self>,
        request: OrchestrationRequest,
    ) -> Result<Submission, OrchestrationError> {
        let submission = request.into_submission()?;
        self.submit(submission).await
    }

    /// Persist a validated task and hand its items to the sequencer.
    ///
    /// Returns once the task is durably recorded; execution continues in the
    /// background. A [`OrchestrationError::StoreWrite`] means nothing was
    /// accepted and the caller should not acknowledge the submission.
    pub async fn submit(
        self: &Arc<Self>,
        submission: TaskSubmission,
    ) -> Result<Submission, OrchestrationError> {
        if self.tracker.is_closed() {
            return Err(OrchestrationError::ShuttingDown);
        }

        let task = match self.store.create_task(&submission).await {
            Ok(task) => task,
            Err(StoreError::DuplicateTask(task_id)) => {
                let existing = self.store.get_task(&task_id).await?;
                tracing::info!(
                    task_id = %task_id,
                    status = %existing.status,
                    "Duplicate task submission ignored",
                );
                return Ok(Submission::Duplicate(existing));
            }
            Err(e) => {
                tracing::error!(
                    task_id = %submission.task_id,
                    error = %e,
                    "Failed to persist task",
                );
                return Err(OrchestrationError::StoreWrite(e));
            }
        };

        tracing::info!(
            task_id = %task.task_id,
            items = submission.items.len(),
            "Task accepted",
        );
        self.bus.publish(
            TaskEvent::new(TaskEventKind::Accepted, &task.task_id)
                .with_payload(json!({ "items": submission.items.len() })),
        );

        let units = submission
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| WorkUnit::new(&task.task_id, index as i32, item))
            .collect();
        self.schedule(units).await;

        Ok(Submission::Accepted(task))
    }

    /// Submit and wait until the task reaches a terminal state.
    pub async fn submit_and_wait(
        self: &Arc<Self>,
        request: OrchestrationRequest,
        timeout: Duration,
    ) -> Result<TaskDetail, OrchestrationError> {
        let submission = request.into_submission()?;
        let task_id = submission.task_id.clone();

        // Subscribe first so the terminal event cannot slip past.
        let mut events = self.bus.subscribe();
        let outcome = self.submit(submission).await?;

        if !outcome.task().status.is_terminal() {
            let wait = self.wait_terminal(&task_id, &mut events);
            match tokio::time::timeout(timeout, wait).await {
                Ok(result) => result?,
                Err(_) => return Err(OrchestrationError::WaitTimeout(task_id)),
            }
        }

        Ok(self.store.get_task_detail(&task_id).await?)
    }

    async fn wait_terminal(
        &self,
        task_id: &str,
        events: &mut broadcast::Receiver<TaskEvent>,
    ) -> Result<(), OrchestrationError> {
        loop {
            match events.recv().await {
                Ok(event) if event.task_id == task_id && event.kind.is_terminal() => return Ok(()),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.store.get_task(task_id).await?.status.is_terminal() {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(OrchestrationError::ShuttingDown);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Reconcile state left by a previous process. Must run before ingress
    /// starts accepting submissions.
    ///
    /// IN_PROGRESS tasks are failed with [`RECOVERY_ERROR`]. PENDING tasks
    /// never started executing and are resubmitted oldest first.
    pub async fn recover(self: &Arc<Self>) -> Result<RecoveryReport, OrchestrationError> {
        let failed = self
            .store
            .fail_orphaned_tasks(RECOVERY_ERROR)
            .await
            .map_err(OrchestrationError::Recovery)?;
        for task_id in &failed {
            tracing::warn!(task_id = %task_id, "Orphaned in-progress task marked failed");
            self.bus.publish(
                TaskEvent::new(TaskEventKind::Failed, task_id)
                    .with_payload(json!({ "error_message": RECOVERY_ERROR })),
            );
        }

        let pending = self
            .store
            .list_task_details_by_status(TaskStatus::Pending)
            .await
            .map_err(OrchestrationError::Recovery)?;

        let mut resumed = Vec::with_capacity(pending.len());
        for detail in pending {
            let task_id = detail.task.task_id.clone();
            let units: Vec<WorkUnit> = detail
                .items
                .iter()
                .filter(|item| item.status == TaskStatus::Pending)
                .map(|item| WorkUnit::new(&task_id, item.item_index, item.to_compute_item()))
                .collect();

            if units.is_empty() {
                self.finalize(&task_id).await;
                continue;
            }
            tracing::info!(task_id = %task_id, items = units.len(), "Resuming pending task");
            self.schedule(units).await;
            resumed.push(task_id);
        }

        tracing::info!(
            failed = failed.len(),
            resumed = resumed.len(),
            "Startup recovery complete",
        );
        Ok(RecoveryReport { failed, resumed })
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop accepting submissions and wait up to `grace` for running lanes.
    /// Returns `true` if every lane finished in time. Pending store-write
    /// retries are abandoned once `grace` has elapsed.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        self.stop.cancel();
        if drained {
            tracing::info!("Coordinator drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Coordinator shutdown grace period elapsed with lanes still running",
            );
        }
        drained
    }

    // -----------------------------------------------------------------------
    // Lanes
    // -----------------------------------------------------------------------

    async fn schedule(self: &Arc<Self>, units: Vec<WorkUnit>) {
        for unit in units {
            match self.sequencer.submit(unit.clone()) {
                SubmitOutcome::Opened => self.spawn_lane(unit.key()),
                SubmitOutcome::Queued { superseded } => {
                    tracing::debug!(
                        task_id = %unit.task_id,
                        item_index = unit.item_index,
                        key = %unit.key(),
                        "Work unit queued behind its key",
                    );
                    for old in superseded {
                        self.supersede(&old, &unit.task_id).await;
                    }
                }
            }
        }
    }

    fn spawn_lane(self: &Arc<Self>, key: TaskKey) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move { this.drive_lane(key).await });
    }

    /// Execute units claimed from `key` until its lane is empty.
    async fn drive_lane(self: Arc<Self>, key: TaskKey) {
        while let Some(unit) = self.sequencer.claim(&key) {
            let runner = Arc::clone(&self);
            let current = unit.clone();
            let run = tokio::spawn(async move { runner.process_unit(&current).await });
            if let Err(join_err) = run.await {
                tracing::error!(
                    task_id = %unit.task_id,
                    item_index = unit.item_index,
                    error = %join_err,
                    "Work unit crashed",
                );
                self.fail_unit(&unit, &format!("internal error: {join_err}"))
                    .await;
            }

            if !self.sequencer.complete(&unit) {
                break;
            }
            tracing::debug!(key = %key, "Key released with work waiting");
        }
    }

    async fn process_unit(&self, unit: &WorkUnit) {
        let new_requests: Vec<NewServiceRequest> = unit
            .item
            .services()
            .into_iter()
            .filter_map(|kind| {
                let payload = unit.item.request_payload(kind)?;
                Some(NewServiceRequest::new(kind, payload))
            })
            .collect();

        let store = &self.store;
        let task_id = unit.task_id.as_str();
        let item_index = unit.item_index;
        let new_requests = new_requests.as_slice();
        let admitted = retry_write(&self.retry, &self.stop, "admit_item", move || {
            store.admit_item(task_id, item_index, new_requests)
        })
        .await;

        let requests = match admitted {
            Ok(requests) => requests,
            Err(StoreError::InvalidTransition { from, .. }) => {
                tracing::debug!(
                    task_id = %unit.task_id,
                    item_index = unit.item_index,
                    status = %from,
                    "Work unit no longer pending, skipping",
                );
                self.finalize(&unit.task_id).await;
                return;
            }
            Err(e) => {
                tracing::error!(
                    task_id = %unit.task_id,
                    item_index = unit.item_index,
                    error = %e,
                    "Failed to admit work unit; left pending for recovery",
                );
                return;
            }
        };

        tracing::info!(
            task_id = %unit.task_id,
            item_index = unit.item_index,
            scenario_id = %unit.item.scenario_id,
            business_type_id = %unit.item.business_type_id,
            services = requests.len(),
            "Work unit admitted",
        );
        self.bus.publish(
            TaskEvent::new(TaskEventKind::Admitted, &unit.task_id).with_payload(json!({
                "item_index": unit.item_index,
                "scenario_id": unit.item.scenario_id,
                "business_type_id": unit.item.business_type_id,
                "services": requests.len(),
            })),
        );

        match self.executor.execute(unit, requests).await {
            Ok(result) => {
                let status = result.status;
                let error_message = result.error_message.as_deref();
                let resolved = retry_write(&self.retry, &self.stop, "resolve_item", move || {
                    store.resolve_item(task_id, item_index, status, error_message)
                })
                .await;
                if let Err(e) = resolved {
                    tracing::error!(
                        task_id = %unit.task_id,
                        item_index = unit.item_index,
                        error = %e,
                        "Failed to record work unit result",
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    task_id = %unit.task_id,
                    item_index = unit.item_index,
                    error = %e,
                    "Work unit execution aborted",
                );
                self.fail_unit(unit, &format!("internal error: {e}")).await;
                return;
            }
        }

        self.finalize(&unit.task_id).await;
    }

    /// Fail an admitted unit after an unexpected error.
    async fn fail_unit(&self, unit: &WorkUnit, message: &str) {
        let store = &self.store;
        let task_id = unit.task_id.as_str();
        let item_index = unit.item_index;

        let unresolved = retry_write(&self.retry, &self.stop, "fail_unresolved_requests", move || {
            store.fail_unresolved_requests(task_id, item_index, message)
        })
        .await;
        if let Err(e) = unresolved {
            tracing::error!(task_id = %unit.task_id, error = %e, "Failed to fail unresolved requests");
        }

        let resolved = retry_write(&self.retry, &self.stop, "resolve_item", move || {
            store.resolve_item(task_id, item_index, TaskStatus::Failed, Some(message))
        })
        .await;
        match resolved {
            Ok(_) | Err(StoreError::InvalidTransition { .. }) => {}
            Err(e) => {
                tracing::error!(task_id = %unit.task_id, error = %e, "Failed to fail work unit");
            }
        }
        self.finalize(&unit.task_id).await;
    }

    async fn supersede(&self, old: &WorkUnit, by: &str) {
        let store = &self.store;
        let task_id = old.task_id.as_str();
        let item_index = old.item_index;
        let superseded = retry_write(&self.retry, &self.stop, "supersede_item", move || {
            store.supersede_item(task_id, item_index, by)
        })
        .await;
        match superseded {
            Ok(_) => tracing::info!(
                task_id = %old.task_id,
                item_index = old.item_index,
                superseded_by = %by,
                "Work unit superseded",
            ),
            Err(StoreError::InvalidTransition { from, .. }) => tracing::debug!(
                task_id = %old.task_id,
                item_index = old.item_index,
                status = %from,
                "Superseded work unit was no longer pending",
            ),
            Err(e) => tracing::error!(
                task_id = %old.task_id,
                item_index = old.item_index,
                error = %e,
                "Failed to record superseded work unit",
            ),
        }
        self.finalize(&old.task_id).await;
    }

    /// Finalize the task if all of its items are terminal and announce it.
    async fn finalize(&self, task_id: &str) {
        let store = &self.store;
        let finalized = retry_write(&self.retry, &self.stop, "finalize_task", move || {
            store.finalize_task(task_id)
        })
        .await;
        let task = match finalized {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Failed to finalize task");
                return;
            }
        };

        let kind = match task.status {
            TaskStatus::Completed => TaskEventKind::Completed,
            TaskStatus::Superseded => TaskEventKind::Superseded,
            _ => TaskEventKind::Failed,
        };
        tracing::info!(
            task_id = %task.task_id,
            status = %task.status,
            error_message = task.error_message.as_deref().unwrap_or(""),
            "Task finished",
        );
        self.bus.publish(TaskEvent::new(kind, &task.task_id).with_payload(json!({
            "status": task.status,
            "error_message": task.error_message,
            "superseded_by": task.superseded_by,
        })));
    }
}
