//! Service fan-out for one admitted work unit.
//!
//! Every service request of the unit runs as its own task in a [`JoinSet`].
//! Calls across all units share one [`Semaphore`], which caps the number of
//! downstream calls in flight process-wide. A permit is held only for the
//! duration of a single attempt, never across a backoff sleep.
//!
//! Service request writes go through [`retry_write`], so an outage of the
//! store delays a call's resolution instead of losing it.

use std::sync::Arc;
use std::time::Duration;

use orch_core::compute::ServiceKind;
use orch_core::retry::RetryPolicy;
use orch_db::models::service_request::{ServiceRequest, ServiceRequestUpdate};
use orch_db::models::status::{ServiceRequestStatus, TaskStatus};
use orch_db::store::{StoreError, TaskStore};
use orch_services::{ServiceCallError, ServiceClient};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::persist::retry_write;
use crate::sequencer::WorkUnit;

/// Aggregate result of executing one work unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    /// `Completed` iff every service request completed.
    pub status: TaskStatus,
    /// First failure by completion order.
    pub error_message: Option<String>,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: bool,
}

enum CallOutcome {
    Completed,
    Failed(String),
    /// Stopped by the unit's cancellation token, or already resolved by
    /// someone else. Not counted either way.
    Abandoned,
}

/// Shared pieces each spawned call needs.
#[derive(Clone)]
struct CallContext {
    client: Arc<dyn ServiceClient>,
    store: Arc<dyn TaskStore>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    stop: CancellationToken,
}

impl CallContext {
    async fn record(
        &self,
        request: &ServiceRequest,
        status: ServiceRequestStatus,
        update: ServiceRequestUpdate,
    ) -> Result<ServiceRequest, StoreError> {
        let store = &self.store;
        let request_id = request.request_id;
        retry_write(&self.retry, &self.stop, "service_request", move || {
            store.transition_service_request(request_id, status, update.clone())
        })
        .await
    }
}

pub struct FanOutExecutor {
    client: Arc<dyn ServiceClient>,
    store: Arc<dyn TaskStore>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    task_timeout: Option<Duration>,
    stop: CancellationToken,
}

impl FanOutExecutor {
    /// `stop` ends store-write retries; the coordinator cancels it when its
    /// shutdown grace period runs out.
    pub fn new(
        client: Arc<dyn ServiceClient>,
        store: Arc<dyn TaskStore>,
        config: &EngineConfig,
        stop: CancellationToken,
    ) -> Self {
        Self {
            client,
            store,
            permits: Arc::new(Semaphore::new(config.max_concurrent_calls.max(1))),
            retry: config.retry.clone(),
            task_timeout: config.task_timeout,
            stop,
        }
    }

    /// Calls currently allowed to start before the global cap is reached.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run every service request of `unit` to a terminal state.
    ///
    /// Waits for all requests, so partial results are persisted even when
    /// one of them fails. With a task timeout configured, requests still
    /// unresolved at the deadline are stopped and recorded FAILED.
    pub async fn execute(
        &self,
        unit: &WorkUnit,
        requests: Vec<ServiceRequest>,
    ) -> Result<ItemResult, StoreError> {
        let cancel = CancellationToken::new();
        let mut calls = JoinSet::new();
        for request in requests {
            let ctx = CallContext {
                client: Arc::clone(&self.client),
                store: Arc::clone(&self.store),
                permits: Arc::clone(&self.permits),
                retry: self.retry.clone(),
                cancel: cancel.clone(),
                stop: self.stop.clone(),
            };
            calls.spawn(run_call(ctx, request));
        }

        let deadline = async {
            match self.task_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut result = ItemResult {
            status: TaskStatus::Completed,
            error_message: None,
            completed: 0,
            failed: 0,
            timed_out: false,
        };
        let mut store_error = None;
        let mut crashed = false;

        loop {
            tokio::select! {
                joined = calls.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(CallOutcome::Completed))) => result.completed += 1,
                    Some(Ok(Ok(CallOutcome::Failed(message)))) => {
                        result.failed += 1;
                        result.error_message.get_or_insert(message);
                    }
                    Some(Ok(Ok(CallOutcome::Abandoned))) => {}
                    Some(Ok(Err(e))) => {
                        store_error.get_or_insert(e);
                    }
                    Some(Err(join_err)) => {
                        crashed = true;
                        result.failed += 1;
                        result
                            .error_message
                            .get_or_insert(format!("service call crashed: {join_err}"));
                    }
                },
                _ = &mut deadline, if !result.timed_out => {
                    tracing::warn!(
                        task_id = %unit.task_id,
                        item_index = unit.item_index,
                        "Work unit timed out, stopping unresolved calls",
                    );
                    result.timed_out = true;
                    cancel.cancel();
                }
            }
        }

        if let Some(e) = store_error {
            return Err(e);
        }

        if result.timed_out {
            let message = format!(
                "timed out after {}s",
                self.task_timeout.unwrap_or_default().as_secs()
            );
            let expired = self.fail_unresolved(unit, &message).await?;
            if !expired.is_empty() {
                result.failed += expired.len();
                result.error_message.get_or_insert(message);
            }
        }

        // A crashed call never resolved its request.
        if crashed {
            let message = result
                .error_message
                .clone()
                .unwrap_or_else(|| "service call crashed".to_string());
            self.fail_unresolved(unit, &message).await?;
        }

        if result.failed > 0 {
            result.status = TaskStatus::Failed;
        }
        Ok(result)
    }

    async fn fail_unresolved(
        &self,
        unit: &WorkUnit,
        message: &str,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let store = &self.store;
        let task_id = unit.task_id.as_str();
        let item_index = unit.item_index;
        retry_write(&self.retry, &self.stop, "fail_unresolved_requests", move || {
            store.fail_unresolved_requests(task_id, item_index, message)
        })
        .await
    }
}

/// Drive one service request through dispatch, retries, and resolution.
async fn run_call(ctx: CallContext, request: ServiceRequest) -> Result<CallOutcome, StoreError> {
    let service: ServiceKind = match request.service_name.parse() {
        Ok(kind) => kind,
        Err(e) => {
            let message = format!("unknown service: {e}");
            return record_failure(&ctx, &request, message, 0).await;
        }
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let permit = tokio::select! {
            _ = ctx.cancel.cancelled() => return Ok(CallOutcome::Abandoned),
            permit = Arc::clone(&ctx.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return record_failure(&ctx, &request, "executor closed".into(), attempt - 1).await;
                }
            },
        };

        if attempt == 1 {
            match ctx
                .record(
                    &request,
                    ServiceRequestStatus::InProgress,
                    ServiceRequestUpdate::default(),
                )
                .await
            {
                Ok(_) => {}
                Err(StoreError::InvalidTransition { .. }) => return Ok(CallOutcome::Abandoned),
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            task_id = %request.task_id,
            item_index = request.item_index,
            service = %service,
            attempt,
            "Dispatching service request",
        );

        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => return Ok(CallOutcome::Abandoned),
            result = ctx.client.call(service, &request.request_payload) => result,
        };
        drop(permit);

        match result {
            Ok(response) => {
                let update = ServiceRequestUpdate {
                    response_payload: Some(response),
                    error_message: None,
                    attempts: Some(attempt as i32),
                };
                return match ctx
                    .record(&request, ServiceRequestStatus::Completed, update)
                    .await
                {
                    Ok(_) => Ok(CallOutcome::Completed),
                    Err(StoreError::InvalidTransition { .. }) => {
                        tracing::debug!(
                            request_id = %request.request_id,
                            "Late result discarded, request already resolved",
                        );
                        Ok(CallOutcome::Abandoned)
                    }
                    Err(e) => Err(e),
                };
            }
            Err(e) if e.is_transient() && ctx.retry.should_retry(attempt) => {
                let delay = ctx.retry.backoff_with_jitter(attempt);
                tracing::warn!(
                    task_id = %request.task_id,
                    service = %service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient service failure, retrying",
                );
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Ok(CallOutcome::Abandoned),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                let message = failure_message(&e, attempt);
                tracing::warn!(
                    task_id = %request.task_id,
                    service = %service,
                    attempt,
                    error = %e,
                    "Service request failed",
                );
                return record_failure(&ctx, &request, message, attempt).await;
            }
        }
    }
}

fn failure_message(err: &ServiceCallError, attempts: u32) -> String {
    if err.is_transient() && attempts > 1 {
        format!("{err} (gave up after {attempts} attempts)")
    } else {
        err.to_string()
    }
}

async fn record_failure(
    ctx: &CallContext,
    request: &ServiceRequest,
    message: String,
    attempts: u32,
) -> Result<CallOutcome, StoreError> {
    let update = ServiceRequestUpdate {
        response_payload: None,
        error_message: Some(message.clone()),
        attempts: Some(attempts as i32),
    };
    match ctx
        .record(request, ServiceRequestStatus::Failed, update)
        .await
    {
        Ok(_) => Ok(CallOutcome::Failed(message)),
        Err(StoreError::InvalidTransition { .. }) => Ok(CallOutcome::Abandoned),
        Err(e) => Err(e),
    }
}
