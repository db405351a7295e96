//! Ingress adapter: turns inbound orchestration requests into coordinator
//! submissions over the configured transport.
//!
//! In `direct` mode the request is persisted before the HTTP response goes
//! out. In `queue` mode it is validated, assigned a task id, and published;
//! [`SubmissionConsumer`] submits it and leaves it unacknowledged (so it is
//! redelivered) when the store write fails.

use std::sync::Arc;

use async_trait::async_trait;
use orch_core::compute::{OrchestrationRequest, TaskSubmission};
use orch_events::{Delivery, QueueConsumer, QueueError, QueueStats, TaskQueue};
use orch_pipeline::{Coordinator, OrchestrationError, Submission};
use serde::Serialize;

use crate::config::TransportMode;

/// Body of a `202 Accepted` orchestration response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub task_id: String,
    /// `accepted` for new work, `duplicate` when the task id was known.
    pub status: &'static str,
    pub message: String,
}

enum Transport {
    Direct,
    Queue(Arc<TaskQueue<TaskSubmission>>),
}

pub struct Ingress {
    coordinator: Arc<Coordinator>,
    transport: Transport,
}

impl Ingress {
    pub fn direct(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            transport: Transport::Direct,
        }
    }

    pub fn queued(coordinator: Arc<Coordinator>, queue: Arc<TaskQueue<TaskSubmission>>) -> Self {
        Self {
            coordinator,
            transport: Transport::Queue(queue),
        }
    }

    pub fn mode(&self) -> TransportMode {
        match self.transport {
            Transport::Direct => TransportMode::Direct,
            Transport::Queue(_) => TransportMode::Queue,
        }
    }

    /// Queue counters, when running over the queue transport.
    pub fn queue_stats(&self) -> Option<QueueStats> {
        match &self.transport {
            Transport::Direct => None,
            Transport::Queue(queue) => Some(queue.stats()),
        }
    }

    /// Validate `request` and hand it to the active transport.
    pub async fn accept(&self, request: OrchestrationRequest) -> Result<Receipt, OrchestrationError> {
        let submission = request.into_submission()?;
        let task_id = submission.task_id.clone();

        match &self.transport {
            Transport::Direct => match self.coordinator.submit(submission).await? {
                Submission::Accepted(task) => Ok(Receipt {
                    task_id: task.task_id,
                    status: "accepted",
                    message: "Task accepted for processing".to_string(),
                }),
                Submission::Duplicate(task) => Ok(Receipt {
                    message: format!("Task already exists with status {}", task.status),
                    task_id: task.task_id,
                    status: "duplicate",
                }),
            },
            Transport::Queue(queue) => {
                let message_id = queue.publish(submission).map_err(|e| match e {
                    QueueError::Closed | QueueError::AlreadyConsuming => {
                        OrchestrationError::ShuttingDown
                    }
                })?;
                tracing::debug!(task_id = %task_id, message_id, "Task published to queue");
                Ok(Receipt {
                    task_id,
                    status: "accepted",
                    message: "Task queued for processing".to_string(),
                })
            }
        }
    }
}

/// Queue consumer that submits each message to the coordinator.
pub struct SubmissionConsumer {
    coordinator: Arc<Coordinator>,
}

impl SubmissionConsumer {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl QueueConsumer<TaskSubmission> for SubmissionConsumer {
    async fn handle(&self, message: TaskSubmission) -> Delivery {
        let task_id = message.task_id.clone();
        match self.coordinator.submit(message).await {
            Ok(_) => Delivery::Ack,
            Err(e) if e.is_retryable() => {
                tracing::warn!(task_id = %task_id, error = %e, "Submission not recorded, will redeliver");
                Delivery::Retry(e.to_string())
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Dropping undeliverable submission");
                Delivery::Ack
            }
        }
    }
}
