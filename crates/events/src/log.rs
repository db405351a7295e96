//! Background subscriber that writes task lifecycle events to the log.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::{TaskEvent, TaskEventKind};

pub struct EventLog;

impl EventLog {
    /// Log every event until the bus closes or `cancel` fires.
    pub async fn run(mut receiver: broadcast::Receiver<TaskEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(event) => Self::record(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event log lagged, some events were not logged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, event log shutting down");
                        break;
                    }
                },
            }
        }
    }

    fn record(event: &TaskEvent) {
        match event.kind {
            TaskEventKind::Failed => tracing::warn!(
                event_type = event.kind.as_str(),
                task_id = %event.task_id,
                payload = %event.payload,
                "Task event",
            ),
            _ => tracing::info!(
                event_type = event.kind.as_str(),
                task_id = %event.task_id,
                payload = %event.payload,
                "Task event",
            ),
        }
    }
}
