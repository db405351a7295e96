//! In-process task queue with at-least-once delivery.
//!
//! Producers [`publish`](TaskQueue::publish) messages; a single consumer loop
//! ([`TaskQueue::run`]) hands them to a [`QueueConsumer`] in arrival order.
//! A message is acknowledged only when the consumer returns
//! [`Delivery::Ack`]. Otherwise it is re-enqueued after an exponential
//! backoff and delivered again, up to `max_attempts` deliveries, after which
//! it is dead-lettered (logged and counted).
//!
//! Redelivered messages rejoin the back of the queue, so ordering is only
//! guaranteed for messages that are acknowledged on first delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orch_core::retry::RetryPolicy;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Outcome of handling one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Ack,
    /// Not acknowledged; the message will be delivered again.
    Retry(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("Task queue is closed")]
    Closed,
    #[error("Task queue already has a consumer")]
    AlreadyConsuming,
}

/// Handles messages taken off a [`TaskQueue`].
#[async_trait]
pub trait QueueConsumer<T>: Send + Sync {
    async fn handle(&self, message: T) -> Delivery;
}

/// Redelivery tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// `max_attempts` bounds total deliveries of one message; the backoff
    /// spaces the redeliveries.
    pub redelivery: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redelivery: RetryPolicy {
                max_attempts: 10,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
                jitter: 0.25,
            },
        }
    }
}

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub published: u64,
    pub acked: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
    /// Messages accepted but neither acknowledged nor dead-lettered yet.
    pub outstanding: u64,
}

struct Envelope<T> {
    id: u64,
    payload: T,
    /// 1-based delivery number this envelope will be handed out as.
    delivery: u32,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    acked: AtomicU64,
    redelivered: AtomicU64,
    dead_lettered: AtomicU64,
}

pub struct TaskQueue<T> {
    sender: mpsc::UnboundedSender<Envelope<T>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Envelope<T>>>>,
    config: QueueConfig,
    next_id: AtomicU64,
    counters: Arc<Counters>,
}

impl<T: Clone + Send + 'static> TaskQueue<T> {
    pub fn new(config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            config,
            next_id: AtomicU64::new(1),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Enqueue a message. Returns its queue-local id.
    pub fn publish(&self, payload: T) -> Result<u64, QueueError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sender
            .send(Envelope {
                id,
                payload,
                delivery: 1,
            })
            .map_err(|_| QueueError::Closed)?;
        self.counters.published.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    pub fn stats(&self) -> QueueStats {
        let published = self.counters.published.load(Ordering::SeqCst);
        let acked = self.counters.acked.load(Ordering::SeqCst);
        let dead_lettered = self.counters.dead_lettered.load(Ordering::SeqCst);
        QueueStats {
            published,
            acked,
            redelivered: self.counters.redelivered.load(Ordering::SeqCst),
            dead_lettered,
            outstanding: published.saturating_sub(acked + dead_lettered),
        }
    }

    /// Consume messages until `cancel` fires.
    ///
    /// On cancellation the queue stops accepting messages, hands every
    /// message already buffered to the consumer once, and returns. Pending
    /// redeliveries are abandoned.
    pub async fn run(
        &self,
        consumer: Arc<dyn QueueConsumer<T>>,
        cancel: CancellationToken,
    ) -> Result<(), QueueError> {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(QueueError::AlreadyConsuming)?;

        tracing::info!("Task queue consumer started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(envelope) => self.dispatch(consumer.as_ref(), envelope, true).await,
                    None => break,
                },
            }
        }

        receiver.close();
        let mut drained = 0usize;
        while let Some(envelope) = receiver.recv().await {
            self.dispatch(consumer.as_ref(), envelope, false).await;
            drained += 1;
        }
        tracing::info!(drained, "Task queue consumer stopped");
        Ok(())
    }

    async fn dispatch(&self, consumer: &dyn QueueConsumer<T>, envelope: Envelope<T>, redeliver: bool) {
        let Envelope {
            id,
            payload,
            delivery,
        } = envelope;

        let reason = match consumer.handle(payload.clone()).await {
            Delivery::Ack => {
                self.counters.acked.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Delivery::Retry(reason) => reason,
        };

        let policy = &self.config.redelivery;
        if !redeliver || !policy.should_retry(delivery) {
            self.counters.dead_lettered.fetch_add(1, Ordering::SeqCst);
            tracing::error!(
                message_id = id,
                delivery,
                reason = %reason,
                "Message dead-lettered",
            );
            return;
        }

        let delay = policy.backoff_with_jitter(delivery);
        tracing::warn!(
            message_id = id,
            delivery,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "Message not acknowledged, scheduling redelivery",
        );
        self.counters.redelivered.fetch_add(1, Ordering::SeqCst);

        let sender = self.sender.clone();
        let counters = Arc::clone(&self.counters);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let envelope = Envelope {
                id,
                payload,
                delivery: delivery + 1,
            };
            if sender.send(envelope).is_err() {
                counters.dead_lettered.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(message_id = id, "Queue closed before redelivery");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
