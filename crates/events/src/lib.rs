//! Lifecycle events and the in-process task queue.
//!
//! - [`EventBus`]: publish/subscribe hub for [`TaskEvent`]s backed by
//!   `tokio::sync::broadcast`.
//! - [`EventLog`]: background subscriber that writes every event to the log.
//! - [`TaskQueue`]: at-least-once queue transport with delayed redelivery of
//!   messages the consumer did not acknowledge.

pub mod bus;
pub mod log;
pub mod queue;

pub use bus::{EventBus, TaskEvent, TaskEventKind};
pub use log::EventLog;
pub use queue::{Delivery, QueueConfig, QueueConsumer, QueueError, QueueStats, TaskQueue};
