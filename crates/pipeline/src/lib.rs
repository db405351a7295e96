//! The orchestration engine.
//!
//! - [`sequencer::KeySequencer`]: one executing work unit per key; units
//!   waiting for it are replaced by the latest submitted task.
//! - [`executor::FanOutExecutor`]: concurrent, retried, globally capped
//!   downstream calls for one admitted work unit.
//! - [`coordinator::Coordinator`]: validates, persists, sequences, executes,
//!   and finalizes tasks; also runs startup recovery.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
mod persist;
pub mod sequencer;

pub use config::EngineConfig;
pub use coordinator::{Coordinator, RecoveryReport, Submission};
pub use error::OrchestrationError;
pub use executor::FanOutExecutor;
pub use sequencer::{KeySequencer, SubmitOutcome, WorkUnit};
