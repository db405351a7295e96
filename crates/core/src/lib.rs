//! Domain types shared by every orchestrator crate.
//!
//! Pure data and pure functions only: compute items and their keys, request
//! validation, retry policy arithmetic, and the domain error type. Nothing in
//! here performs I/O.

pub mod compute;
pub mod error;
pub mod retry;
pub mod types;
