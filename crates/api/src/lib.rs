//! Orchestration API server library.
//!
//! Exposes the building blocks (config, state, error handling, ingress,
//! routes) so integration tests and the binary entrypoint share them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod ingress;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
