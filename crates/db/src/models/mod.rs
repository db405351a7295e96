//! Domain model structs and DTOs.
//!
//! Each submodule contains `FromRow` + `Serialize` entity structs matching
//! the database rows, plus the small input DTOs the store accepts.

pub mod service_request;
pub mod status;
pub mod task;
