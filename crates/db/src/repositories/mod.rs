//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Every method runs exactly one statement and accepts any Postgres
//! executor, so callers can pass `&PgPool` for standalone reads or
//! `&mut *tx` to compose several calls into one transaction.

pub mod compute_item_repo;
pub mod service_request_repo;
pub mod task_repo;

pub use compute_item_repo::ComputeItemRepo;
pub use service_request_repo::ServiceRequestRepo;
pub use task_repo::TaskRepo;
