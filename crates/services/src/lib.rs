//! Downstream service clients.
//!
//! The engine talks to the revenue, rebates, and specialty services only
//! through the [`ServiceClient`] trait. [`HttpServiceClient`] is the
//! production implementation. With the `test-util` feature, `stub` provides
//! a scriptable in-process double for tests.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
#[cfg(any(test, feature = "test-util"))]
pub mod stub;

pub use client::{HttpServiceClient, ServiceClient};
pub use config::ServicesConfig;
pub use error::ServiceCallError;
pub use registry::ServiceRegistry;
