//! Service request models: one downstream call per (compute item, service).

use orch_core::compute::ServiceKind;
use orch_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::status::ServiceRequestStatus;

/// A row from the `service_requests` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ServiceRequest {
    pub request_id: Uuid,
    pub task_id: String,
    pub item_index: i32,
    pub service_name: String,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: ServiceRequestStatus,
    pub request_payload: serde_json::Value,
    pub response_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Number of dispatch attempts made so far.
    pub attempts: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Input for creating a service request at admission time.
#[derive(Debug, Clone)]
pub struct NewServiceRequest {
    pub request_id: Uuid,
    pub service: ServiceKind,
    pub request_payload: serde_json::Value,
}

impl NewServiceRequest {
    pub fn new(service: ServiceKind, request_payload: serde_json::Value) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            service,
            request_payload,
        }
    }
}

/// Outcome written by [`TaskStore::transition_service_request`].
///
/// [`TaskStore::transition_service_request`]: crate::store::TaskStore::transition_service_request
#[derive(Debug, Clone, Default)]
pub struct ServiceRequestUpdate {
    pub response_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Attempt count to record; left unchanged when `None`.
    pub attempts: Option<i32>,
}
