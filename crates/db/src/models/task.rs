//! Task and compute item models.

use orch_core::compute::{ComputeItem, ServiceKind};
use orch_core::types::{TaskKey, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::service_request::ServiceRequest;
use super::status::TaskStatus;

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub task_id: String,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: TaskStatus,
    /// Newer task that displaced this one, when `status` is `SUPERSEDED`.
    pub superseded_by: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// A row from the `compute_items` table.
///
/// Items share the task lifecycle: each one is admitted, executed, and
/// resolved on its own key lane.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ComputeItemRecord {
    pub task_id: String,
    pub item_index: i32,
    pub scenario_id: String,
    pub business_type_id: String,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: TaskStatus,
    pub superseded_by: Option<String>,
    pub error_message: Option<String>,
    pub revenue: Option<serde_json::Value>,
    pub rebates: Option<serde_json::Value>,
    pub specialty: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ComputeItemRecord {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.scenario_id, &self.business_type_id)
    }

    /// Rebuild the domain item (used when resuming pending work).
    pub fn to_compute_item(&self) -> ComputeItem {
        let mut item = ComputeItem::new(&self.scenario_id, &self.business_type_id);
        for (kind, slot) in [
            (ServiceKind::Revenue, &self.revenue),
            (ServiceKind::Rebates, &self.rebates),
            (ServiceKind::Specialty, &self.specialty),
        ] {
            if let Some(fields) = slot {
                item = item.with_service(kind, fields.clone());
            }
        }
        item
    }
}

/// A task with its items and service requests, as returned by detail queries.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub items: Vec<ComputeItemRecord>,
    pub service_requests: Vec<ServiceRequest>,
}

/// Query parameters for task listing.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// Filter by status, e.g. `COMPLETED`.
    pub status: Option<TaskStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Maximum page size for task listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for task listing.
pub const DEFAULT_LIMIT: i64 = 50;

impl TaskListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
