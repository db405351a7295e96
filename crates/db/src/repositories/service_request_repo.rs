//! Repository for the `service_requests` table.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::service_request::{NewServiceRequest, ServiceRequest, ServiceRequestUpdate};
use crate::models::status::{ServiceRequestStatus, StatusId};

/// Column list for `service_requests` queries.
const COLUMNS: &str = "\
    request_id, task_id, item_index, service_name, status_id, \
    request_payload, response_payload, error_message, attempts, \
    created_at, updated_at, completed_at";

const UNRESOLVED_STATUSES: [StatusId; 2] = [
    ServiceRequestStatus::Pending as StatusId,
    ServiceRequestStatus::InProgress as StatusId,
];

/// Provides queries for downstream service requests.
pub struct ServiceRequestRepo;

impl ServiceRequestRepo {
    /// Insert a PENDING request for one (item, service) pair.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        item_index: i32,
        input: &NewServiceRequest,
    ) -> Result<ServiceRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO service_requests \
                 (request_id, task_id, item_index, service_name, status_id, request_payload) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(input.request_id)
            .bind(task_id)
            .bind(item_index)
            .bind(input.service.as_str())
            .bind(ServiceRequestStatus::Pending.id())
            .bind(&input.request_payload)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        request_id: Uuid,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM service_requests WHERE request_id = $1");
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(request_id)
            .fetch_optional(executor)
            .await
    }

    /// All requests of a task, by item then creation time.
    pub async fn list_by_task<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM service_requests WHERE task_id = $1 \
             ORDER BY item_index, created_at, service_name"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(task_id)
            .fetch_all(executor)
            .await
    }

    /// Move a request to `to` if its current status allows it.
    ///
    /// Returns `None` when the request is already terminal or otherwise not
    /// in a status that may move to `to`.
    pub async fn update_status<'e>(
        executor: impl PgExecutor<'e>,
        request_id: Uuid,
        to: ServiceRequestStatus,
        update: &ServiceRequestUpdate,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        let allowed_from: Vec<StatusId> = [
            ServiceRequestStatus::Pending,
            ServiceRequestStatus::InProgress,
            ServiceRequestStatus::Completed,
            ServiceRequestStatus::Failed,
        ]
        .into_iter()
        .filter(|from| from.can_transition_to(to))
        .map(ServiceRequestStatus::id)
        .collect();

        let query = format!(
            "UPDATE service_requests SET \
                 status_id = $2, \
                 response_payload = COALESCE($3, response_payload), \
                 error_message = COALESCE($4, error_message), \
                 attempts = COALESCE($5, attempts), \
                 completed_at = CASE WHEN $6 THEN NOW() ELSE completed_at END \
             WHERE request_id = $1 AND status_id = ANY($7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(request_id)
            .bind(to.id())
            .bind(&update.response_payload)
            .bind(&update.error_message)
            .bind(update.attempts)
            .bind(to.is_terminal())
            .bind(&allowed_from)
            .fetch_optional(executor)
            .await
    }

    /// Fail every unresolved request of one item.
    pub async fn fail_unresolved_for_item<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        item_index: i32,
        error_message: &str,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE service_requests SET status_id = $3, error_message = $4, completed_at = NOW() \
             WHERE task_id = $1 AND item_index = $2 AND status_id = ANY($5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(task_id)
            .bind(item_index)
            .bind(ServiceRequestStatus::Failed.id())
            .bind(error_message)
            .bind(&UNRESOLVED_STATUSES[..])
            .fetch_all(executor)
            .await
    }

    /// Fail every unresolved request of the given tasks.
    pub async fn fail_unresolved_for_tasks<'e>(
        executor: impl PgExecutor<'e>,
        task_ids: &[String],
        reason: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE service_requests SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE task_id = ANY($1) AND status_id = ANY($4)",
        )
        .bind(task_ids)
        .bind(ServiceRequestStatus::Failed.id())
        .bind(reason)
        .bind(&UNRESOLVED_STATUSES[..])
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
