//! Repository for the `compute_items` table.

use orch_core::compute::ComputeItem;
use sqlx::PgExecutor;

use crate::models::status::{StatusId, TaskStatus};
use crate::models::task::ComputeItemRecord;

/// Column list for `compute_items` queries.
const COLUMNS: &str = "\
    task_id, item_index, scenario_id, business_type_id, status_id, \
    superseded_by, error_message, revenue, rebates, specialty, \
    created_at, updated_at";

const TERMINAL_STATUSES: [StatusId; 3] = [
    TaskStatus::Completed as StatusId,
    TaskStatus::Failed as StatusId,
    TaskStatus::Superseded as StatusId,
];

/// Provides queries for the compute items of a task.
pub struct ComputeItemRepo;

impl ComputeItemRepo {
    /// Insert item `item_index` of a task in PENDING.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        item_index: i32,
        item: &ComputeItem,
    ) -> Result<ComputeItemRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO compute_items \
                 (task_id, item_index, scenario_id, business_type_id, status_id, \
                  revenue, rebates, specialty) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ComputeItemRecord>(&query)
            .bind(task_id)
            .bind(item_index)
            .bind(&item.scenario_id)
            .bind(&item.business_type_id)
            .bind(TaskStatus::Pending.id())
            .bind(&item.revenue)
            .bind(&item.rebates)
            .bind(&item.specialty)
            .fetch_one(executor)
            .await
    }

    /// All items of a task in submission order.
    pub async fn list_by_task<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
    ) -> Result<Vec<ComputeItemRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM compute_items WHERE task_id = $1 ORDER BY item_index"
        );
        sqlx::query_as::<_, ComputeItemRecord>(&query)
            .bind(task_id)
            .fetch_all(executor)
            .await
    }

    /// Load one item and lock its row.
    pub async fn find_for_update<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        item_index: i32,
    ) -> Result<Option<ComputeItemRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM compute_items \
             WHERE task_id = $1 AND item_index = $2 FOR UPDATE"
        );
        sqlx::query_as::<_, ComputeItemRecord>(&query)
            .bind(task_id)
            .bind(item_index)
            .fetch_optional(executor)
            .await
    }

    /// Move an item from `from` to `to`. Returns `None` if it was not in `from`.
    pub async fn update_status<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        item_index: i32,
        from: TaskStatus,
        to: TaskStatus,
        superseded_by: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Option<ComputeItemRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE compute_items SET \
                 status_id = $4, \
                 superseded_by = COALESCE($5, superseded_by), \
                 error_message = COALESCE($6, error_message) \
             WHERE task_id = $1 AND item_index = $2 AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ComputeItemRecord>(&query)
            .bind(task_id)
            .bind(item_index)
            .bind(from.id())
            .bind(to.id())
            .bind(superseded_by)
            .bind(error_message)
            .fetch_optional(executor)
            .await
    }

    /// Fail every non-terminal item of the given tasks.
    pub async fn fail_unresolved_for_tasks<'e>(
        executor: impl PgExecutor<'e>,
        task_ids: &[String],
        reason: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE compute_items SET status_id = $2, error_message = $3 \
             WHERE task_id = ANY($1) AND NOT (status_id = ANY($4))",
        )
        .bind(task_ids)
        .bind(TaskStatus::Failed.id())
        .bind(reason)
        .bind(&TERMINAL_STATUSES[..])
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
