//! Repository for the `tasks` table.

use sqlx::PgExecutor;

use crate::models::status::{StatusId, TaskStatus};
use crate::models::task::{Task, TaskListQuery};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    task_id, name, description, status_id, superseded_by, error_message, \
    created_at, updated_at, started_at, completed_at";

/// Statuses a task can still leave.
const OPEN_STATUSES: [StatusId; 2] = [
    TaskStatus::Pending as StatusId,
    TaskStatus::InProgress as StatusId,
];

/// Provides queries for orchestration tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new PENDING task. Returns `None` if the id already exists.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (task_id, name, description, status_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (task_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(name)
            .bind(description)
            .bind(TaskStatus::Pending.id())
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE task_id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .fetch_optional(executor)
            .await
    }

    /// Load a task and lock its row until the surrounding transaction ends.
    pub async fn find_for_update<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE task_id = $1 FOR UPDATE");
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .fetch_optional(executor)
            .await
    }

    /// List tasks newest first with optional status filter.
    pub async fn list<'e>(
        executor: impl PgExecutor<'e>,
        params: &TaskListQuery,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
             ORDER BY created_at DESC, task_id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(params.status.map(TaskStatus::id))
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(executor)
            .await
    }

    /// All tasks in `status`, oldest first.
    pub async fn list_by_status<'e>(
        executor: impl PgExecutor<'e>,
        status: TaskStatus,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks WHERE status_id = $1 \
             ORDER BY created_at ASC, task_id ASC"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(status.id())
            .fetch_all(executor)
            .await
    }

    /// Move a task from `from` to `to`. Returns `None` if the task was not in
    /// `from` (lost a race, or already terminal).
    ///
    /// Sets `started_at` on the first move to IN_PROGRESS and `completed_at`
    /// on any terminal move. A non-null `error_message` replaces the stored one.
    pub async fn update_status<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET \
                 status_id = $3, \
                 error_message = COALESCE($4, error_message), \
                 started_at = CASE WHEN $3 = $5 THEN COALESCE(started_at, NOW()) ELSE started_at END, \
                 completed_at = CASE WHEN $6 THEN NOW() ELSE completed_at END \
             WHERE task_id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(from.id())
            .bind(to.id())
            .bind(error_message)
            .bind(TaskStatus::InProgress.id())
            .bind(to.is_terminal())
            .fetch_optional(executor)
            .await
    }

    /// Record `message` as the task error unless one is already set or the
    /// task is terminal. Returns whether the row changed.
    pub async fn set_error_if_absent<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET error_message = $2 \
             WHERE task_id = $1 AND error_message IS NULL AND status_id = ANY($3)",
        )
        .bind(task_id)
        .bind(message)
        .bind(&OPEN_STATUSES[..])
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write the terminal outcome of a still-open task. `fallback_error` only
    /// fills an empty `error_message`.
    pub async fn finalize<'e>(
        executor: impl PgExecutor<'e>,
        task_id: &str,
        status: TaskStatus,
        superseded_by: Option<&str>,
        fallback_error: Option<&str>,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET \
                 status_id = $2, \
                 superseded_by = $3, \
                 error_message = COALESCE(error_message, $4), \
                 completed_at = NOW() \
             WHERE task_id = $1 AND status_id = ANY($5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(status.id())
            .bind(superseded_by)
            .bind(fallback_error)
            .bind(&OPEN_STATUSES[..])
            .fetch_optional(executor)
            .await
    }

    /// Fail every IN_PROGRESS task with `reason`. Returns the affected ids.
    pub async fn fail_in_progress<'e>(
        executor: impl PgExecutor<'e>,
        reason: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "UPDATE tasks SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE status_id = $1 \
             RETURNING task_id",
        )
        .bind(TaskStatus::InProgress.id())
        .bind(TaskStatus::Failed.id())
        .bind(reason)
        .fetch_all(executor)
        .await
    }
}
