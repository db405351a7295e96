//! Read-only task queries.

use axum::extract::{Path, Query, State};
use axum::Json;
use orch_db::models::task::{Task, TaskDetail, TaskListQuery};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/tasks
///
/// Newest first. Optional `status`, `limit` (default 50, max 100), `offset`.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<Json<DataResponse<Vec<Task>>>> {
    let tasks = state.store.list_tasks(&query).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/tasks/{task_id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<TaskDetail>>> {
    let detail = state.store.get_task_detail(&task_id).await?;
    Ok(Json(DataResponse { data: detail }))
}
