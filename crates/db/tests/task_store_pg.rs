//! Integration tests for `PgTaskStore`.
//!
//! Each test gets a fresh database from `#[sqlx::test]`; they are ignored by
//! default because they need a reachable Postgres via `DATABASE_URL`.

use assert_matches::assert_matches;
use orch_core::compute::{ComputeItem, ServiceKind, TaskSubmission};
use orch_db::models::service_request::{NewServiceRequest, ServiceRequestUpdate};
use orch_db::models::status::{ServiceRequestStatus, TaskStatus};
use orch_db::models::task::TaskListQuery;
use orch_db::store::{PgTaskStore, StoreError, TaskStore};
use serde_json::json;
use sqlx::PgPool;

fn submission(task_id: &str, keys: &[(&str, &str)]) -> TaskSubmission {
    TaskSubmission {
        task_id: task_id.to_string(),
        name: "pg test".to_string(),
        description: Some("integration".to_string()),
        items: keys
            .iter()
            .map(|(s, b)| {
                ComputeItem::new(*s, *b)
                    .with_service(ServiceKind::Revenue, json!({"amount": 10}))
                    .with_service(ServiceKind::Rebates, json!({"rate": 0.1}))
            })
            .collect(),
    }
}

fn new_requests(item: &ComputeItem) -> Vec<NewServiceRequest> {
    item.services()
        .into_iter()
        .filter_map(|kind| Some(NewServiceRequest::new(kind, item.request_payload(kind)?)))
        .collect()
}

// ---------------------------------------------------------------------------
// Test: create and read back
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn create_task_persists_items(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let sub = submission("t1", &[("s1", "b1"), ("s2", "b1")]);
    let task = store.create_task(&sub).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let detail = store.get_task_detail("t1").await.unwrap();
    assert_eq!(detail.items.len(), 2);
    assert_eq!(detail.items[1].scenario_id, "s2");
    assert_eq!(detail.items[0].revenue, Some(json!({"amount": 10})));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn duplicate_task_is_rejected(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    store.create_task(&submission("t1", &[("s1", "b1")])).await.unwrap();
    let err = store
        .create_task(&submission("t1", &[("s1", "b1")]))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::DuplicateTask(_));
}

// ---------------------------------------------------------------------------
// Test: full lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn admitted_item_completes_and_finalizes(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let sub = submission("t1", &[("s1", "b1")]);
    store.create_task(&sub).await.unwrap();

    let created = store
        .admit_item("t1", 0, &new_requests(&sub.items[0]))
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(
        store.get_task("t1").await.unwrap().status,
        TaskStatus::InProgress
    );

    for request in &created {
        store
            .transition_service_request(
                request.request_id,
                ServiceRequestStatus::InProgress,
                ServiceRequestUpdate::default(),
            )
            .await
            .unwrap();
        store
            .transition_service_request(
                request.request_id,
                ServiceRequestStatus::Completed,
                ServiceRequestUpdate {
                    response_payload: Some(json!({"value": 1})),
                    attempts: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    store
        .resolve_item("t1", 0, TaskStatus::Completed, None)
        .await
        .unwrap();

    let task = store.finalize_task("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.completed_at.is_some());
    assert!(store.finalize_task("t1").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn completed_request_is_never_overwritten(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let sub = submission("t1", &[("s1", "b1")]);
    store.create_task(&sub).await.unwrap();
    let created = store
        .admit_item("t1", 0, &new_requests(&sub.items[0]))
        .await
        .unwrap();
    let id = created[0].request_id;

    store
        .transition_service_request(id, ServiceRequestStatus::InProgress, Default::default())
        .await
        .unwrap();
    store
        .transition_service_request(id, ServiceRequestStatus::Completed, Default::default())
        .await
        .unwrap();
    let err = store
        .transition_service_request(
            id,
            ServiceRequestStatus::Failed,
            ServiceRequestUpdate {
                error_message: Some("late".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::InvalidTransition { .. });
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn superseded_task_records_displacer(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    store.create_task(&submission("old", &[("s1", "b1")])).await.unwrap();
    store.supersede_item("old", 0, "new").await.unwrap();

    let task = store.finalize_task("old").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Superseded);
    assert_eq!(task.superseded_by.as_deref(), Some("new"));
}

// ---------------------------------------------------------------------------
// Test: recovery and listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn orphaned_tasks_fail(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let sub = submission("running", &[("s1", "b1")]);
    store.create_task(&sub).await.unwrap();
    store.create_task(&submission("waiting", &[("s2", "b1")])).await.unwrap();
    store
        .admit_item("running", 0, &new_requests(&sub.items[0]))
        .await
        .unwrap();

    let failed = store.fail_orphaned_tasks("recovery: test").await.unwrap();
    assert_eq!(failed, vec!["running".to_string()]);

    let detail = store.get_task_detail("running").await.unwrap();
    assert_eq!(detail.task.status, TaskStatus::Failed);
    assert!(detail
        .service_requests
        .iter()
        .all(|r| r.status == ServiceRequestStatus::Failed));

    let pending = store
        .list_task_details_by_status(TaskStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task.task_id, "waiting");
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn list_tasks_filters_by_status(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    store.create_task(&submission("a", &[("s1", "b1")])).await.unwrap();
    store.create_task(&submission("b", &[("s1", "b1")])).await.unwrap();
    store
        .transition_task("a", Some(TaskStatus::Pending), TaskStatus::Failed, Some("x"))
        .await
        .unwrap();

    let failed = store
        .list_tasks(&TaskListQuery {
            status: Some(TaskStatus::Failed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].task_id, "a");
    assert_eq!(failed[0].error_message.as_deref(), Some("x"));
}
