//! Integration tests for `/api/orchestrate` and `/api/tasks`.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_json, wait_terminal};
use orch_api::config::TransportMode;
use orch_core::compute::ServiceKind;
use orch_db::models::status::TaskStatus;
use orch_db::store::TaskStore;
use orch_services::stub::StubReply;
use serde_json::{json, Value};

fn request(task_id: &str, scenario_id: &str) -> Value {
    json!({
        "task_id": task_id,
        "task_name": "Quarterly forecast",
        "task_description": "revenue + rebates + specialty",
        "compute": [{
            "scenario_id": scenario_id,
            "business_type_id": "retail",
            "revenue": { "period": "2026-Q1" },
            "rebates": { "tier": 2 },
            "specialty": { "channel": "online" },
        }],
    })
}

// ---------------------------------------------------------------------------
// Test: POST /api/orchestrate accepts and the task completes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrate_accepts_and_task_completes() {
    let t = build_test_app(TransportMode::Direct);
    let response = post_json(&t.app, "/api/orchestrate", request("api-1", "s1")).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["task_id"], "api-1");
    assert_eq!(json["status"], "accepted");
    assert!(json["message"].is_string());

    wait_terminal(&t.store, "api-1").await;
    let detail = body_json(get(&t.app, "/api/tasks/api-1").await).await;
    assert_eq!(detail["data"]["status"], "COMPLETED");
    assert_eq!(detail["data"]["name"], "Quarterly forecast");
    assert_eq!(detail["data"]["items"].as_array().unwrap().len(), 1);
    let requests = detail["data"]["service_requests"].as_array().unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r["status"] == "COMPLETED"));
}

// ---------------------------------------------------------------------------
// Test: a task id is generated when absent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrate_generates_task_id() {
    let t = build_test_app(TransportMode::Direct);
    let mut body = request("unused", "s1");
    body.as_object_mut().unwrap().remove("task_id");

    let json = body_json(post_json(&t.app, "/api/orchestrate", body).await).await;
    let task_id = json["task_id"].as_str().unwrap();
    assert_eq!(task_id.len(), 36);
    assert!(t.store.get_task(task_id).await.is_ok());
}

// ---------------------------------------------------------------------------
// Test: validation errors return 400 and create nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrate_rejects_invalid_request() {
    let t = build_test_app(TransportMode::Direct);
    let body = json!({ "task_id": "bad", "task_name": "empty", "compute": [] });

    let response = post_json(&t.app, "/api/orchestrate", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let response = get(&t.app, "/api/tasks/bad").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn orchestrate_rejects_item_without_services() {
    let t = build_test_app(TransportMode::Direct);
    let body = json!({
        "task_name": "no services",
        "compute": [{ "scenario_id": "s1", "business_type_id": "b1" }],
    });

    let response = post_json(&t.app, "/api/orchestrate", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: resubmitting a known task id does not run it again
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrate_duplicate_returns_existing_status() {
    let t = build_test_app(TransportMode::Direct);
    post_json(&t.app, "/api/orchestrate", request("api-dup", "s1")).await;
    wait_terminal(&t.store, "api-dup").await;

    let response = post_json(&t.app, "/api/orchestrate", request("api-dup", "s1")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "duplicate");
    assert!(json["message"].as_str().unwrap().contains("COMPLETED"));
    assert_eq!(t.stub.call_count().await, 3);
}

// ---------------------------------------------------------------------------
// Test: a store outage is reported as 503 and nothing is accepted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrate_store_outage_returns_503() {
    let t = build_test_app(TransportMode::Direct);
    t.store.fail_writes(true);

    let response = post_json(&t.app, "/api/orchestrate", request("api-down", "s1")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "STORE_UNAVAILABLE");

    t.store.fail_writes(false);
    assert!(t.store.get_task("api-down").await.is_err());
}

// ---------------------------------------------------------------------------
// Test: direct endpoint waits for the result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrate_direct_returns_finished_task() {
    let t = build_test_app(TransportMode::Direct);
    t.stub
        .script(
            ServiceKind::Rebates,
            "s-direct",
            [StubReply::Permanent("tier not offered".into())],
        )
        .await;

    let response = post_json(
        &t.app,
        "/api/orchestrate/direct",
        request("api-direct", "s-direct"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["task_id"], "api-direct");
    assert_eq!(json["data"]["status"], "FAILED");
    assert!(json["data"]["error_message"]
        .as_str()
        .unwrap()
        .contains("tier not offered"));
    let rebates = json["data"]["service_requests"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["service_name"] == "rebates")
        .unwrap()
        .clone();
    assert_eq!(rebates["status"], "FAILED");
}

// ---------------------------------------------------------------------------
// Test: queue transport
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_transport_delivers_to_coordinator() {
    let t = build_test_app(TransportMode::Queue);
    let response = post_json(&t.app, "/api/orchestrate", request("api-q", "s1")).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "accepted");

    wait_terminal(&t.store, "api-q").await;
    assert_eq!(
        t.store.get_task("api-q").await.unwrap().status,
        TaskStatus::Completed
    );

    let health = body_json(get(&t.app, "/health").await).await;
    assert_eq!(health["queue"]["published"], 1);
    assert_eq!(health["queue"]["acked"], 1);
}

// ---------------------------------------------------------------------------
// Test: task listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_tasks_filters_by_status() {
    let t = build_test_app(TransportMode::Direct);
    t.stub
        .script(ServiceKind::Revenue, "s-bad", [StubReply::Permanent("no".into())])
        .await;

    post_json(&t.app, "/api/orchestrate", request("api-good", "s-good")).await;
    post_json(&t.app, "/api/orchestrate", request("api-bad", "s-bad")).await;
    wait_terminal(&t.store, "api-good").await;
    wait_terminal(&t.store, "api-bad").await;

    let all = body_json(get(&t.app, "/api/tasks").await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let failed = body_json(get(&t.app, "/api/tasks?status=FAILED").await).await;
    let failed = failed["data"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["task_id"], "api-bad");

    let page = body_json(get(&t.app, "/api/tasks?limit=1").await).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn get_unknown_task_returns_404() {
    let t = build_test_app(TransportMode::Direct);
    let response = get(&t.app, "/api/tasks/nope").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}
