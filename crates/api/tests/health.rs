//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get};
use orch_api::config::TransportMode;

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let t = build_test_app(TransportMode::Direct);
    let response = get(&t.app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["transport_mode"], "direct");
    assert_eq!(json["store_healthy"], true);
    assert_eq!(json["active_keys"], 0);
    assert!(json.get("queue").is_none());
}

// ---------------------------------------------------------------------------
// Test: health reports a degraded store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_reports_degraded_store() {
    let t = build_test_app(TransportMode::Direct);
    t.store.fail_writes(true);

    let json = body_json(get(&t.app, "/health").await).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["store_healthy"], false);
}

// ---------------------------------------------------------------------------
// Test: queue transport exposes queue counters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_includes_queue_stats_in_queue_mode() {
    let t = build_test_app(TransportMode::Queue);
    let json = body_json(get(&t.app, "/health").await).await;

    assert_eq!(json["transport_mode"], "queue");
    assert_eq!(json["queue"]["published"], 0);
    assert_eq!(json["queue"]["dead_lettered"], 0);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let t = build_test_app(TransportMode::Direct);
    let response = get(&t.app, "/this-route-does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let t = build_test_app(TransportMode::Direct);
    let response = get(&t.app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}
