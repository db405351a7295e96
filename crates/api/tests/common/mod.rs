#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use orch_api::config::{ServerConfig, StoreBackend, TransportMode};
use orch_api::ingress::{Ingress, SubmissionConsumer};
use orch_api::router::build_app_router;
use orch_api::state::AppState;
use orch_db::store::{MemoryTaskStore, TaskStore};
use orch_events::{EventBus, QueueConfig, TaskQueue};
use orch_pipeline::{Coordinator, EngineConfig};
use orch_services::stub::StubServiceClient;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(transport_mode: TransportMode) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        transport_mode,
        store_backend: StoreBackend::Memory,
        database_url: None,
    }
}

/// A running application over the in-memory store and the service stub.
pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryTaskStore>,
    pub stub: Arc<StubServiceClient>,
    pub coordinator: Arc<Coordinator>,
    /// Stops the queue consumer when dropped.
    _consumer: Option<tokio_util::sync::DropGuard>,
}

pub fn build_test_app(transport_mode: TransportMode) -> TestApp {
    let config = test_config(transport_mode);
    let store = Arc::new(MemoryTaskStore::new());
    let stub = Arc::new(StubServiceClient::new());
    let coordinator = Coordinator::new(
        store.clone(),
        stub.clone(),
        Arc::new(EventBus::default()),
        &EngineConfig::default(),
    );

    let (ingress, consumer) = match transport_mode {
        TransportMode::Direct => (Ingress::direct(coordinator.clone()), None),
        TransportMode::Queue => {
            let queue = Arc::new(TaskQueue::new(QueueConfig::default()));
            let cancel = CancellationToken::new();
            let consumer = Arc::new(SubmissionConsumer::new(coordinator.clone()));
            tokio::spawn({
                let queue = queue.clone();
                let cancel = cancel.clone();
                async move { queue.run(consumer, cancel).await }
            });
            (
                Ingress::queued(coordinator.clone(), queue),
                Some(cancel.drop_guard()),
            )
        }
    };

    let state = AppState {
        store: store.clone(),
        coordinator: coordinator.clone(),
        ingress: Arc::new(ingress),
        config: Arc::new(config.clone()),
    };

    TestApp {
        app: build_app_router(state, &config),
        store,
        stub,
        coordinator,
        _consumer: consumer,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll the store until `task_id` reaches a terminal status.
pub async fn wait_terminal(store: &MemoryTaskStore, task_id: &str) {
    let poll = async {
        loop {
            if let Ok(task) = store.get_task(task_id).await {
                if task.status.is_terminal() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .unwrap_or_else(|_| panic!("task {task_id} never reached a terminal state"));
}
