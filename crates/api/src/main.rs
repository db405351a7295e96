use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orch_api::config::{ServerConfig, StoreBackend, TransportMode};
use orch_api::ingress::{Ingress, SubmissionConsumer};
use orch_api::router::build_app_router;
use orch_api::state::AppState;
use orch_db::store::{MemoryTaskStore, PgTaskStore, TaskStore};
use orch_events::{EventBus, EventLog, QueueConfig, TaskQueue};
use orch_pipeline::{Coordinator, EngineConfig};
use orch_services::{HttpServiceClient, ServicesConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orch_api=debug,orch_pipeline=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let services_config = ServicesConfig::from_env();
    let engine_config = EngineConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        transport = %config.transport_mode,
        max_concurrent_calls = engine_config.max_concurrent_calls,
        "Loaded configuration",
    );

    // --- Task store ---
    let store: Arc<dyn TaskStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set when STORE_BACKEND=postgres");

            let pool = orch_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            orch_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            orch_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database ready, migrations applied");

            Arc::new(PgTaskStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory task store; task state will not survive a restart");
            Arc::new(MemoryTaskStore::new())
        }
    };

    // --- Downstream services ---
    let client = HttpServiceClient::new(&services_config).expect("Failed to build HTTP client");
    for endpoint in client.registry().endpoints() {
        tracing::info!(service = %endpoint.kind, url = %endpoint.url, "Registered downstream service");
    }

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let log_cancel = CancellationToken::new();
    let log_handle = tokio::spawn(EventLog::run(event_bus.subscribe(), log_cancel.clone()));

    // --- Coordinator + recovery (before any ingress) ---
    let coordinator = Coordinator::new(
        Arc::clone(&store),
        Arc::new(client),
        Arc::clone(&event_bus),
        &engine_config,
    );
    let report = coordinator
        .recover()
        .await
        .expect("Startup recovery failed");
    tracing::info!(
        failed = report.failed.len(),
        resumed = report.resumed.len(),
        "Recovered state from previous run",
    );

    // --- Ingress transport ---
    let consumer_cancel = CancellationToken::new();
    let (ingress, consumer_handle) = match config.transport_mode {
        TransportMode::Direct => (Ingress::direct(Arc::clone(&coordinator)), None),
        TransportMode::Queue => {
            let queue = Arc::new(TaskQueue::new(QueueConfig::default()));
            let consumer = Arc::new(SubmissionConsumer::new(Arc::clone(&coordinator)));
            let handle = tokio::spawn({
                let queue = Arc::clone(&queue);
                let cancel = consumer_cancel.clone();
                async move {
                    if let Err(e) = queue.run(consumer, cancel).await {
                        tracing::error!(error = %e, "Task queue consumer failed");
                    }
                }
            });
            (Ingress::queued(Arc::clone(&coordinator), queue), Some(handle))
        }
    };

    // --- App state ---
    let state = AppState {
        store,
        coordinator: Arc::clone(&coordinator),
        ingress: Arc::new(ingress),
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    // Stop the queue consumer first; it hands buffered messages over once.
    consumer_cancel.cancel();
    if let Some(handle) = consumer_handle {
        let _ = tokio::time::timeout(grace, handle).await;
        tracing::info!("Task queue consumer stopped");
    }

    coordinator.shutdown(grace).await;

    log_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), log_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
