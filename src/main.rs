use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use background_agents::api::{AppState, task_routes};
use background_agents::clock::SystemClock;
use background_agents::config::CoordinatorConfig;
use background_agents::coordinator::{self, Coordinator};
use background_agents::engine::DetachedEngine;
use background_agents::schedule::StandardCron;
use background_agents::store::{InMemoryTaskStore, TaskStore};
use background_agents::stream::{BroadcastTransport, StreamMultiplexer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CoordinatorConfig::from_env()?;

    eprintln!("Background agents v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/api/tasks", config.bind_addr);
    eprintln!("   Stream: ws://{}/ws/tasks/stream", config.bind_addr);

    // ── Store ───────────────────────────────────────────────────────────
    let store: Arc<dyn TaskStore> = match &config.tasks_file {
        Some(path) => {
            eprintln!("   Tasks file: {}", path.display());
            Arc::new(InMemoryTaskStore::from_json_file(path).await?)
        }
        None => Arc::new(InMemoryTaskStore::new()),
    };

    // ── Coordinator ─────────────────────────────────────────────────────
    let coordinator = Arc::new(Coordinator::new(
        store,
        Arc::new(DetachedEngine),
        Arc::new(StandardCron),
        Arc::new(SystemClock),
    ));
    let loaded = coordinator.load().await?;
    eprintln!("   Tasks loaded: {loaded}");

    // ── Streaming ───────────────────────────────────────────────────────
    let transport = Arc::new(BroadcastTransport::new(config.broadcast_capacity));
    let multiplexer = StreamMultiplexer::new(transport, config.stream_channel.clone());
    let reconciler = coordinator::spawn_outcome_reconciler(Arc::clone(&coordinator), &multiplexer);

    // ── Scheduler ───────────────────────────────────────────────────────
    let _ticker = coordinator::spawn_scheduler_ticker(
        Arc::clone(&coordinator),
        config.poll_interval,
        config.max_concurrent_runs,
    );
    eprintln!(
        "   Scheduler: every {}s, max {} concurrent",
        config.poll_interval.as_secs(),
        config.max_concurrent_runs,
    );

    // ── HTTP / WebSocket ────────────────────────────────────────────────
    let app = task_routes(AppState::new(Arc::clone(&coordinator), multiplexer))
        .layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Background agent server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    reconciler.shutdown();
    Ok(())
}
