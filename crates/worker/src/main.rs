use std::sync::Arc;
use std::time::Duration;

use stencil_core::execution::PlaceholderExecutor;
use stencil_db::PgTemplateStore;
use stencil_engine::collaborators::{HttpArchiveFetcher, PgProjectLoader, PgWorkflowImporter};
use stencil_engine::{Engine, EngineDeps};
use stencil_events::{EventBus, EventLog};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{LogFormat, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env();

    // --- Tracing ---
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stencil_worker=debug,stencil_engine=debug".into()),
        )
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .init();

    tracing::info!(
        db_max_connections = config.db_max_connections,
        resume_pending_bulks = config.resume_pending_bulks,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = stencil_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");
    stencil_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    stencil_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let log_handle = tokio::spawn(EventLog::run(event_bus.subscribe()));

    // --- Engine ---
    let fetcher = HttpArchiveFetcher::new(Duration::from_secs(config.import_fetch_timeout_secs))
        .expect("Failed to build HTTP client");
    let cancel = CancellationToken::new();
    let engine = Engine::new(EngineDeps {
        store: Arc::new(PgTemplateStore::new(pool.clone())),
        executor: Arc::new(PlaceholderExecutor),
        events: Arc::clone(&event_bus),
        projects: Arc::new(PgProjectLoader::new(pool.clone())),
        importer: Arc::new(PgWorkflowImporter::new(pool.clone())),
        fetcher: Arc::new(fetcher),
        cancel: cancel.clone(),
    });

    // --- Recovery ---
    let recovered = engine
        .bulks
        .recover_interrupted()
        .await
        .expect("Failed to recover interrupted bulk operations");
    tracing::info!(recovered, "Interrupted bulk operations recovered");

    if config.resume_pending_bulks {
        let resumed = engine
            .bulks
            .resume_pending()
            .await
            .expect("Failed to resume pending bulk jobs");
        tracing::info!(resumed, "Pending bulk jobs resumed");
    }

    tokio::select! {
        _ = engine.bulks.wait_idle() => {
            tracing::info!("All bulk jobs drained");
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown requested, cancelling bulk runners");
            engine.bulks.shutdown().await;
        }
    }

    // Dropping the engine and the bus closes the channel, which stops the log.
    drop(engine);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), log_handle).await;
    pool.close().await;
    tracing::info!("Worker stopped");
}

/// Resolve on SIGINT, or SIGTERM on Unix.
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
