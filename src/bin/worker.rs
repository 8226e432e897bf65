use jobflow::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::{
        clock::SystemClock, queue::RedisWorkQueue, reconcile, state::PgJobStore,
        storage::S3ArtifactStore, worker,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting jobflow worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr = config
        .worker_metrics_socket()
        .expect("WORKER_METRICS_ADDR must be a socket address");
    routes::metrics::install_listener(metrics_addr)
        .expect("Failed to install Prometheus metrics listener");
    tracing::info!(addr = %metrics_addr, "Serving worker metrics");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::connect(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let artifacts = S3ArtifactStore::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize artifact store");

    let queue = RedisWorkQueue::new(
        &config.redis_url,
        &config.queue_name,
        Duration::from_secs(config.visibility_timeout_secs),
    )
    .expect("Failed to initialize work queue");

    let state = AppState::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(artifacts),
        Arc::new(queue),
        Arc::new(SystemClock),
        config.pipeline_settings(),
    );

    let shutdown = CancellationToken::new();
    let pool = tokio::spawn(worker::run_pool(state.clone(), shutdown.clone()));
    let sweep = tokio::spawn(reconcile::run(state, shutdown.clone()));

    tracing::info!("Worker ready, processing jobs");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, finishing in-flight messages");
    shutdown.cancel();

    for (name, handle) in [("worker pool", pool), ("reconciliation sweep", sweep)] {
        if let Err(e) = handle.await {
            tracing::error!(task = name, error = %e, "Background task failed");
        }
    }
}
