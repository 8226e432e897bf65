use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use jobflow::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::{
        clock::SystemClock, identity::JwtIdentity, queue::RedisWorkQueue, state::PgJobStore,
        storage::S3ArtifactStore,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");
    let jwt_secret = config
        .jwt_secret
        .as_deref()
        .expect("JWT_SECRET must be set for the API server");

    tracing::info!("Initializing jobflow API server");

    let prometheus_handle =
        routes::metrics::install_recorder().expect("Failed to install Prometheus metrics recorder");

    // Initialize state store
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::connect(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::migrate(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize artifact store
    tracing::info!("Initializing artifact storage client");
    let artifacts = S3ArtifactStore::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
    )
    .expect("Failed to initialize artifact store");

    // Initialize work queue
    tracing::info!("Connecting to Redis work queue");
    let queue = RedisWorkQueue::new(
        &config.redis_url,
        &config.queue_name,
        Duration::from_secs(config.visibility_timeout_secs),
    )
    .expect("Failed to initialize work queue");

    let identity = Arc::new(JwtIdentity::new(jwt_secret, config.jwt_issuer.as_deref()));

    let state = AppState::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(artifacts),
        Arc::new(queue),
        Arc::new(SystemClock),
        config.pipeline_settings(),
    );

    let app = routes::build_router(state, identity, Some(prometheus_handle));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}
