use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prometheus scrape address of the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    /// Redis connection string for the work queue
    pub redis_url: String,

    /// Key prefix of the work queue in Redis
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Artifact bucket name
    pub s3_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    pub s3_access_key: String,

    pub s3_secret_key: String,

    /// HS256 secret for verifying caller tokens. Required by the API server only.
    pub jwt_secret: Option<String>,

    /// Expected `iss` claim, if any
    pub jwt_issuer: Option<String>,

    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Receives after which a failing message is dead-lettered
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lifetime of signed artifact links
    #[serde(default = "default_link_ttl_secs")]
    pub link_ttl_secs: u64,

    /// Age after which an unpublished outbox row is re-enqueued
    #[serde(default = "default_reconcile_after_secs")]
    pub reconcile_after_secs: u64,

    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: i64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_database_max_connections() -> u32 {
    10
}

fn default_queue_name() -> String {
    "jobflow".to_string()
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_link_ttl_secs() -> u64 {
    3600
}

fn default_reconcile_after_secs() -> u64 {
    300
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

fn default_reconcile_batch_size() -> i64 {
    100
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn worker_metrics_socket(&self) -> Result<SocketAddr, AddrParseError> {
        self.worker_metrics_addr.parse()
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            link_ttl: Duration::from_secs(self.link_ttl_secs),
            max_receive_count: self.max_receive_count.max(1),
            worker_concurrency: self.worker_concurrency.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reconcile_after: Duration::from_secs(self.reconcile_after_secs),
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            reconcile_batch_size: self.reconcile_batch_size.max(1),
        }
    }
}

/// Immutable tuning shared by the gateway, workers, query path and sweep.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub link_ttl: Duration,
    pub max_receive_count: u32,
    pub worker_concurrency: usize,
    pub poll_interval: Duration,
    pub reconcile_after: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_batch_size: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            link_ttl: Duration::from_secs(default_link_ttl_secs()),
            max_receive_count: default_max_receive_count(),
            worker_concurrency: default_worker_concurrency(),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            reconcile_after: Duration::from_secs(default_reconcile_after_secs()),
            reconcile_interval: Duration::from_secs(default_reconcile_interval_secs()),
            reconcile_batch_size: default_reconcile_batch_size(),
        }
    }
}
