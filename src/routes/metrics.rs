use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;

/// Install the Prometheus recorder and register pipeline metric descriptions.
pub fn install_recorder() -> Result<Arc<PrometheusHandle>, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(Arc::new(handle))
}

/// Install the recorder behind its own scrape listener. Used by the worker,
/// which serves no HTTP routes.
pub fn install_listener(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    Ok(())
}

pub fn describe_metrics() {
    metrics::describe_counter!("jobs_submitted_total", "Jobs admitted by the gateway");
    metrics::describe_counter!(
        "jobs_enqueue_failures_total",
        "Submissions whose queue publish failed after the state write"
    );
    metrics::describe_counter!("jobs_completed_total", "Jobs moved to COMPLETE");
    metrics::describe_counter!(
        "jobs_duplicate_deliveries_total",
        "Deliveries acknowledged as no-ops because the job was already terminal"
    );
    metrics::describe_counter!("jobs_retried_total", "Deliveries left for redelivery");
    metrics::describe_counter!("jobs_dead_lettered_total", "Messages moved to the dead-letter list");
    metrics::describe_counter!("jobs_reconciled_total", "Outbox messages re-enqueued by the sweep");
    metrics::describe_counter!(
        "signed_link_failures_total",
        "Reads of complete jobs whose artifact link could not be signed"
    );
    metrics::describe_histogram!("job_processing_seconds", "Time to process one delivery");
    metrics::describe_gauge!("jobs_queue_depth", "Messages waiting or in flight");
}

/// GET /metrics — Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
