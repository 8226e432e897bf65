use axum::routing::{get, post};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::services::identity::IdentityResolver;

pub mod auth;
pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;

/// Build the HTTP surface. `/job` and `/jobs` require a resolved caller.
pub fn build_router(
    state: AppState,
    identity: Arc<dyn IdentityResolver>,
    prometheus: Option<Arc<PrometheusHandle>>,
) -> Router {
    let auth_state = auth::AuthState { identity };

    let protected = Router::new()
        .route("/job", post(jobs::submit_job).get(jobs::get_job))
        .route("/jobs", get(jobs::list_jobs))
        .route_layer(middleware::from_fn_with_state(auth_state, auth::require_caller));

    let mut app = Router::new()
        .merge(protected)
        .route("/ping", get(health::ping))
        .route("/health", get(health::health_check))
        .with_state(state);

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        );
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB limit
}
