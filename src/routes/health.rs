use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use crate::app_state::AppState;
use crate::models::api::PingResponse;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub checks: BTreeMap<&'static str, Probe>,
}

/// Result of probing one dependency.
#[derive(Serialize)]
pub struct Probe {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn probe<E: Display>(check: impl Future<Output = Result<(), E>>) -> Probe {
    let started = Instant::now();
    match check.await {
        Ok(()) => Probe {
            healthy: true,
            latency_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => Probe {
            healthy: false,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

/// GET /ping — liveness, no dependencies touched.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        message: "ping ok".to_string(),
    })
}

/// GET /health — 200 when the state store and queue answer, 503 otherwise.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();
    checks.insert("state_store", probe(state.jobs.health_check()).await);
    checks.insert("queue", probe(state.queue.health_check()).await);

    let healthy = checks.values().all(|p| p.healthy);
    if !healthy {
        tracing::warn!("Health check degraded");
    }

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        checks,
    };

    (code, Json(response))
}
