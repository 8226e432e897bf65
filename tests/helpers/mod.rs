//! Shared test helpers: an in-memory pipeline harness and HTTP client helpers.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use jobflow::{
    app_state::AppState,
    config::PipelineSettings,
    models::api::{JobView, SubmitJobResponse},
    models::job::SubmitJobRequest,
    services::{
        clock::ManualClock,
        identity::{AccessClaims, Caller},
        queue::MemoryWorkQueue,
        state::MemoryJobStore,
        storage::MemoryArtifactStore,
    },
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub const JWT_SECRET: &str = "jobflow-test-secret";

/// In-memory stores wired into an [`AppState`], with handles kept for inspection.
pub struct Harness {
    pub state: AppState,
    pub jobs: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryWorkQueue>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Redelivery is immediate and messages dead-letter on their third receive.
    pub fn new() -> Self {
        Self::with_settings(
            PipelineSettings {
                max_receive_count: 3,
                poll_interval: Duration::from_millis(10),
                ..PipelineSettings::default()
            },
            Duration::ZERO,
        )
    }

    pub fn with_settings(settings: PipelineSettings, visibility_timeout: Duration) -> Self {
        let jobs = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryWorkQueue::new(visibility_timeout));
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let clock = Arc::new(ManualClock::new(start_of_test()));
        let state = AppState::new(
            jobs.clone(),
            artifacts.clone(),
            queue.clone(),
            clock.clone(),
            settings,
        );
        Self {
            state,
            jobs,
            queue,
            artifacts,
            clock,
        }
    }
}

pub fn start_of_test() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

pub fn caller(user_id: &str) -> Caller {
    Caller {
        user_id: user_id.to_string(),
    }
}

pub fn request(name: &str, action: &str, context1: &str, context2: &str) -> SubmitJobRequest {
    SubmitJobRequest {
        name: Some(name.to_string()),
        action: Some(action.to_string()),
        context1: Some(context1.to_string()),
        context2: Some(context2.to_string()),
    }
}

/// HS256 token for `user_id`, valid for ten minutes.
pub fn mint_token(secret: &str, user_id: &str) -> String {
    let claims = AccessClaims {
        sub: user_id.to_string(),
        exp: Utc::now().timestamp() + 600,
        iss: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// POST /job
pub async fn submit_job(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    body: &serde_json::Value,
) -> Result<SubmitJobResponse, Box<dyn std::error::Error + Send + Sync>> {
    let response = client
        .post(format!("{}/job", base_url))
        .bearer_auth(token)
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::CREATED {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitJobResponse>().await?)
}

/// Poll GET /job until the job leaves PENDING (with timeout).
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    job_id: &str,
    timeout_secs: u64,
) -> Result<JobView, Box<dyn std::error::Error + Send + Sync>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{}/job", base_url))
            .query(&[("job_id", job_id)])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let view = response.json::<JobView>().await?;
        if view.status.is_terminal() {
            return Ok(view);
        }
        sleep(Duration::from_millis(500)).await;
    }

    Err(format!("Job did not finish within {} seconds", timeout_secs).into())
}
