use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobRecord, JobStatus};

/// Response after submitting a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Query string of `GET /job`.
#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub job_id: Option<String>,
}

/// Caller-facing view of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "artifactKey", skip_serializing_if = "Option::is_none")]
    pub artifact_key: Option<String>,
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presigned_url: Option<String>,
}

impl From<JobRecord> for JobView {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            created_at: record.created_at,
            action: record.action,
            name: Some(record.name),
            artifact_key: record.artifact_key,
            completed_at: record.completed_at,
            error: record.error,
            presigned_url: None,
        }
    }
}

/// Response of `GET /jobs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobView>,
    pub count: usize,
    pub date: NaiveDate,
}

/// Response of `GET /ping`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub message: String,
}
