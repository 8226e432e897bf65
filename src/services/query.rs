use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{JobListResponse, JobView};
use crate::models::job::DayRange;
use crate::services::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("job not found")]
    NotFound,

    #[error("state store: {0}")]
    Store(#[from] StateError),
}

/// Look up one job. A job with an artifact gets a freshly signed link.
///
/// If signing fails the view is still returned, without `presigned_url`.
pub async fn get_job(state: &AppState, job_id: &str) -> Result<JobView, QueryError> {
    // Anything that is not a job id cannot name a job.
    let job_id = Uuid::parse_str(job_id).map_err(|_| QueryError::NotFound)?;
    let record = state.jobs.get(job_id).await?.ok_or(QueryError::NotFound)?;

    let mut view = JobView::from(record);
    if let Some(key) = view.artifact_key.as_deref() {
        match state.artifacts.presign_get(key, state.settings.link_ttl).await {
            Ok(url) => view.presigned_url = Some(url),
            Err(e) => {
                metrics::counter!("signed_link_failures_total").increment(1);
                tracing::warn!(
                    job_id = %job_id,
                    artifact_key = %key,
                    error = %e,
                    "Failed to sign artifact link, omitting it"
                );
            }
        }
    }

    Ok(view)
}

/// Jobs of `user_id` created within `day`, newest first. No links are signed.
pub async fn list_jobs(
    state: &AppState,
    user_id: &str,
    day: DayRange,
) -> Result<JobListResponse, QueryError> {
    let jobs: Vec<JobView> = state
        .jobs
        .list_for_user(user_id, &day)
        .await?
        .into_iter()
        .map(JobView::from)
        .collect();

    Ok(JobListResponse {
        count: jobs.len(),
        jobs,
        date: day.date,
    })
}
