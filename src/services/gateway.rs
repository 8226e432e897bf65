use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::SubmitJobResponse;
use crate::models::job::{JobMessage, JobRecord, SubmitJobRequest};
use crate::services::identity::Caller;
use crate::services::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("failed to record job: {0}")]
    Store(#[from] StateError),

    #[error("failed to encode queue message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Admit a job: record it durably as PENDING, then publish its queue message.
///
/// The state record and the outbox copy of the message are written together
/// before anything is published, so every queued message has a record. If
/// publishing fails the job still stands; the reconciliation sweep enqueues
/// it from the outbox later.
pub async fn submit_job(
    state: &AppState,
    caller: &Caller,
    request: SubmitJobRequest,
) -> Result<SubmitJobResponse, SubmitError> {
    request
        .validate()
        .map_err(|report| SubmitError::Invalid(report.to_string()))?;

    let SubmitJobRequest {
        name: Some(name),
        action: Some(action),
        context1: Some(context1),
        context2: Some(context2),
    } = request
    else {
        return Err(SubmitError::Invalid("missing required field".to_string()));
    };

    let job_id = Uuid::new_v4();
    let record = JobRecord::pending(job_id, &caller.user_id, &name, &action, state.clock.now());
    let payload = JobMessage {
        job_id,
        name: Some(name),
        action,
        context1,
        context2,
        user_id: caller.user_id.clone(),
    }
    .encode()?;

    state.jobs.create(&record, &payload).await?;
    metrics::counter!("jobs_submitted_total").increment(1);

    match state.queue.enqueue(&payload).await {
        Ok(()) => {
            tracing::info!(job_id = %job_id, user_id = %caller.user_id, "Job queued");
            if let Err(e) = state.jobs.clear_outbox(job_id).await {
                // A leftover outbox row only causes a harmless republish.
                tracing::warn!(job_id = %job_id, error = %e, "Failed to clear outbox row");
            }
        }
        Err(e) => {
            metrics::counter!("jobs_enqueue_failures_total").increment(1);
            tracing::warn!(
                job_id = %job_id,
                error = %e,
                "Enqueue failed after state write; leaving job for reconciliation"
            );
        }
    }

    Ok(SubmitJobResponse {
        job_id,
        status: record.status,
    })
}
