use chrono::NaiveDate;
use std::time::Instant;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobMessage, JobRecord, JobStatus};
use crate::services::queue::{Delivery, QueueError};
use crate::services::state::{StateError, Transition};
use crate::services::storage::StorageError;

const ARTIFACT_CONTENT_TYPE: &str = "text/plain";

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// This delivery moved the job to COMPLETE; the message was acknowledged.
    Completed { job_id: Uuid, artifact_key: String },
    /// The job was already COMPLETE; the message was acknowledged as a no-op.
    Duplicate { job_id: Uuid, status: JobStatus },
    /// Left unacknowledged for redelivery after the visibility timeout.
    Retry { reason: String },
    /// Moved to the dead-letter list after exhausting receives, or because
    /// its job had already FAILED.
    DeadLettered { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("unparseable message: {0}")]
    Poison(#[from] serde_json::Error),

    #[error("no state record for job {0}")]
    MissingRecord(Uuid),

    #[error("state store: {0}")]
    State(#[from] StateError),

    #[error("artifact store: {0}")]
    Storage(#[from] StorageError),
}

enum Handled {
    Completed(Uuid, String),
    Duplicate(Uuid, JobStatus),
}

/// Artifact key: `{user_id}/{YYYY-MM-DD}/{job_id}`.
pub fn artifact_key(user_id: &str, date: NaiveDate, job_id: Uuid) -> String {
    format!("{}/{}/{}", user_id, date.format("%Y-%m-%d"), job_id)
}

/// Artifact body. A pure function of the message and record, so a
/// redelivered message rewrites byte-identical content.
///
/// The timestamp line carries the job's `created_at`, not the processing
/// instant; the processing instant is recorded as `completed_at`.
pub fn render_artifact(message: &JobMessage, record: &JobRecord) -> String {
    format!(
        "async job framework processed job {}\nJob accepted at {}\n{}\n{}\n",
        record.job_id,
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        message.context1,
        message.context2,
    )
}

/// Process one delivery and settle it with the queue.
///
/// The message is acknowledged only after the COMPLETE transition (or an
/// already COMPLETE record) is confirmed. Messages of FAILED jobs go to the
/// dead-letter list. Failures leave it in flight so the
/// visibility timeout redelivers it; once `receive_count` reaches the
/// configured maximum it is dead-lettered instead.
pub async fn process_delivery(state: &AppState, delivery: Delivery) -> Result<Outcome, QueueError> {
    let started = Instant::now();

    match handle(state, &delivery).await {
        Ok(Handled::Completed(job_id, artifact_key)) => {
            state.queue.ack(&delivery).await?;
            metrics::counter!("jobs_completed_total").increment(1);
            metrics::histogram!("job_processing_seconds").record(started.elapsed().as_secs_f64());
            tracing::info!(
                job_id = %job_id,
                artifact_key = %artifact_key,
                receive_count = delivery.receive_count,
                "Job completed"
            );
            Ok(Outcome::Completed {
                job_id,
                artifact_key,
            })
        }
        Ok(Handled::Duplicate(job_id, JobStatus::Failed)) => {
            // A FAILED job's message belongs on the dead-letter list, even when
            // an earlier attempt to move it there did not go through.
            let reason = format!("job {job_id} already FAILED");
            move_to_dead_letter(state, &delivery, reason).await
        }
        Ok(Handled::Duplicate(job_id, status)) => {
            state.queue.ack(&delivery).await?;
            metrics::counter!("jobs_duplicate_deliveries_total").increment(1);
            tracing::info!(
                job_id = %job_id,
                status = %status,
                receive_count = delivery.receive_count,
                "Job already terminal, acknowledged duplicate delivery"
            );
            Ok(Outcome::Duplicate { job_id, status })
        }
        Err(error) if delivery.receive_count >= state.settings.max_receive_count => {
            dead_letter(state, &delivery, &error).await
        }
        Err(error) => {
            metrics::counter!("jobs_retried_total").increment(1);
            tracing::warn!(
                receipt = %delivery.receipt,
                receive_count = delivery.receive_count,
                error = %error,
                "Job processing failed, leaving message for redelivery"
            );
            Ok(Outcome::Retry {
                reason: error.to_string(),
            })
        }
    }
}

async fn handle(state: &AppState, delivery: &Delivery) -> Result<Handled, ProcessError> {
    let message = JobMessage::decode(&delivery.body)?;
    let job_id = message.job_id;

    // The record, not the message, is authoritative.
    let record = state
        .jobs
        .get(job_id)
        .await?
        .ok_or(ProcessError::MissingRecord(job_id))?;

    if record.status.is_terminal() {
        return Ok(Handled::Duplicate(job_id, record.status));
    }
    if record.user_id != message.user_id {
        tracing::warn!(
            job_id = %job_id,
            record_user = %record.user_id,
            message_user = %message.user_id,
            "Queue message owner differs from state record, using record"
        );
    }

    let key = artifact_key(&record.user_id, record.created_at.date_naive(), job_id);
    let body = render_artifact(&message, &record);

    tracing::debug!(job_id = %job_id, artifact_key = %key, "Writing artifact");
    state
        .artifacts
        .put(&key, body.as_bytes(), ARTIFACT_CONTENT_TYPE)
        .await?;

    match state.jobs.complete(job_id, &key, state.clock.now()).await? {
        Transition::Applied => Ok(Handled::Completed(job_id, key)),
        Transition::AlreadyTerminal(status) => Ok(Handled::Duplicate(job_id, status)),
        Transition::Missing => Err(ProcessError::MissingRecord(job_id)),
    }
}

async fn dead_letter(
    state: &AppState,
    delivery: &Delivery,
    error: &ProcessError,
) -> Result<Outcome, QueueError> {
    let reason = format!("{} (after {} receives)", error, delivery.receive_count);

    // Poison bodies never touch state; parseable ones fail their pending job.
    // The record only gets a generic message; the cause stays in the log and
    // the dead-letter entry.
    if !matches!(error, ProcessError::Poison(_)) {
        if let Ok(message) = JobMessage::decode(&delivery.body) {
            let public_error = failure_message(delivery.receive_count);
            match state
                .jobs
                .fail(message.job_id, &public_error, state.clock.now())
                .await
            {
                Ok(Transition::Applied) => {
                    tracing::warn!(job_id = %message.job_id, error = %error, "Job marked FAILED");
                }
                Ok(_) => {}
                Err(e) => {
                    // The message stays in flight; its next receive is dead-lettered again.
                    tracing::error!(job_id = %message.job_id, error = %e, "Failed to mark job FAILED");
                    return Ok(Outcome::Retry {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    move_to_dead_letter(state, delivery, reason).await
}

async fn move_to_dead_letter(
    state: &AppState,
    delivery: &Delivery,
    reason: String,
) -> Result<Outcome, QueueError> {
    state.queue.dead_letter(delivery, &reason).await?;
    metrics::counter!("jobs_dead_lettered_total").increment(1);
    tracing::error!(
        receipt = %delivery.receipt,
        receive_count = delivery.receive_count,
        reason = %reason,
        "Message dead-lettered"
    );
    Ok(Outcome::DeadLettered { reason })
}

/// Error text stored on a FAILED record and shown to callers.
pub fn failure_message(attempts: u32) -> String {
    format!("processing failed after {attempts} attempts")
}
