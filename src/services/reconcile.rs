use chrono::Duration as ChronoDuration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::models::job::JobStatus;
use crate::services::state::StateError;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Outbox messages published again.
    pub republished: usize,
    /// Outbox rows dropped because their job was already terminal.
    pub cleared: usize,
    /// Rows whose publish failed; retried on the next sweep.
    pub failed: usize,
}

/// Re-enqueue every outbox message older than `reconcile_after` whose job is
/// still PENDING, and clear the rows of jobs that already finished.
pub async fn sweep_once(state: &AppState) -> Result<SweepReport, StateError> {
    let age = ChronoDuration::from_std(state.settings.reconcile_after)
        .unwrap_or(ChronoDuration::MAX);
    let cutoff = state
        .clock
        .now()
        .checked_sub_signed(age)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

    let stale = state
        .jobs
        .stale_outbox(cutoff, state.settings.reconcile_batch_size)
        .await?;

    let mut report = SweepReport::default();
    for entry in stale {
        if entry.status != JobStatus::Pending {
            state.jobs.clear_outbox(entry.job_id).await?;
            report.cleared += 1;
            continue;
        }

        match state.queue.enqueue(&entry.payload).await {
            Ok(()) => {
                state.jobs.clear_outbox(entry.job_id).await?;
                metrics::counter!("jobs_reconciled_total").increment(1);
                tracing::info!(job_id = %entry.job_id, "Re-enqueued stale pending job");
                report.republished += 1;
            }
            Err(e) => {
                tracing::warn!(job_id = %entry.job_id, error = %e, "Re-enqueue failed");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Sweep every `reconcile_interval` until `shutdown` fires.
pub async fn run(state: AppState, shutdown: CancellationToken) {
    tracing::info!(
        interval_secs = state.settings.reconcile_interval.as_secs(),
        "Reconciliation sweep started"
    );

    loop {
        match sweep_once(&state).await {
            Ok(report) if report != SweepReport::default() => {
                tracing::info!(
                    republished = report.republished,
                    cleared = report.cleared,
                    failed = report.failed,
                    "Reconciliation sweep finished"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed"),
        }

        if let Ok(depth) = state.queue.depth().await {
            metrics::gauge!("jobs_queue_depth").set(depth as f64);
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(state.settings.reconcile_interval) => {}
        }
    }

    tracing::info!("Reconciliation sweep stopped");
}
