use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::services::processor::{process_delivery, Outcome};
use crate::services::queue::QueueError;

/// Receive and process the next visible message.
/// Returns Ok(None) if no message was available.
pub async fn process_next(state: &AppState) -> Result<Option<Outcome>, QueueError> {
    let delivery = match state.queue.receive().await? {
        Some(d) => d,
        None => return Ok(None),
    };

    tracing::debug!(
        receipt = %delivery.receipt,
        receive_count = delivery.receive_count,
        "Received message"
    );

    process_delivery(state, delivery).await.map(Some)
}

/// Run `worker_concurrency` independent consumers until `shutdown` fires.
pub async fn run_pool(state: AppState, shutdown: CancellationToken) {
    let mut workers = JoinSet::new();
    for worker_id in 0..state.settings.worker_concurrency {
        workers.spawn(run_worker(state.clone(), worker_id, shutdown.clone()));
    }

    tracing::info!(
        workers = state.settings.worker_concurrency,
        "Worker pool started"
    );

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    tracing::info!("Worker pool stopped");
}

async fn run_worker(state: AppState, worker_id: usize, shutdown: CancellationToken) {
    while !shutdown.is_cancelled() {
        match process_next(&state).await {
            Ok(Some(outcome)) => {
                tracing::debug!(worker_id, ?outcome, "Message settled");
            }
            Ok(None) => {
                tracing::trace!(worker_id, "No messages available, sleeping");
                idle(&state, &shutdown).await;
            }
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Queue error, will retry");
                idle(&state, &shutdown).await;
            }
        }
    }
}

async fn idle(state: &AppState, shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = sleep(state.settings.poll_interval) => {}
    }
}
