use std::sync::Arc;

use crate::config::PipelineSettings;
use crate::services::{
    clock::Clock,
    queue::WorkQueue,
    state::JobStore,
    storage::ArtifactStore,
};

/// Shared handles used by route handlers, workers and the reconciliation sweep.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<PipelineSettings>,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        queue: Arc<dyn WorkQueue>,
        clock: Arc<dyn Clock>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            jobs,
            artifacts,
            queue,
            clock,
            settings: Arc::new(settings),
        }
    }
}
