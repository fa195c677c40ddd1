//! Application state.

use std::sync::Arc;

use reelgen_store::JobStore;
use reelgen_worker::{JobExecutor, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub worker: Arc<WorkerConfig>,
    pub store: Arc<dyn JobStore>,
    pub executor: Arc<JobExecutor>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        worker: Arc<WorkerConfig>,
        store: Arc<dyn JobStore>,
        executor: Arc<JobExecutor>,
    ) -> Self {
        Self {
            config,
            worker,
            store,
            executor,
        }
    }
}
