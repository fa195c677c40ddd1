//! Generation job repository.

use std::collections::HashMap;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, info};

use reelgen_models::{GenerationJob, JobId, JobStatus, JobUpdate, NewJob};

use crate::error::{StoreError, StoreResult};

/// Persistence for generation jobs.
///
/// The store is the only place job state lives; pollers read it and the
/// orchestrator writes it through its checkpoints.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new pending job and return the stored record.
    async fn create(&self, job: NewJob) -> StoreResult<GenerationJob>;

    /// Get a job by ID.
    async fn get(&self, id: &JobId) -> StoreResult<Option<GenerationJob>>;

    /// Apply a partial update and return the resulting record.
    ///
    /// Updates to completed or failed jobs are rejected with
    /// [`StoreError::TerminalState`].
    async fn update(&self, id: &JobId, update: JobUpdate) -> StoreResult<GenerationJob>;

    /// All jobs currently in `status`, oldest first.
    async fn list_by_status(&self, status: JobStatus) -> StoreResult<Vec<GenerationJob>>;
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, GenerationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Insert a record as-is. Intended for restoring state and tests.
    pub async fn insert(&self, job: GenerationJob) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: NewJob) -> StoreResult<GenerationJob> {
        let mut jobs = self.jobs.write().await;

        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }

        let record = GenerationJob::new(id.clone(), job);
        jobs.insert(id.clone(), record.clone());

        counter!("reelgen_jobs_created_total").increment(1);
        info!(job_id = %id, categories = ?record.categories, "Created generation job");
        Ok(record)
    }

    async fn get(&self, id: &JobId) -> StoreResult<Option<GenerationJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> StoreResult<GenerationJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;

        if job.is_terminal() {
            return Err(StoreError::TerminalState {
                id: id.to_string(),
                status: job.status,
            });
        }

        // Apply to a copy so a rejected update leaves the record untouched
        let mut next = job.clone();
        next.apply(&update)
            .map_err(|source| StoreError::InvalidUpdate {
                id: id.to_string(),
                source,
            })?;

        debug!(job_id = %id, status = %next.status, progress = next.progress, "Job updated");
        *job = next.clone();
        Ok(next)
    }

    async fn list_by_status(&self, status: JobStatus) -> StoreResult<Vec<GenerationJob>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<GenerationJob> =
            jobs.values().filter(|j| j.status == status).cloned().collect();
        matching.sort_by_key(|j| j.created_at);
        Ok(matching)
    }
}
