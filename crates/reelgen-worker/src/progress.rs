//! Checkpoint writes to the job store.

use std::sync::Arc;

use reelgen_models::{Checkpoint, GenerationJob, JobId, JobUpdate, ProgressSchedule};
use reelgen_store::{JobStore, StoreError};

use crate::error::PipelineResult;
use crate::logging::JobLogger;

/// Writes a job's status and progress as it crosses each checkpoint.
///
/// The store is the only channel through which pollers observe a job, so
/// every write here is what a client sees.
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    schedule: ProgressSchedule,
    logger: JobLogger,
}

impl ProgressReporter {
    pub fn new(
        store: Arc<dyn JobStore>,
        job_id: JobId,
        schedule: ProgressSchedule,
        logger: JobLogger,
    ) -> Self {
        Self {
            store,
            job_id,
            schedule,
            logger,
        }
    }

    /// Record that `checkpoint` was reached.
    ///
    /// The first checkpoint also moves the job from pending to processing.
    pub async fn checkpoint(&self, checkpoint: Checkpoint, message: &str) -> PipelineResult<()> {
        let progress = self.schedule.value(checkpoint);
        self.store
            .update(&self.job_id, JobUpdate::progress(progress))
            .await?;
        self.logger.log_checkpoint(checkpoint, progress, message);
        Ok(())
    }

    /// Mark the job completed with its public locator.
    pub async fn complete(&self, output_url: &str) -> PipelineResult<GenerationJob> {
        let job = self
            .store
            .update(&self.job_id, JobUpdate::completed(output_url))
            .await?;
        self.logger.log_completion(output_url);
        Ok(job)
    }

    /// Mark the job failed.
    ///
    /// A job that already reached a terminal state (for example, failed by
    /// the stale job detector) is left as it is.
    pub async fn fail(&self, kind: &str, message: &str) {
        self.logger.log_error(kind, message);
        match self
            .store
            .update(&self.job_id, JobUpdate::failed(message))
            .await
        {
            Ok(_) => {}
            Err(StoreError::TerminalState { status, .. }) => {
                self.logger
                    .log_warning(&format!("Job already {status}, failure not recorded"));
            }
            Err(e) => {
                self.logger
                    .log_warning(&format!("Failed to record job failure: {e}"));
            }
        }
    }
}
