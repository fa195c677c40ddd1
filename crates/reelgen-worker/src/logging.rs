//! Structured job logging.

use tracing::{error, info, warn, Span};

use reelgen_models::{Checkpoint, JobId};

/// Job logger carrying the job ID and operation on every event.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a checkpoint being reached.
    pub fn log_checkpoint(&self, checkpoint: Checkpoint, progress: u8, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            checkpoint = %checkpoint,
            progress,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, kind: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            error_kind = kind,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping the whole job so nested stage logs inherit the ID.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}
