//! Store error types.

use thiserror::Error;

use reelgen_models::{JobStatus, TransitionError};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the job store and clip catalog.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} is already {status} and cannot be updated")]
    TerminalState { id: String, status: JobStatus },

    #[error("Rejected update for job {id}: {source}")]
    InvalidUpdate {
        id: String,
        #[source]
        source: TransitionError,
    },

    #[error("Invalid catalog manifest: {0}")]
    InvalidManifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
