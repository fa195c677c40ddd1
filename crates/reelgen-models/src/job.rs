//! Generation job records and the status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Record created, background task not running yet
    #[default]
    Pending,
    /// Pipeline is running
    Processing,
    /// Output produced
    Completed,
    /// A stage failed, or the watchdog gave up on the job
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a record in this status may be moved to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected job mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("progress cannot go backwards ({current} -> {requested})")]
    ProgressRegression { current: u8, requested: u8 },

    #[error("completed jobs require an output url")]
    MissingOutput,
}

/// Fields supplied when a generate request is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub categories: Vec<String>,
    pub script: String,
    pub use_hook: bool,
    /// Target length of the final video in seconds
    pub total_length: f64,
    /// Length of every main segment in seconds
    pub clip_duration: f64,
}

/// A persisted generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub categories: Vec<String>,
    pub script: String,
    pub use_hook: bool,
    pub total_length: f64,
    pub clip_duration: f64,
    pub status: JobStatus,
    /// Checkpoint progress (0-100)
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every accepted update
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Create a pending job record from an accepted request.
    pub fn new(id: JobId, new: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            categories: new.categories,
            script: new.script,
            use_hook: new.use_hook,
            total_length: new.total_length,
            clip_duration: new.clip_duration,
            status: JobStatus::Pending,
            progress: 0,
            output_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update, enforcing the lifecycle invariants.
    ///
    /// The record is left untouched when the update is rejected.
    pub fn apply(&mut self, update: &JobUpdate) -> Result<(), TransitionError> {
        let next = update.status.unwrap_or(self.status);
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        match next {
            JobStatus::Processing => {
                let requested = update.progress.unwrap_or(self.progress).min(100);
                if self.status == JobStatus::Processing && requested < self.progress {
                    return Err(TransitionError::ProgressRegression {
                        current: self.progress,
                        requested,
                    });
                }
                self.progress = requested;
            }
            JobStatus::Completed => {
                let url = update
                    .output_url
                    .clone()
                    .ok_or(TransitionError::MissingOutput)?;
                self.progress = 100;
                self.output_url = Some(url);
                self.error = None;
            }
            JobStatus::Failed => {
                self.progress = 0;
                self.output_url = None;
                self.error = Some(
                    update
                        .error
                        .clone()
                        .unwrap_or_else(|| "Video generation failed".to_string()),
                );
            }
            // Pending -> Pending is never a valid transition
            JobStatus::Pending => unreachable!("rejected by can_transition_to"),
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update written by the orchestrator's checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub output_url: Option<String>,
}

impl JobUpdate {
    /// Processing checkpoint at the given percentage.
    pub fn progress(value: u8) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(value),
            ..Default::default()
        }
    }

    /// Terminal success with the produced file locator.
    pub fn completed(output_url: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            output_url: Some(output_url.into()),
            ..Default::default()
        }
    }

    /// Terminal failure with a human-readable message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            progress: Some(0),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
