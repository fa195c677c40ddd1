//! Shared data models for the reelgen backend.
//!
//! This crate provides Serde-serializable types for:
//! - Generation jobs and their status state machine
//! - Catalog clips
//! - Encoding profiles for the media stages
//! - The progress checkpoint schedule
//! - The validated generate request

pub mod clip;
pub mod encoding;
pub mod job;
pub mod progress;
pub mod request;

// Re-export common types
pub use clip::{ClipId, VideoClip, DEFAULT_HOOK_CATEGORY};
pub use encoding::EncodingProfile;
pub use job::{GenerationJob, JobId, JobStatus, JobUpdate, NewJob, TransitionError};
pub use progress::{Checkpoint, ProgressSchedule, ScheduleError};
pub use request::{GenerateRequest, RequestError};
