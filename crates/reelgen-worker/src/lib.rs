//! Narrated video generation pipeline.
//!
//! This crate provides:
//! - Clip selection against the catalog and the filesystem
//! - Voiceover synthesis through the speech API
//! - The stage orchestrator and its progress checkpoints
//! - The job executor with admission control and graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod progress;
pub mod selector;
pub mod voiceover;

pub use config::{Backpressure, ExecutorConfig, WorkerConfig};
pub use error::{PipelineError, PipelineResult};
pub use executor::{Admission, AdmissionError, JobExecutor};
pub use logging::JobLogger;
pub use processor::GenerationPipeline;
pub use progress::ProgressReporter;
pub use selector::{ClipSelector, ClipSet, SelectedClip};
pub use voiceover::{ElevenLabsClient, SpeechSynthesizer, VoiceoverConfig, VoiceoverSynthesizer};
