//! Pipeline error taxonomy.
//!
//! Every variant is fatal for the job that raised it; the orchestrator
//! persists the `Display` text as the job's error message.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No clips available for category: {category}")]
    NoClipsAvailable { category: String },

    #[error("Not enough clips available. Required {required} clips, but only found {available}.")]
    InsufficientClips { required: usize, available: usize },

    #[error("No hook clip with a file on disk found in category '{category}'")]
    HookResolutionFailure { category: String },

    #[error("Failed to trim clip {index}: {detail}")]
    TranscodeFailure { index: usize, detail: String },

    #[error("Voiceover is not configured: {0} not set")]
    VoiceoverConfigMissing(String),

    #[error("Failed to generate voiceover: speech API error{}: {detail}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    VoiceoverApiFailure { status: Option<u16>, detail: String },

    #[error("Failed to generate voiceover: transcode failed: {0}")]
    VoiceoverTranscodeFailure(String),

    #[error("Video composition failed: {0}")]
    CompositionFailure(String),

    #[error("Non-hook video generation is not supported; enable useHook and register a hook clip")]
    NonHookCompositionUnsupported,

    #[error("Failed to create working directory {path}: {detail}")]
    DirectoryCreationFailure { path: String, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] reelgen_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] reelgen_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short machine-readable tag for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NoClipsAvailable { .. } => "no_clips_available",
            PipelineError::InsufficientClips { .. } => "insufficient_clips",
            PipelineError::HookResolutionFailure { .. } => "hook_resolution_failure",
            PipelineError::TranscodeFailure { .. } => "transcode_failure",
            PipelineError::VoiceoverConfigMissing(_) => "voiceover_config_missing",
            PipelineError::VoiceoverApiFailure { .. } => "voiceover_api_failure",
            PipelineError::VoiceoverTranscodeFailure(_) => "voiceover_transcode_failure",
            PipelineError::CompositionFailure(_) => "composition_failure",
            PipelineError::NonHookCompositionUnsupported => "non_hook_composition_unsupported",
            PipelineError::DirectoryCreationFailure { .. } => "directory_creation_failure",
            PipelineError::Config(_) => "config",
            PipelineError::Store(_) => "store",
            PipelineError::Media(_) => "media",
            PipelineError::Io(_) => "io",
        }
    }
}

/// Most useful one-line description of a media failure.
pub(crate) fn media_detail(e: &reelgen_media::MediaError) -> String {
    match e.stderr_summary() {
        Some(line) => format!("{e} ({line})"),
        None => e.to_string(),
    }
}
