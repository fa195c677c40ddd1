//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reelgen_media::FrameSize;
use reelgen_models::{ProgressSchedule, DEFAULT_HOOK_CATEGORY};

use crate::error::{PipelineError, PipelineResult};

/// What the executor does with a job once every worker slot is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Admit into a bounded wait list; waiting jobs stay `pending`
    #[default]
    Queue,
    /// Refuse the request before a job record is created
    Reject,
}

impl FromStr for Backpressure {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(Backpressure::Queue),
            "reject" => Ok(Backpressure::Reject),
            other => Err(PipelineError::config(format!(
                "GENERATE_BACKPRESSURE must be 'queue' or 'reject', got '{other}'"
            ))),
        }
    }
}

/// Admission limits for generation jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Jobs running at once; 0 means unbounded
    pub max_concurrent_jobs: usize,
    /// Saturation policy
    pub backpressure: Backpressure,
    /// Jobs allowed to wait for a slot under [`Backpressure::Queue`]
    pub max_queued: usize,
    /// How long shutdown waits for in-flight jobs
    pub shutdown_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            backpressure: Backpressure::Queue,
            max_queued: 32,
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root that clip locators such as `/uploads/a.mp4` resolve against
    pub media_root: PathBuf,
    /// Public directory finished videos are published into
    pub output_dir: PathBuf,
    /// URL prefix the output directory is served under
    pub output_url_prefix: String,
    /// Parent of the per-job working directories
    pub tmp_dir: PathBuf,
    /// Seconds of hook audio kept before the voiceover starts
    pub hook_duration: f64,
    /// Catalog category holding hook clips
    pub hook_category: String,
    /// Main segments are scaled to this when the hook cannot be probed
    pub canonical_frame: FrameSize,
    /// Per-invocation ffmpeg timeout in seconds (0 = none)
    pub ffmpeg_timeout_secs: u64,
    /// Progress reported at each checkpoint
    pub progress_schedule: ProgressSchedule,
    pub executor: ExecutorConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("."),
            output_dir: PathBuf::from("public/videos"),
            output_url_prefix: "/videos".to_string(),
            tmp_dir: PathBuf::from("tmp"),
            hook_duration: 4.0,
            hook_category: DEFAULT_HOOK_CATEGORY.to_string(),
            canonical_frame: FrameSize::portrait_hd(),
            ffmpeg_timeout_secs: 0,
            progress_schedule: ProgressSchedule::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Fails on values that would make every job fail: a malformed
    /// progress schedule, an unknown backpressure policy, or a
    /// non-positive hook duration.
    pub fn from_env() -> PipelineResult<Self> {
        let defaults = Self::default();

        let progress_schedule = match std::env::var("PROGRESS_SCHEDULE") {
            Ok(spec) => ProgressSchedule::parse_overrides(&spec)
                .map_err(|e| PipelineError::config(format!("PROGRESS_SCHEDULE: {e}")))?,
            Err(_) => defaults.progress_schedule,
        };

        let backpressure = match std::env::var("GENERATE_BACKPRESSURE") {
            Ok(s) => s.parse()?,
            Err(_) => Backpressure::default(),
        };

        let hook_duration = env_parse("HOOK_DURATION_SECS", defaults.hook_duration);
        if !hook_duration.is_finite() || hook_duration <= 0.0 {
            return Err(PipelineError::config(format!(
                "HOOK_DURATION_SECS must be positive, got {hook_duration}"
            )));
        }

        Ok(Self {
            media_root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            output_url_prefix: std::env::var("OUTPUT_URL_PREFIX")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.output_url_prefix),
            tmp_dir: std::env::var("TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.tmp_dir),
            hook_duration,
            hook_category: std::env::var("HOOK_CATEGORY").unwrap_or(defaults.hook_category),
            canonical_frame: FrameSize::new(
                env_parse("CANONICAL_WIDTH", defaults.canonical_frame.width),
                env_parse("CANONICAL_HEIGHT", defaults.canonical_frame.height),
            ),
            ffmpeg_timeout_secs: env_parse("FFMPEG_TIMEOUT_SECS", 0),
            progress_schedule,
            executor: ExecutorConfig {
                max_concurrent_jobs: env_parse(
                    "GENERATE_MAX_CONCURRENT",
                    defaults.executor.max_concurrent_jobs,
                ),
                backpressure,
                max_queued: env_parse("GENERATE_MAX_QUEUED", defaults.executor.max_queued),
                shutdown_timeout: Duration::from_secs(env_parse("WORKER_SHUTDOWN_TIMEOUT", 60)),
            },
        })
    }

    /// Public locator of a job's finished video.
    pub fn output_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.output_url_prefix, file_name)
    }
}
