//! The process boundary every media stage goes through.

use std::path::Path;

use async_trait::async_trait;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_video, VideoInfo};

/// External media tool used by the pipeline stages.
///
/// Stages never spawn processes themselves, so they can run against a fake.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Execute an ffmpeg invocation to completion.
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()>;

    /// Inspect a media file.
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo>;
}

/// `ffmpeg`/`ffprobe` from `PATH`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTool {
    runner: FfmpegRunner,
}

impl FfmpegTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any invocation that runs longer than `secs` (0 = no limit).
    pub fn with_timeout(secs: u64) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(secs),
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.runner.run(cmd).await
    }

    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe_video(path).await
    }
}
