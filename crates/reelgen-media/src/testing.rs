//! In-process stand-in for ffmpeg/ffprobe.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::probe::VideoInfo;
use crate::tool::MediaTool;

/// Records every command and writes a placeholder output file.
///
/// Commands whose output file name contains a configured fragment fail
/// with a non-zero exit instead.
#[derive(Debug, Clone)]
pub struct FakeMediaTool {
    commands: Arc<Mutex<Vec<FfmpegCommand>>>,
    fail_outputs: Vec<String>,
    probe: Option<VideoInfo>,
}

impl Default for FakeMediaTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMediaTool {
    pub fn new() -> Self {
        Self {
            commands: Arc::new(Mutex::new(Vec::new())),
            fail_outputs: Vec::new(),
            probe: Some(VideoInfo {
                duration: 4.0,
                width: 1080,
                height: 1920,
                fps: 30.0,
                codec: "h264".to_string(),
                has_audio: true,
            }),
        }
    }

    /// Fail any command whose output file name contains `fragment`.
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_outputs.push(fragment.into());
        self
    }

    pub fn with_probe(mut self, info: VideoInfo) -> Self {
        self.probe = Some(info);
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.probe = None;
        self
    }

    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<FfmpegCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Output paths of the commands run so far.
    pub fn outputs(&self) -> Vec<PathBuf> {
        self.commands()
            .iter()
            .map(|c| c.output().to_path_buf())
            .collect()
    }
}

#[async_trait]
impl MediaTool for FakeMediaTool {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(cmd.clone());
        }

        let name = cmd
            .output()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.fail_outputs.iter().any(|f| name.contains(f.as_str())) {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(format!("{name}: Invalid data found when processing input")),
                Some(1),
            ));
        }

        // Outputs into directories that do not exist are only recorded
        let parent_exists = match cmd.output().parent() {
            Some(parent) => tokio::fs::try_exists(parent).await.unwrap_or(false),
            None => false,
        };
        if parent_exists {
            tokio::fs::write(cmd.output(), b"fake media").await?;
        }
        Ok(())
    }

    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        self.probe
            .clone()
            .ok_or_else(|| MediaError::InvalidVideo(format!("{} is not probeable", path.display())))
    }
}
