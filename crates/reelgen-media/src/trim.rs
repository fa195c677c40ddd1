//! Fixed-length re-encodes: main segments and the voiceover track.

use std::path::Path;

use tracing::debug;

use reelgen_models::EncodingProfile;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::FILTER_RESET_PTS;
use crate::tool::MediaTool;

/// Cut the first `clip_duration` seconds of `source` into `output`.
///
/// Timestamps are reset to zero and the result is re-encoded with the
/// segment profile so every intermediate shares one codec layout.
pub async fn trim_segment(
    tool: &dyn MediaTool,
    source: &Path,
    output: &Path,
    clip_duration: f64,
) -> MediaResult<()> {
    if clip_duration.is_nan() || clip_duration <= 0.0 {
        return Err(MediaError::invalid_input(format!(
            "clip duration must be positive, got {clip_duration}"
        )));
    }

    let cmd = FfmpegCommand::new(source, output)
        .duration(clip_duration)
        .video_filter(FILTER_RESET_PTS)
        .encoding(&EncodingProfile::segment());

    debug!(source = %source.display(), output = %output.display(), "Trimming segment");
    tool.run(&cmd).await
}

/// Re-encode raw synthesized speech into the AAC voiceover track.
pub async fn transcode_voiceover(
    tool: &dyn MediaTool,
    raw: &Path,
    output: &Path,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(raw, output).encoding(&EncodingProfile::voiceover());
    tool.run(&cmd).await
}
