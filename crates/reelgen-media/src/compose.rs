//! Final composition: one ffmpeg pass producing the muxed output.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use reelgen_models::EncodingProfile;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::{FrameSize, HookComposition, AUDIO_OUT, VIDEO_OUT};
use crate::tool::MediaTool;

/// Everything the compositor needs for a hook-led video.
#[derive(Debug, Clone)]
pub struct CompositionInput {
    /// Hook clip, played first with its own audio
    pub hook: PathBuf,
    /// Trimmed main segments in play order
    pub segments: Vec<PathBuf>,
    /// AAC voiceover track
    pub voiceover: PathBuf,
    /// Composed file to write
    pub output: PathBuf,
    /// Seconds of hook audio kept
    pub hook_duration: f64,
    /// Target length of the whole video
    pub total_length: f64,
    /// Used when the hook's frame size cannot be probed
    pub fallback_frame: FrameSize,
}

/// Probe the hook's frame size; mains are scaled to it.
pub async fn hook_frame_size(
    tool: &dyn MediaTool,
    hook: &Path,
    fallback: FrameSize,
) -> FrameSize {
    match tool.probe(hook).await {
        Ok(info) => match info.frame_size() {
            Some((width, height)) => FrameSize::new(width, height),
            None => fallback,
        },
        Err(e) => {
            warn!(
                hook = %hook.display(),
                "Could not probe hook frame size, using {}x{}: {}",
                fallback.width,
                fallback.height,
                e
            );
            fallback
        }
    }
}

/// Build the composition command without running it.
pub fn composition_command(input: &CompositionInput, frame: FrameSize) -> MediaResult<FfmpegCommand> {
    if input.segments.is_empty() {
        return Err(MediaError::invalid_input(
            "No main clips available for generating the video",
        ));
    }
    let voiceover_duration = input.total_length - input.hook_duration;
    if voiceover_duration <= 0.0 {
        return Err(MediaError::invalid_input(format!(
            "total length {}s leaves no room after the {}s hook",
            input.total_length, input.hook_duration
        )));
    }

    let plan = HookComposition {
        main_segments: input.segments.len(),
        hook_duration: input.hook_duration,
        voiceover_duration,
        frame,
    };

    let cmd = input
        .segments
        .iter()
        .fold(FfmpegCommand::new(&input.hook, &input.output), |cmd, seg| {
            cmd.add_input(seg)
        })
        .add_input(&input.voiceover)
        .filter_complex(plan.filter_graph())
        .map(VIDEO_OUT)
        .map(AUDIO_OUT)
        .encoding(&EncodingProfile::final_render())
        .faststart();

    Ok(cmd)
}

/// Compose the hook, segments, and voiceover into `input.output`.
pub async fn compose_with_hook(tool: &dyn MediaTool, input: &CompositionInput) -> MediaResult<()> {
    let frame = hook_frame_size(tool, &input.hook, input.fallback_frame).await;
    let cmd = composition_command(input, frame)?;

    info!(
        segments = input.segments.len(),
        width = frame.width,
        height = frame.height,
        output = %input.output.display(),
        "Composing final video"
    );
    tool.run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::VideoInfo;
    use crate::testing::FakeMediaTool;

    fn input(segments: usize) -> CompositionInput {
        CompositionInput {
            hook: "/w/hook.mp4".into(),
            segments: (0..segments)
                .map(|i| PathBuf::from(format!("/w/trimmed-{i}.mp4")))
                .collect(),
            voiceover: "/w/voiceover.m4a".into(),
            output: "/w/final.mp4".into(),
            hook_duration: 4.0,
            total_length: 65.0,
            fallback_frame: FrameSize::portrait_hd(),
        }
    }

    #[tokio::test]
    async fn test_compose_uses_probed_hook_size() {
        let tool = FakeMediaTool::new().with_probe(VideoInfo {
            duration: 4.2,
            width: 720,
            height: 1280,
            fps: 30.0,
            codec: "h264".into(),
            has_audio: true,
        });
        compose_with_hook(&tool, &input(3)).await.unwrap();

        let cmd = &tool.commands()[0];
        assert_eq!(cmd.inputs().len(), 5);
        assert_eq!(cmd.inputs()[0], PathBuf::from("/w/hook.mp4"));
        assert_eq!(cmd.inputs()[4], PathBuf::from("/w/voiceover.m4a"));

        let graph = cmd.output_value("-filter_complex").unwrap();
        assert!(graph.contains("scale=720:1280"));
        assert!(graph.contains("[4:a]atrim=duration=61"));

        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w == ["-map", "[vout]"]));
        assert!(args.windows(2).any(|w| w == ["-map", "[aout]"]));
        assert_eq!(cmd.output_value("-b:a"), Some("192k"));
        assert_eq!(cmd.output_value("-movflags"), Some("+faststart"));
    }

    #[tokio::test]
    async fn test_unprobeable_hook_falls_back() {
        let tool = FakeMediaTool::new().failing_probe();
        let frame = hook_frame_size(&tool, Path::new("/w/hook.mp4"), FrameSize::portrait_hd()).await;
        assert_eq!(frame, FrameSize::portrait_hd());
    }

    #[test]
    fn test_rejects_empty_or_too_short() {
        let err = composition_command(&input(0), FrameSize::default()).unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput(_)));

        let mut short = input(1);
        short.total_length = 4.0;
        assert!(composition_command(&short, FrameSize::default()).is_err());
    }
}
