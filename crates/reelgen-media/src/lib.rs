//! FFmpeg CLI wrapper for the generation stages.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - A `MediaTool` seam so stages run against ffmpeg or a fake
//! - Segment trimming and voiceover transcoding
//! - The single-pass hook + segments + voiceover composition
//! - Atomic publishing of finished files

pub mod command;
pub mod compose;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod probe;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod tool;
pub mod trim;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{compose_with_hook, CompositionInput};
pub use error::{MediaError, MediaResult};
pub use filters::{FrameSize, HookComposition};
pub use fs_utils::move_file;
pub use probe::{probe_video, VideoInfo};
pub use tool::{FfmpegTool, MediaTool};
pub use trim::{transcode_voiceover, trim_segment};
