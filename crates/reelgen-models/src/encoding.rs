//! Encoding profiles for the media stages.

use serde::{Deserialize, Serialize};

/// Codec settings applied to an ffmpeg output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProfile {
    /// Video codec; `None` drops the video stream (`-vn`)
    #[serde(default)]
    pub video_codec: Option<String>,

    /// x264 preset
    #[serde(default)]
    pub preset: Option<String>,

    /// Constant Rate Factor
    #[serde(default)]
    pub crf: Option<u8>,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self::segment()
    }
}

impl EncodingProfile {
    /// Intermediate main segments.
    pub fn segment() -> Self {
        Self {
            video_codec: Some("libx264".to_string()),
            preset: Some("veryfast".to_string()),
            crf: Some(23),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
        }
    }

    /// The composed final video. Preset and CRF are left at encoder defaults.
    pub fn final_render() -> Self {
        Self {
            video_codec: Some("libx264".to_string()),
            preset: None,
            crf: None,
            audio_codec: default_audio_codec(),
            audio_bitrate: "192k".to_string(),
        }
    }

    /// Audio-only voiceover track.
    pub fn voiceover() -> Self {
        Self {
            video_codec: None,
            preset: None,
            crf: None,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        match &self.video_codec {
            Some(codec) => {
                args.push("-c:v".to_string());
                args.push(codec.clone());
                if let Some(preset) = &self.preset {
                    args.push("-preset".to_string());
                    args.push(preset.clone());
                }
                if let Some(crf) = self.crf {
                    args.push("-crf".to_string());
                    args.push(crf.to_string());
                }
            }
            None => args.push("-vn".to_string()),
        }

        args.push("-c:a".to_string());
        args.push(self.audio_codec.clone());
        args.push("-b:a".to_string());
        args.push(self.audio_bitrate.clone());

        args
    }
}
