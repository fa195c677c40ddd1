//! Narration synthesis.
//!
//! The script goes to an ElevenLabs-compatible text-to-speech endpoint; the
//! returned MP3 is written into the job's working directory, transcoded to
//! AAC/M4A for muxing, and the raw file is then removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use reelgen_media::{transcode_voiceover, MediaTool};

use crate::error::{media_detail, PipelineError, PipelineResult};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB";
const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

/// Raw speech API output inside the working directory.
pub const RAW_VOICEOVER_FILE: &str = "voiceover.mp3";
/// Transcoded narration track handed to the compositor.
pub const VOICEOVER_FILE: &str = "voiceover.m4a";

/// Speech API settings.
#[derive(Debug, Clone)]
pub struct VoiceoverConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub request_timeout: Duration,
}

impl VoiceoverConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            stability: 0.8,
            similarity_boost: 0.8,
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Read settings from the environment.
    ///
    /// `ELEVENLABS_API_KEY` is required; the server refuses to start
    /// without it.
    pub fn from_env() -> PipelineResult<Self> {
        let api_key = std::env::var("ELEVENLABS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::VoiceoverConfigMissing("ELEVENLABS_API_KEY".into()))?;

        let defaults = Self::new(api_key);
        let parse_f32 = |key: &str, default: f32| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Ok(Self {
            base_url: std::env::var("ELEVENLABS_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| defaults.base_url.clone()),
            voice_id: std::env::var("ELEVENLABS_VOICE_ID")
                .unwrap_or_else(|_| defaults.voice_id.clone()),
            model_id: std::env::var("ELEVENLABS_MODEL_ID")
                .unwrap_or_else(|_| defaults.model_id.clone()),
            stability: parse_f32("ELEVENLABS_STABILITY", defaults.stability),
            similarity_boost: parse_f32("ELEVENLABS_SIMILARITY_BOOST", defaults.similarity_boost),
            request_timeout: std::env::var("ELEVENLABS_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            ..defaults
        })
    }
}

/// Turns text into encoded audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> PipelineResult<Vec<u8>>;
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// ElevenLabs text-to-speech client.
pub struct ElevenLabsClient {
    config: VoiceoverConfig,
    client: Client,
}

impl ElevenLabsClient {
    pub fn new(config: VoiceoverConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PipelineError::config(format!("Failed to build speech API client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.config.base_url, self.config.voice_id
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> PipelineResult<Vec<u8>> {
        let body = SpeechRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };

        debug!(voice_id = %self.config.voice_id, chars = text.len(), "Requesting speech synthesis");

        let response = self
            .client
            .post(self.endpoint())
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::VoiceoverApiFailure {
                status: None,
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Speech API returned an error");
            return Err(PipelineError::VoiceoverApiFailure {
                status: Some(status.as_u16()),
                detail,
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| PipelineError::VoiceoverApiFailure {
                status: Some(status.as_u16()),
                detail: format!("failed to read audio body: {e}"),
            })?;
        Ok(audio.to_vec())
    }
}

/// Produces the job's narration track.
pub struct VoiceoverSynthesizer {
    speech: Arc<dyn SpeechSynthesizer>,
    tool: Arc<dyn MediaTool>,
}

impl VoiceoverSynthesizer {
    pub fn new(speech: Arc<dyn SpeechSynthesizer>, tool: Arc<dyn MediaTool>) -> Self {
        Self { speech, tool }
    }

    /// Synthesize `script` into `work_dir/voiceover.m4a` and return its path.
    pub async fn synthesize(&self, script: &str, work_dir: &Path) -> PipelineResult<PathBuf> {
        let audio = self.speech.synthesize(script).await?;
        let raw = work_dir.join(RAW_VOICEOVER_FILE);
        let output = work_dir.join(VOICEOVER_FILE);

        tokio::fs::write(&raw, &audio).await?;
        info!(bytes = audio.len(), path = %raw.display(), "Saved raw voiceover");

        let transcoded = transcode_voiceover(self.tool.as_ref(), &raw, &output).await;

        if let Err(e) = tokio::fs::remove_file(&raw).await {
            warn!(path = %raw.display(), "Failed to remove raw voiceover: {}", e);
        }

        transcoded.map_err(|e| PipelineError::VoiceoverTranscodeFailure(media_detail(&e)))?;
        Ok(output)
    }
}
