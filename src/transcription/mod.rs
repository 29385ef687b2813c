pub mod whisper;

pub use whisper::{LocalWhisper, WhisperApiClient};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::media::MediaBackend;

/// Speech-to-text backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpeechProvider {
    /// Whisper over HTTP (OpenAI, or Azure OpenAI when `api_version` is set)
    Remote,
    /// The `whisper` command line tool
    Local,
    Disabled,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub provider: SpeechProvider,

    /// Base endpoint (Azure resource URL or OpenAI-compatible `/v1` base)
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    /// Model name, or deployment name for Azure
    pub model: String,

    /// Azure API version; selects Azure-style routing when present
    pub api_version: Option<String>,

    /// Language hint
    pub language: Option<String>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Bitrate of the intermediate audio file
    pub audio_bitrate: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::Remote,
            endpoint: None,
            api_key: None,
            model: "whisper-1".to_string(),
            api_version: None,
            language: None,
            timeout_seconds: 300,
            audio_bitrate: "32k".to_string(),
        }
    }
}

/// Outcome of a transcription attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transcript {
    Text(String),
    Unavailable { reason: String },
}

impl Transcript {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Transcript::Unavailable {
            reason: reason.into(),
        }
    }

    /// Transcript text, or `None` when unavailable or blank
    pub fn text(&self) -> Option<&str> {
        match self {
            Transcript::Text(text) if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.text().is_some()
    }
}

/// Speech-to-text collaborator
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String>;
    fn name(&self) -> &str;
}

/// Build the configured speech-to-text backend; `None` when disabled
pub fn create_speech_to_text(config: &SpeechConfig) -> Result<Option<Arc<dyn SpeechToText>>> {
    match config.provider {
        SpeechProvider::Remote => Ok(Some(Arc::new(WhisperApiClient::new(config.clone())?))),
        SpeechProvider::Local => Ok(Some(Arc::new(LocalWhisper::new(config.clone())))),
        SpeechProvider::Disabled => Ok(None),
    }
}

/// Demuxes a segment's audio and transcribes it, degrading to `Unavailable` on any failure
pub struct TranscriptExtractor {
    media: Arc<dyn MediaBackend>,
    speech: Arc<dyn SpeechToText>,
    audio_bitrate: String,
}

impl TranscriptExtractor {
    pub fn new(
        media: Arc<dyn MediaBackend>,
        speech: Arc<dyn SpeechToText>,
        audio_bitrate: impl Into<String>,
    ) -> Self {
        Self {
            media,
            speech,
            audio_bitrate: audio_bitrate.into(),
        }
    }

    /// Transcribe `segment`, staging the audio intermediate in `work_dir`
    pub async fn transcribe(&self, segment: &Path, work_dir: &Path) -> Transcript {
        let audio = audio_path(segment, work_dir);

        if let Err(e) = self
            .media
            .extract_audio(segment, &audio, &self.audio_bitrate)
            .await
        {
            warn!("🔇 No audio extracted from {}: {:#}", segment.display(), e);
            remove_intermediate(&audio).await;
            return Transcript::unavailable(format!("audio extraction failed: {:#}", e));
        }

        debug!("🎙️  Transcribing {} with {}", audio.display(), self.speech.name());
        let result = self.speech.transcribe(&audio).await;
        remove_intermediate(&audio).await;

        match result {
            Ok(text) => {
                info!("🎙️  Transcribed {} characters", text.len());
                Transcript::Text(text)
            }
            Err(e) => {
                warn!("⚠️  Transcription failed for {}: {:#}", segment.display(), e);
                Transcript::unavailable(format!("{:#}", e))
            }
        }
    }
}

/// Audio intermediate for `segment`, always inside `work_dir`
pub fn audio_path(segment: &Path, work_dir: &Path) -> PathBuf {
    let stem = segment
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segment".to_string());
    work_dir.join(format!("{}_audio.mp3", stem))
}

async fn remove_intermediate(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_text() {
        assert_eq!(Transcript::Text("hello".into()).text(), Some("hello"));
        assert_eq!(Transcript::Text("  \n".into()).text(), None);
        assert_eq!(Transcript::unavailable("timeout").text(), None);
        assert!(!Transcript::unavailable("timeout").is_available());
    }

    #[test]
    fn test_audio_path_stays_in_work_dir() {
        let audio = audio_path(Path::new("/videos/clip.mp4"), Path::new("/run/segments"));
        assert_eq!(audio, PathBuf::from("/run/segments/clip_audio.mp3"));

        let audio = audio_path(
            Path::new("/run/segments/clip_segment_0-60_secs.mp4"),
            Path::new("/run/segments"),
        );
        assert_eq!(
            audio,
            PathBuf::from("/run/segments/clip_segment_0-60_secs_audio.mp3")
        );
    }

    #[test]
    fn test_disabled_provider_builds_nothing() {
        let config = SpeechConfig {
            provider: SpeechProvider::Disabled,
            ..SpeechConfig::default()
        };
        assert!(create_speech_to_text(&config).unwrap().is_none());
    }
}
