use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{SpeechConfig, SpeechToText};

const OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Whisper over HTTP, OpenAI or Azure OpenAI flavoured
pub struct WhisperApiClient {
    config: SpeechConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperApiClient {
    pub fn new(config: SpeechConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    fn is_azure(&self) -> bool {
        self.config.api_version.is_some()
    }

    /// Endpoint URL for the configured flavour
    pub fn transcriptions_url(&self) -> Result<String> {
        match &self.config.api_version {
            Some(version) => {
                let base = self
                    .config
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| anyhow!("Whisper endpoint not configured"))?;
                Ok(format!(
                    "{}/openai/deployments/{}/audio/transcriptions?api-version={}",
                    base.trim_end_matches('/'),
                    self.config.model,
                    version
                ))
            }
            None => {
                let base = self.config.endpoint.as_deref().unwrap_or(OPENAI_BASE);
                Ok(format!("{}/audio/transcriptions", base.trim_end_matches('/')))
            }
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperApiClient {
    async fn transcribe(&self, audio: &Path) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Whisper API key not configured"))?;
        let url = self.transcriptions_url()?;

        let audio_data = tokio::fs::read(audio)
            .await
            .with_context(|| format!("cannot read {}", audio.display()))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio_data)
                    .file_name(file_name)
                    .mime_str("audio/mpeg")?,
            )
            .text("model", self.config.model.clone())
            .text("response_format", "json");

        let form = match &self.config.language {
            Some(language) => form.text("language", language.clone()),
            None => form,
        };

        let request = self.client.post(&url).multipart(form);
        let request = if self.is_azure() {
            request.header("api-key", api_key)
        } else {
            request.bearer_auth(api_key)
        };

        debug!("Sending {} to {}", audio.display(), url);
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Whisper API error {}: {}", status, text));
        }

        let body: TranscriptionResponse = response.json().await?;
        Ok(body.text)
    }

    fn name(&self) -> &str {
        if self.is_azure() {
            "azure-whisper"
        } else {
            "whisper-api"
        }
    }
}

/// The OpenAI `whisper` command line tool
pub struct LocalWhisper {
    config: SpeechConfig,
}

#[derive(Debug, Deserialize)]
struct WhisperJson {
    text: String,
}

impl LocalWhisper {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    fn model(&self) -> &str {
        // API model names mean nothing to the CLI
        if self.config.model.starts_with("whisper-") {
            "base"
        } else {
            &self.config.model
        }
    }
}

#[async_trait]
impl SpeechToText for LocalWhisper {
    async fn transcribe(&self, audio: &Path) -> Result<String> {
        let output_dir = audio.parent().unwrap_or(Path::new("."));

        let mut cmd = Command::new("whisper");
        cmd.arg(audio)
            .arg("--model")
            .arg(self.model())
            .arg("--output_format")
            .arg("json")
            .arg("--output_dir")
            .arg(output_dir)
            .arg("--verbose")
            .arg("False");
        if let Some(language) = &self.config.language {
            cmd.arg("--language").arg(language);
        }

        debug!("Executing command: {:?}", cmd);
        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_seconds),
            cmd.output(),
        )
        .await
        .map_err(|_| anyhow!("whisper timed out after {}s", self.config.timeout_seconds))?
        .context("failed to run whisper")?;

        if !output.status.success() {
            return Err(anyhow!(
                "whisper failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let json_path = output_dir.join(format!("{}.json", stem));
        let content = tokio::fs::read_to_string(&json_path)
            .await
            .with_context(|| format!("whisper produced no {}", json_path.display()))?;
        let _ = tokio::fs::remove_file(&json_path).await;

        let parsed: WhisperJson = serde_json::from_str(&content)?;
        Ok(parsed.text.trim().to_string())
    }

    fn name(&self) -> &str {
        "whisper-cli"
    }
}
