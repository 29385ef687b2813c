use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analyzer::Prompts;
use crate::llm::{VisionConfig, VisionProvider};
use crate::media::MediaConfig;
use crate::source::DownloadConfig;
use crate::transcription::{SpeechConfig, SpeechProvider};

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert on Video Analysis. You will be shown a series of images from a video. Describe what is happening in the video, including the objects, actions, and any other relevant details. Be as specific and detailed as possible.";
const DEFAULT_USER_PROMPT: &str = "These are the frames from the video.";

/// Configuration for the video analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vision-language model service
    pub vision: VisionConfig,

    /// Speech-to-text service
    pub speech: SpeechConfig,

    /// Remote source acquisition
    pub download: DownloadConfig,

    /// ffmpeg tooling
    pub media: MediaConfig,

    /// Default prompts
    pub prompts: PromptConfig,

    /// Output and logging
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub system: String,
    pub user: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            user: DEFAULT_USER_PROMPT.to_string(),
        }
    }
}

impl PromptConfig {
    pub fn to_prompts(&self) -> Prompts {
        Prompts::new(self.system.clone(), self.user.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root under which each run gets its own directory
    pub base_dir: PathBuf,

    /// Keep segment files after analysis
    pub keep_segments: bool,

    /// Log level
    pub log_level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./output"),
            keep_segments: false,
            log_level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vision: VisionConfig::default(),
            speech: SpeechConfig::default(),
            download: DownloadConfig::default(),
            media: MediaConfig::default(),
            prompts: PromptConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load from the first config file found, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config_paths = vec![
            PathBuf::from("video-analyzer.toml"),
            PathBuf::from("config/video-analyzer.toml"),
        ];
        if let Ok(home) = std::env::var("HOME") {
            config_paths.push(Path::new(&home).join(".config/video-analyzer/config.toml"));
        }

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        config.apply_env();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load a specific file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = var("AZURE_OPENAI_ENDPOINT") {
            self.vision.provider = VisionProvider::AzureOpenAI;
            self.vision.endpoint = Some(endpoint);
        }
        if let Some(api_key) = var("AZURE_OPENAI_API_KEY") {
            self.vision.api_key = Some(api_key);
        }
        if let Some(version) = var("AZURE_OPENAI_API_VERSION") {
            self.vision.api_version = Some(version);
        }
        if let Some(deployment) = var("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.vision.model = deployment;
        }

        if let Some(endpoint) = var("WHISPER_ENDPOINT") {
            self.speech.provider = SpeechProvider::Remote;
            self.speech.endpoint = Some(endpoint);
        }
        if let Some(api_key) = var("WHISPER_API_KEY") {
            self.speech.api_key = Some(api_key);
        }
        if let Some(version) = var("WHISPER_API_VERSION") {
            self.speech.api_version = Some(version);
        }
        if let Some(deployment) = var("WHISPER_DEPLOYMENT_NAME") {
            self.speech.model = deployment;
        }

        if let Some(api_key) = var("OPENAI_API_KEY") {
            self.vision.api_key.get_or_insert_with(|| api_key.clone());
            self.speech.api_key.get_or_insert(api_key);
        }

        if let Some(prompt) = var("SYSTEM_PROMPT") {
            self.prompts.system = prompt;
        }

        if let Some(output_dir) = var("VIDEO_ANALYZER_OUTPUT_DIR") {
            self.output.base_dir = PathBuf::from(output_dir);
        }

        if let Some(log_level) = var("VIDEO_ANALYZER_LOG_LEVEL") {
            self.output.log_level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.vision.provider {
            VisionProvider::AzureOpenAI => {
                if self.vision.endpoint.is_none() {
                    return Err(anyhow!("AZURE_OPENAI_ENDPOINT (vision.endpoint) is required"));
                }
                if self.vision.api_key.is_none() {
                    return Err(anyhow!("AZURE_OPENAI_API_KEY (vision.api_key) is required"));
                }
                if self.vision.api_version.is_none() {
                    return Err(anyhow!("vision.api_version is required for Azure OpenAI"));
                }
            }
            VisionProvider::OpenAI => {
                if self.vision.api_key.is_none() {
                    return Err(anyhow!("API key required for OpenAI"));
                }
            }
            VisionProvider::LMStudio => {}
        }

        if self.vision.max_tokens == 0 {
            return Err(anyhow!("vision.max_tokens must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.vision.temperature) {
            return Err(anyhow!("vision.temperature must be between 0 and 2"));
        }

        if self.speech.provider == SpeechProvider::Remote && self.speech.api_key.is_none() {
            return Err(anyhow!(
                "WHISPER_API_KEY (speech.api_key) is required for remote transcription"
            ));
        }

        if self.download.continuous_chunk_seconds == 0
            || self.download.continuous_horizon_seconds == 0
        {
            return Err(anyhow!("continuous chunk and horizon must be greater than 0"));
        }

        if !(2..=31).contains(&self.media.jpeg_quality) {
            return Err(anyhow!("media.jpeg_quality must be between 2 and 31"));
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Video Analyzer Configuration:\n\
            - Vision Provider: {:?} ({})\n\
            - Max Tokens: {}\n\
            - Default Temperature: {}\n\
            - Speech Provider: {:?} ({})\n\
            - Output Directory: {}\n\
            - Keep Segments: {}",
            self.vision.provider,
            self.vision.model,
            self.vision.max_tokens,
            self.vision.temperature,
            self.speech.provider,
            self.speech.model,
            self.output.base_dir.display(),
            self.output.keep_segments
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.base_dir = dir;
        self
    }

    pub fn with_vision_provider(mut self, provider: VisionProvider) -> Self {
        self.config.vision.provider = provider;
        self
    }

    pub fn with_vision_endpoint(mut self, endpoint: String) -> Self {
        self.config.vision.endpoint = Some(endpoint);
        self
    }

    pub fn with_vision_model(mut self, model: String) -> Self {
        self.config.vision.model = model;
        self
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.config.vision.api_key = Some(api_key);
        self
    }

    pub fn with_speech_provider(mut self, provider: SpeechProvider) -> Self {
        self.config.speech.provider = provider;
        self
    }

    pub fn with_prompts(mut self, system: String, user: String) -> Self {
        self.config.prompts = PromptConfig { system, user };
        self
    }

    pub fn keep_segments(mut self, keep: bool) -> Self {
        self.config.output.keep_segments = keep;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
