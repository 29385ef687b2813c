pub mod providers;
pub mod request;

pub use request::{
    ChatMessage, ChatRequest, ChatRequestBuilder, ContentPart, ImageDetail, ImageUrl,
    MessageContent, Role,
};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Vision-language model provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisionProvider {
    OpenAI,
    AzureOpenAI,
    LMStudio,
}

/// Vision model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    pub provider: VisionProvider,

    /// Full chat-completions URL (OpenAI, LM Studio) or Azure resource base URL
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    /// Model name, or deployment name for Azure
    pub model: String,

    /// Azure API version
    pub api_version: Option<String>,

    /// Token ceiling per response
    pub max_tokens: u32,

    /// Used when a run does not set its own temperature
    pub temperature: f32,

    pub timeout_seconds: u64,

    /// Detail level attached to every image part
    pub image_detail: ImageDetail,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: VisionProvider::AzureOpenAI,
            endpoint: None,
            api_key: None,
            model: "gpt-4o".to_string(),
            api_version: Some("2024-06-01".to_string()),
            max_tokens: 4096,
            temperature: 0.5,
            timeout_seconds: 300,
            image_detail: ImageDetail::Auto,
        }
    }
}

/// Model response
#[derive(Debug, Clone)]
pub struct VisionResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Vision-language model collaborator
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<VisionResponse>;
    fn provider_type(&self) -> VisionProvider;
    fn model_name(&self) -> &str;
}

/// Create a vision model client from configuration
pub fn create_vision_model(config: &VisionConfig) -> Result<Arc<dyn VisionModel>> {
    Ok(Arc::new(providers::ChatCompletionsProvider::new(config.clone())?))
}
