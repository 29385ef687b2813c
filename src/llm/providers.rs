use super::request::{ChatCompletionResponse, ChatRequest};
use super::{VisionConfig, VisionModel, VisionProvider, VisionResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const LMSTUDIO_CHAT_URL: &str = "http://localhost:1234/v1/chat/completions";

/// Chat-completions client for OpenAI, Azure OpenAI and LM Studio.
///
/// The three share a wire format and differ in URL, auth header, and
/// whether the model is named in the body or the deployment path.
pub struct ChatCompletionsProvider {
    config: VisionConfig,
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(flatten)]
    body: &'a ChatRequest,
}

impl ChatCompletionsProvider {
    pub fn new(config: VisionConfig) -> Result<Self> {
        let url = completions_url(&config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            client,
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn provider_name(&self) -> &'static str {
        match self.config.provider {
            VisionProvider::OpenAI => "OpenAI",
            VisionProvider::AzureOpenAI => "Azure OpenAI",
            VisionProvider::LMStudio => "LMStudio",
        }
    }
}

/// Request URL for the configured provider
pub fn completions_url(config: &VisionConfig) -> Result<String> {
    match config.provider {
        VisionProvider::OpenAI => Ok(config
            .endpoint
            .clone()
            .unwrap_or_else(|| OPENAI_CHAT_URL.to_string())),
        VisionProvider::LMStudio => Ok(config
            .endpoint
            .clone()
            .unwrap_or_else(|| LMSTUDIO_CHAT_URL.to_string())),
        VisionProvider::AzureOpenAI => {
            let base = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow!("Azure OpenAI endpoint not configured"))?;
            let version = config
                .api_version
                .as_deref()
                .ok_or_else(|| anyhow!("Azure OpenAI API version not configured"))?;
            Ok(format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base.trim_end_matches('/'),
                config.model,
                version
            ))
        }
    }
}

#[async_trait]
impl VisionModel for ChatCompletionsProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<VisionResponse> {
        let wire = WireRequest {
            model: match self.config.provider {
                VisionProvider::AzureOpenAI => None,
                _ => Some(self.config.model.as_str()),
            },
            body: request,
        };

        let builder = self.client.post(&self.url).json(&wire);
        let builder = match (&self.config.provider, &self.config.api_key) {
            (VisionProvider::AzureOpenAI, Some(key)) => builder.header("api-key", key),
            (VisionProvider::AzureOpenAI, None) => {
                return Err(anyhow!("Azure OpenAI API key not configured"))
            }
            (VisionProvider::OpenAI, None) => return Err(anyhow!("OpenAI API key not configured")),
            (_, Some(key)) => builder.bearer_auth(key),
            (VisionProvider::LMStudio, None) => builder,
        };

        debug!(
            "Sending request with {} message(s) to {} at {}",
            request.messages.len(),
            self.provider_name(),
            self.url
        );

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error {}: {}", self.provider_name(), status, text));
        }

        let parsed: ChatCompletionResponse = response.json().await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No response from {}", self.provider_name()))?
            .message
            .content
            .unwrap_or_default();

        Ok(VisionResponse {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }

    fn provider_type(&self) -> VisionProvider {
        self.config.provider
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ContentPart;

    #[test]
    fn test_azure_url() {
        let config = VisionConfig {
            endpoint: Some("https://res.openai.azure.com/".to_string()),
            model: "gpt-4o".to_string(),
            api_version: Some("2024-06-01".to_string()),
            ..VisionConfig::default()
        };
        assert_eq!(
            completions_url(&config).unwrap(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_azure_requires_endpoint() {
        assert!(completions_url(&VisionConfig::default()).is_err());
    }

    #[test]
    fn test_default_urls() {
        let openai = VisionConfig {
            provider: VisionProvider::OpenAI,
            ..VisionConfig::default()
        };
        assert_eq!(completions_url(&openai).unwrap(), OPENAI_CHAT_URL);

        let lmstudio = VisionConfig {
            provider: VisionProvider::LMStudio,
            ..VisionConfig::default()
        };
        assert_eq!(completions_url(&lmstudio).unwrap(), LMSTUDIO_CHAT_URL);
    }

    #[test]
    fn test_wire_request_names_model_outside_azure() {
        let body = ChatRequest::builder()
            .user_parts(vec![ContentPart::text("hi")])
            .build();

        let with_model = serde_json::to_value(WireRequest {
            model: Some("gpt-4o"),
            body: &body,
        })
        .unwrap();
        assert_eq!(with_model["model"], "gpt-4o");
        assert_eq!(with_model["max_tokens"], 4096);

        let azure = serde_json::to_value(WireRequest {
            model: None,
            body: &body,
        })
        .unwrap();
        assert!(azure.get("model").is_none());
        assert!(azure["messages"].is_array());
    }
}
