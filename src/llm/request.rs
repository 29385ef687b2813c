//! Typed chat-completion payloads

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// How much image resolution the model should spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

/// One part of a multimodal message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>, detail: ImageDetail) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// Provider-independent chat request; providers add routing fields such as the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::default()
    }

    /// All image parts, in order
    pub fn image_parts(&self) -> impl Iterator<Item = &ImageUrl> {
        self.parts().filter_map(|part| match part {
            ContentPart::ImageUrl { image_url } => Some(image_url),
            ContentPart::Text { .. } => None,
        })
    }

    /// Parts of every multimodal message, in order
    pub fn parts(&self) -> impl Iterator<Item = &ContentPart> {
        self.messages.iter().flat_map(|m| match &m.content {
            MessageContent::Parts(parts) => parts.iter(),
            MessageContent::Text(_) => (&[] as &[ContentPart]).iter(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequestBuilder {
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

impl Default for ChatRequestBuilder {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.5,
            max_tokens: 4096,
        }
    }
}

impl ChatRequestBuilder {
    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        });
        self
    }

    pub fn user_text(mut self, text: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        });
        self
    }

    pub fn user_parts(mut self, parts: Vec<ContentPart>) -> Self {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: MessageContent::Parts(parts),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn build(self) -> ChatRequest {
        ChatRequest {
            messages: self.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let request = ChatRequest::builder()
            .system("You are a narrator")
            .user_text("Describe the video")
            .user_parts(vec![
                ContentPart::image("data:image/jpeg;base64,AAAA", ImageDetail::Auto),
                ContentPart::text("The audio transcription is: hi"),
            ])
            .temperature(0.25)
            .max_tokens(100)
            .build();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "messages": [
                    { "role": "system", "content": "You are a narrator" },
                    { "role": "user", "content": "Describe the video" },
                    { "role": "user", "content": [
                        { "type": "image_url",
                          "image_url": { "url": "data:image/jpeg;base64,AAAA", "detail": "auto" } },
                        { "type": "text", "text": "The audio transcription is: hi" }
                    ]}
                ],
                "temperature": 0.25,
                "max_tokens": 100
            })
        );
        assert_eq!(request.image_parts().count(), 1);
    }

    #[test]
    fn test_builder_defaults() {
        let request = ChatRequest::builder().user_text("hi").build();
        assert_eq!(request.temperature, 0.5);
        assert_eq!(request.max_tokens, 4096);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"A cat."}}],"usage":{"total_tokens":42}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("A cat."));
        assert_eq!(parsed.usage.map(|u| u.total_tokens), Some(42));
    }
}
