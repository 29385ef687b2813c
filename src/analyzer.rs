//! Builds the per-segment multimodal request and turns the model reply into a result

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::AnalyzerError;
use crate::frames::Frame;
use crate::llm::{ChatRequest, ContentPart, ImageDetail, VisionModel};
use crate::transcription::Transcript;

/// Prefix of the text recorded when analysis fails
pub const ERROR_MARKER: &str = "ERROR: ";

/// System and user prompt pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompts {
    pub system: String,
    pub user: String,
}

impl Prompts {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Everything sent to the model for one segment. Built fresh per segment.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub prompts: Prompts,
    pub frames: Vec<Frame>,
    pub transcript: Option<String>,
    pub temperature: f32,
}

impl AnalysisRequest {
    pub fn new(
        prompts: Prompts,
        frames: Vec<Frame>,
        transcript: Option<&Transcript>,
        temperature: f32,
    ) -> Self {
        Self {
            prompts,
            frames,
            transcript: transcript.and_then(|t| t.text()).map(str::to_string),
            temperature,
        }
    }

    /// System message, user text message, then one multimodal user message
    /// with every frame and an optional trailing transcript part.
    pub fn to_chat_request(&self, max_tokens: u32, detail: ImageDetail) -> ChatRequest {
        let mut parts: Vec<ContentPart> = self
            .frames
            .iter()
            .map(|frame| ContentPart::image(frame.data_url(), detail))
            .collect();

        if let Some(text) = &self.transcript {
            parts.push(ContentPart::text(format!(
                "The audio transcription is: {}",
                text
            )));
        }

        ChatRequest::builder()
            .system(self.prompts.system.clone())
            .user_text(self.prompts.user.clone())
            .user_parts(parts)
            .temperature(self.temperature)
            .max_tokens(max_tokens)
            .build()
    }
}

/// Model description of a segment, or why there is none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisResult {
    Description(String),
    Failed { reason: String },
}

impl AnalysisResult {
    /// Text recorded for the segment; failures carry the error marker
    pub fn text(&self) -> String {
        match self {
            AnalysisResult::Description(text) => text.clone(),
            AnalysisResult::Failed { reason } => format!("{}{}", ERROR_MARKER, reason),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, AnalysisResult::Failed { .. })
    }
}

/// Wraps the vision model with the request ceiling and defaults
pub struct SegmentAnalyzer {
    model: Arc<dyn VisionModel>,
    max_tokens: u32,
    detail: ImageDetail,
    default_temperature: f32,
}

impl SegmentAnalyzer {
    pub fn new(
        model: Arc<dyn VisionModel>,
        max_tokens: u32,
        detail: ImageDetail,
        default_temperature: f32,
    ) -> Self {
        Self {
            model,
            max_tokens,
            detail,
            default_temperature,
        }
    }

    pub fn default_temperature(&self) -> f32 {
        self.default_temperature
    }

    /// Single attempt; a model failure becomes `AnalysisResult::Failed`
    pub async fn analyze(
        &self,
        frames: Vec<Frame>,
        transcript: Option<&Transcript>,
        prompts: &Prompts,
        temperature: Option<f32>,
    ) -> AnalysisResult {
        let request = AnalysisRequest::new(
            prompts.clone(),
            frames,
            transcript,
            temperature.unwrap_or(self.default_temperature),
        );
        self.analyze_request(&request).await
    }

    pub async fn analyze_request(&self, request: &AnalysisRequest) -> AnalysisResult {
        let chat = request.to_chat_request(self.max_tokens, self.detail);

        debug!("System prompt: {}", request.prompts.system);
        debug!("User prompt: {}", request.prompts.user);

        let started = Instant::now();
        match self.model.complete(&chat).await {
            Ok(response) => {
                info!(
                    "🤖 {} described {} frame(s) in {:.2}s{}",
                    self.model.model_name(),
                    request.frames.len(),
                    started.elapsed().as_secs_f64(),
                    response
                        .tokens_used
                        .map(|t| format!(" ({} tokens)", t))
                        .unwrap_or_default()
                );
                AnalysisResult::Description(response.content)
            }
            Err(e) => {
                let error = AnalyzerError::Analysis {
                    reason: format!("{:#}", e),
                };
                warn!("❌ {}", error);
                AnalysisResult::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }
}
