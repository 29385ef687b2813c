//! Error kinds surfaced by the segment analysis pipeline

use std::path::PathBuf;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Error types for the video analyzer.
///
/// Only the setup kinds (`InvalidParameters`, `Configuration`, and a
/// `SourceResolution` raised before the first segment) abort a run. Every
/// other kind is recorded against a single segment and the run moves on.
#[derive(thiserror::Error, Debug)]
pub enum AnalyzerError {
    #[error("Source resolution failed for {source_id}: {reason}")]
    SourceResolution { source_id: String, reason: String },

    #[error("Media decode failed for {path}: {reason}")]
    MediaDecode { path: PathBuf, reason: String },

    #[error("Transcription failed for {path}: {reason}")]
    Transcription { path: PathBuf, reason: String },

    #[error("Analysis failed: {reason}")]
    Analysis { reason: String },

    #[error("Invalid run parameters: {0}")]
    InvalidParameters(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AnalyzerError {
    /// Short, stable name of the error kind for reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzerError::SourceResolution { .. } => "source_resolution",
            AnalyzerError::MediaDecode { .. } => "media_decode",
            AnalyzerError::Transcription { .. } => "transcription",
            AnalyzerError::Analysis { .. } => "analysis",
            AnalyzerError::InvalidParameters(_) => "invalid_parameters",
            AnalyzerError::Configuration(_) => "configuration",
            AnalyzerError::Io(_) => "io",
            AnalyzerError::Json(_) => "json",
            AnalyzerError::Http(_) => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_and_kind() {
        let err = AnalyzerError::SourceResolution {
            source_id: "https://example.com/v".to_string(),
            reason: "HTTP 404".to_string(),
        };
        assert_eq!(err.kind(), "source_resolution");
        assert_eq!(
            err.to_string(),
            "Source resolution failed for https://example.com/v: HTTP 404"
        );

        let io: AnalyzerError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(io.kind(), "io");
    }
}
