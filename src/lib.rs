//! Video Analyzer - Rust Implementation
//!
//! Splits a local or remote (possibly live) video into time segments, samples
//! frames and audio from each one, and asks a vision-language model to describe it.

pub mod analyzer;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod frames;
pub mod llm;
pub mod media;
pub mod params;
pub mod pipeline;
pub mod progress;
pub mod segment;
pub mod source;
pub mod transcription;

// Re-export main types for easy access
pub use crate::analyzer::{AnalysisRequest, AnalysisResult, Prompts, SegmentAnalyzer};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{AnalyzerError, Result};
pub use crate::frames::{Frame, FrameSampler, SamplingConfig, SamplingRate};
pub use crate::llm::{VisionConfig, VisionModel, VisionProvider};
pub use crate::media::{FfmpegBackend, MediaBackend, MediaInfo};
pub use crate::params::{RunParameters, SourceKind};
pub use crate::pipeline::{
    Collaborators, KeywordMatcher, Pipeline, PipelineSettings, RunSummary, SegmentReport,
    SegmentState,
};
pub use crate::progress::{ProgressSink, SegmentStage, StopSignal, TracingProgress};
pub use crate::segment::{Segment, SegmentationPolicy, Segmenter, TimeRange};
pub use crate::source::{SourceLocation, SourceResolver, VideoSource, YtDlpResolver};
pub use crate::transcription::{SpeechToText, Transcript, TranscriptExtractor};
