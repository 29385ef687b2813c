//! Run parameters handed over by the control surface

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::analyzer::Prompts;
use crate::error::{AnalyzerError, Result};
use crate::frames::{SamplingConfig, SamplingRate};
use crate::segment::SegmentationPolicy;
use crate::source::{DownloadConfig, SourceLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    File,
    Url,
}

impl SourceKind {
    /// `Url` for http(s) inputs, `File` otherwise
    pub fn infer(source: &str) -> Self {
        let lower = source.trim().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceKind::Url
        } else {
            SourceKind::File
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub source: String,
    pub kind: SourceKind,
    /// Seconds per segment; 0 analyzes the source as a whole
    pub interval_seconds: u64,
    pub sampling_rate: SamplingRate,
    pub resize_ratio: u32,
    pub save_frames: bool,
    pub transcribe: bool,
    /// `None` uses the model default
    pub temperature: Option<f32>,
    pub prompts: Prompts,
    /// Upper bound on processed seconds; 0 or `None` means no cap
    pub max_duration: Option<u64>,
    pub continuous: bool,
    /// Case-insensitive keyword to look for in each description
    pub keyword: Option<String>,
    pub save_analysis: bool,
    pub keep_segments: bool,
}

impl RunParameters {
    pub fn new(source: impl Into<String>, prompts: Prompts) -> Self {
        let source = source.into();
        Self {
            kind: SourceKind::infer(&source),
            source,
            interval_seconds: 60,
            sampling_rate: SamplingRate::default(),
            resize_ratio: 0,
            save_frames: false,
            transcribe: true,
            temperature: None,
            prompts,
            max_duration: None,
            continuous: false,
            keyword: None,
            save_analysis: true,
            keep_segments: false,
        }
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    pub fn with_sampling_rate(mut self, rate: SamplingRate) -> Self {
        self.sampling_rate = rate;
        self
    }

    pub fn with_resize_ratio(mut self, ratio: u32) -> Self {
        self.resize_ratio = ratio;
        self
    }

    pub fn with_save_frames(mut self, save: bool) -> Self {
        self.save_frames = save;
        self
    }

    pub fn with_transcription(mut self, enabled: bool) -> Self {
        self.transcribe = enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_duration(mut self, seconds: u64) -> Self {
        self.max_duration = Some(seconds);
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_save_analysis(mut self, save: bool) -> Self {
        self.save_analysis = save;
        self
    }

    pub fn with_keep_segments(mut self, keep: bool) -> Self {
        self.keep_segments = keep;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(AnalyzerError::InvalidParameters("no source given".into()));
        }
        self.sampling_rate.validate()?;
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AnalyzerError::InvalidParameters(format!(
                    "temperature must be between 0 and 2, got {}",
                    t
                )));
            }
        }
        if self.continuous && self.kind != SourceKind::Url {
            return Err(AnalyzerError::InvalidParameters(
                "continuous mode needs a URL source".into(),
            ));
        }
        self.location()?;
        Ok(())
    }

    pub fn location(&self) -> Result<SourceLocation> {
        match self.kind {
            SourceKind::File => Ok(SourceLocation::Local(PathBuf::from(self.source.trim()))),
            SourceKind::Url => {
                let url = Url::parse(self.source.trim()).map_err(|e| {
                    AnalyzerError::InvalidParameters(format!("invalid URL '{}': {}", self.source, e))
                })?;
                match url.scheme() {
                    "http" | "https" => Ok(SourceLocation::Remote(url)),
                    other => Err(AnalyzerError::InvalidParameters(format!(
                        "unsupported URL scheme '{}'",
                        other
                    ))),
                }
            }
        }
    }

    fn cap(&self) -> Option<u64> {
        self.max_duration.filter(|c| *c > 0)
    }

    pub fn policy(&self, download: &DownloadConfig) -> SegmentationPolicy {
        if self.continuous {
            let seconds = if self.interval_seconds == 0 {
                download.continuous_chunk_seconds
            } else {
                self.interval_seconds
            };
            SegmentationPolicy::Unbounded {
                seconds,
                cap: self.cap().unwrap_or(download.continuous_horizon_seconds),
            }
        } else if self.interval_seconds == 0 {
            SegmentationPolicy::Whole
        } else {
            SegmentationPolicy::FixedInterval {
                seconds: self.interval_seconds,
            }
        }
    }

    /// Cap applied to a finite source's duration; continuous runs carry it in the policy
    pub fn duration_cap(&self) -> Option<f64> {
        if self.continuous {
            None
        } else {
            self.cap().map(|c| c as f64)
        }
    }

    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            rate: self.sampling_rate,
            resize_ratio: self.resize_ratio,
            persist_frames: self.save_frames,
        }
    }
}
