use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AnalyzerError;
use crate::pipeline::SegmentReport;

/// Work being done on a segment when a status or failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentStage {
    Materialize,
    SampleFrames,
    Transcribe,
    Analyze,
    Persist,
    Cleanup,
}

impl SegmentStage {
    /// Human-readable stage name
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStage::Materialize => "materialize",
            SegmentStage::SampleFrames => "sample_frames",
            SegmentStage::Transcribe => "transcribe",
            SegmentStage::Analyze => "analyze",
            SegmentStage::Persist => "persist",
            SegmentStage::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for SegmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callbacks the pipeline invokes on whatever drives it (CLI, UI, tests).
///
/// Calls are made from the pipeline task, one segment at a time.
pub trait ProgressSink: Send + Sync {
    /// A stage is about to start for `segment_id`
    fn on_status(&self, segment_id: &str, stage: SegmentStage, message: &str);

    /// A segment reached a terminal state
    fn on_segment_result(&self, report: &SegmentReport);

    /// A non-fatal error was recorded against `segment_id`
    fn on_error(&self, segment_id: &str, stage: SegmentStage, error: &AnalyzerError);
}

/// Progress sink that only writes structured log lines
#[derive(Debug, Clone, Default)]
pub struct TracingProgress {
    /// Include the transcript text in result log lines
    pub show_transcript: bool,
}

impl TracingProgress {
    pub fn new(show_transcript: bool) -> Self {
        Self { show_transcript }
    }
}

impl ProgressSink for TracingProgress {
    fn on_status(&self, segment_id: &str, stage: SegmentStage, message: &str) {
        info!("⏳ [{}] {}: {}", segment_id, stage, message);
    }

    fn on_segment_result(&self, report: &SegmentReport) {
        if self.show_transcript {
            if let Some(text) = report.transcript.as_ref().and_then(|t| t.text()) {
                info!("🎙️  [{}] Transcription: {}", report.segment_id, text);
            }
        }

        match &report.analysis {
            Some(analysis) => info!("📝 [{}] Description: {}", report.segment_id, analysis.text()),
            None => warn!("⚠️  [{}] No analysis produced", report.segment_id),
        }

        if report.keyword_hit == Some(true) {
            info!("🎯 [{}] Keyword detected", report.segment_id);
        }
    }

    fn on_error(&self, segment_id: &str, stage: SegmentStage, error: &AnalyzerError) {
        warn!("❌ [{}] {} failed: {}", segment_id, stage, error);
    }
}

/// Cooperative stop flag checked between segments.
///
/// A call already in flight is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the run to stop before the next segment
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_is_shared_between_clones() {
        let signal = StopSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_stopped());

        signal.stop();
        assert!(observer.is_stopped());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(SegmentStage::SampleFrames.to_string(), "sample_frames");
        assert_eq!(SegmentStage::Materialize.as_str(), "materialize");
    }
}
