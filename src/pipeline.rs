use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::analyzer::{AnalysisResult, Prompts, SegmentAnalyzer};
use crate::artifacts::{write_analysis, RunLayout};
use crate::config::Config;
use crate::error::{AnalyzerError, Result};
use crate::frames::{Frame, FrameSampler, SamplingConfig};
use crate::llm::{create_vision_model, ImageDetail, VisionModel};
use crate::media::{FfmpegBackend, MediaBackend};
use crate::params::RunParameters;
use crate::progress::{ProgressSink, SegmentStage, StopSignal};
use crate::segment::{Segment, SegmentFailure, SegmentationPolicy, Segmenter, TimeRange};
use crate::source::{DownloadConfig, SourceResolver, VideoSource, YtDlpResolver};
use crate::transcription::{create_speech_to_text, SpeechToText, Transcript, TranscriptExtractor};

/// Per-segment lifecycle.
///
/// `Materialized -> (FramesSampled -> (TranscriptAttempted)) -> Analyzed -> (Persisted) -> Cleaned`,
/// or `Failed` when the range could not be materialized. A segment without
/// usable frames skips straight to `Analyzed` with an error result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentState {
    Materialized,
    FramesSampled,
    TranscriptAttempted,
    Analyzed,
    Persisted,
    Cleaned,
    Failed(SegmentStage),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub sampling: Option<Duration>,
    pub transcription: Option<Duration>,
    pub analysis: Option<Duration>,
}

/// What happened to one planned range
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub index: usize,
    pub segment_id: String,
    pub range: TimeRange,
    pub states: Vec<SegmentState>,
    pub frames_sampled: usize,
    pub transcript: Option<Transcript>,
    pub analysis: Option<AnalysisResult>,
    pub keyword_hit: Option<bool>,
    pub artifact_path: Option<PathBuf>,
    pub timings: StageTimings,
    pub errors: Vec<String>,
}

impl SegmentReport {
    fn new(index: usize, segment_id: String, range: TimeRange) -> Self {
        Self {
            index,
            segment_id,
            range,
            states: Vec::new(),
            frames_sampled: 0,
            transcript: None,
            analysis: None,
            keyword_hit: None,
            artifact_path: None,
            timings: StageTimings::default(),
            errors: Vec::new(),
        }
    }

    pub fn final_state(&self) -> Option<SegmentState> {
        self.states.last().copied()
    }

    /// Stage at which the segment was abandoned, if any
    pub fn failed_stage(&self) -> Option<SegmentStage> {
        match self.final_state() {
            Some(SegmentState::Failed(stage)) => Some(stage),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed_stage().is_some()
    }

    pub fn reached(&self, state: SegmentState) -> bool {
        self.states.contains(&state)
    }
}

/// Case-insensitive keyword search over descriptions
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keyword: String,
    pattern: Regex,
}

impl KeywordMatcher {
    pub fn new(keyword: &str) -> Result<Self> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(AnalyzerError::InvalidParameters("keyword is empty".into()));
        }
        let pattern = RegexBuilder::new(&regex::escape(keyword))
            .case_insensitive(true)
            .build()
            .map_err(|e| AnalyzerError::InvalidParameters(format!("bad keyword: {}", e)))?;

        Ok(Self {
            keyword: keyword.to_string(),
            pattern,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// In-progress aggregate of a run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub source: VideoSource,
    pub policy: SegmentationPolicy,
    pub sampling: SamplingConfig,
    pub prompts: Prompts,
    pub reports: Vec<SegmentReport>,
}

impl PipelineRun {
    pub fn new(
        source: VideoSource,
        policy: SegmentationPolicy,
        sampling: SamplingConfig,
        prompts: Prompts,
    ) -> Self {
        Self {
            source,
            policy,
            sampling,
            prompts,
            reports: Vec::new(),
        }
    }

    pub fn record(&mut self, report: SegmentReport) {
        self.reports.push(report);
    }

    pub fn finish(
        self,
        started_at: DateTime<Utc>,
        total_time: Duration,
        stopped_early: bool,
    ) -> RunSummary {
        let reports = &self.reports;
        let analyzed = count(reports, |r| matches!(r.analysis, Some(AnalysisResult::Description(_))));
        let failed_analyses =
            count(reports, |r| matches!(r.analysis, Some(AnalysisResult::Failed { .. })));
        let skipped = count(reports, |r| r.failed_stage() == Some(SegmentStage::Materialize));
        let keyword_hits = count(reports, |r| r.keyword_hit == Some(true));

        RunSummary {
            source: self.source,
            policy: self.policy,
            started_at,
            finished_at: Utc::now(),
            total_time,
            analyzed,
            failed_analyses,
            skipped,
            keyword_hits,
            stopped_early,
            segments: self.reports,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: VideoSource,
    pub policy: SegmentationPolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_time: Duration,
    pub segments: Vec<SegmentReport>,
    /// Segments with a model description
    pub analyzed: usize,
    /// Segments whose result is an error marker
    pub failed_analyses: usize,
    /// Ranges that could not be materialized
    pub skipped: usize,
    pub keyword_hits: usize,
    pub stopped_early: bool,
}

impl RunSummary {
    pub fn summary(&self) -> String {
        format!(
            "Video Analysis Summary:\n\
            - Source: {}\n\
            - Segmentation: {}\n\
            - Segments: {}\n\
            - Analyzed: {}\n\
            - Analysis errors: {}\n\
            - Skipped: {}\n\
            - Keyword hits: {}\n\
            - Stopped early: {}\n\
            - Total time: {:.2}s",
            self.source.title,
            self.policy,
            self.segments.len(),
            self.analyzed,
            self.failed_analyses,
            self.skipped,
            self.keyword_hits,
            self.stopped_early,
            self.total_time.as_secs_f64()
        )
    }
}

/// External services the pipeline drives
pub struct Collaborators {
    pub media: Arc<dyn MediaBackend>,
    pub resolver: Arc<dyn SourceResolver>,
    /// `None` disables transcription entirely
    pub speech: Option<Arc<dyn SpeechToText>>,
    pub vision: Arc<dyn VisionModel>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_root: PathBuf,
    pub download: DownloadConfig,
    pub max_tokens: u32,
    pub image_detail: ImageDetail,
    pub default_temperature: f32,
    pub audio_bitrate: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./output"),
            download: DownloadConfig::default(),
            max_tokens: 4096,
            image_detail: ImageDetail::Auto,
            default_temperature: 0.5,
            audio_bitrate: "32k".to_string(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_root: config.output.base_dir.clone(),
            download: config.download.clone(),
            max_tokens: config.vision.max_tokens,
            image_detail: config.vision.image_detail,
            default_temperature: config.vision.temperature,
            audio_bitrate: config.speech.audio_bitrate.clone(),
        }
    }
}

/// Sequential segment-by-segment orchestrator
pub struct Pipeline {
    media: Arc<dyn MediaBackend>,
    resolver: Arc<dyn SourceResolver>,
    sampler: FrameSampler,
    transcriber: Option<TranscriptExtractor>,
    analyzer: SegmentAnalyzer,
    progress: Arc<dyn ProgressSink>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        collaborators: Collaborators,
        settings: PipelineSettings,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        let Collaborators {
            media,
            resolver,
            speech,
            vision,
        } = collaborators;

        let transcriber = speech.map(|speech| {
            TranscriptExtractor::new(media.clone(), speech, settings.audio_bitrate.clone())
        });
        let analyzer = SegmentAnalyzer::new(
            vision,
            settings.max_tokens,
            settings.image_detail,
            settings.default_temperature,
        );

        Self {
            sampler: FrameSampler::new(media.clone()),
            media,
            resolver,
            transcriber,
            analyzer,
            progress,
            settings,
        }
    }

    /// Wire ffmpeg, yt-dlp and the configured model services
    pub fn from_config(config: &Config, progress: Arc<dyn ProgressSink>) -> anyhow::Result<Self> {
        let collaborators = Collaborators {
            media: Arc::new(FfmpegBackend::new(config.media.clone())),
            resolver: Arc::new(YtDlpResolver::new(config.download.clone())),
            speech: create_speech_to_text(&config.speech)?,
            vision: create_vision_model(&config.vision)?,
        };
        Ok(Self::new(
            collaborators,
            PipelineSettings::from_config(config),
            progress,
        ))
    }

    /// Process every segment of the source in order.
    ///
    /// Only invalid parameters or an unresolvable source fail the run; every
    /// per-segment problem is recorded in the summary.
    pub async fn run(&self, params: &RunParameters, stop: StopSignal) -> Result<RunSummary> {
        params.validate()?;
        let policy = params.policy(&self.settings.download);
        policy.validate()?;
        let sampling = params.sampling();
        let keyword = params
            .keyword
            .as_deref()
            .map(KeywordMatcher::new)
            .transpose()?;

        let started_at = Utc::now();
        let clock = Instant::now();

        info!("🚀 Starting analysis of {}", params.source);
        let source =
            VideoSource::open(params.location()?, self.resolver.as_ref(), self.media.as_ref())
                .await?;

        let layout = RunLayout::new(&self.settings.output_root, &source.title);
        layout.create().await?;

        let mut segmenter = Segmenter::new(
            source.clone(),
            policy,
            params.duration_cap(),
            layout.segments_dir.clone(),
            self.media.clone(),
            self.resolver.clone(),
            stop.clone(),
        );
        let mut run = PipelineRun::new(source, policy, sampling, params.prompts.clone());

        while let Some(next) = segmenter.advance().await {
            let report = match next {
                Err(failure) => self.skipped(failure),
                Ok(segment) => {
                    let mut report = self
                        .process_segment(&segment, params, &run.sampling, &layout, keyword.as_ref())
                        .await;
                    self.cleanup(&mut segmenter, &segment, params.keep_segments, &mut report)
                        .await;
                    report
                }
            };

            self.progress.on_segment_result(&report);
            run.record(report);
        }

        let stopped_early = stop.is_stopped() && segmenter.remaining() > 0;
        let summary = run.finish(started_at, clock.elapsed(), stopped_early);
        info!(
            "🎉 Finished {}: {} analyzed, {} analysis error(s), {} skipped in {:.2}s",
            summary.source.title,
            summary.analyzed,
            summary.failed_analyses,
            summary.skipped,
            summary.total_time.as_secs_f64()
        );
        Ok(summary)
    }

    fn skipped(&self, failure: SegmentFailure) -> SegmentReport {
        let id = format!("segment_{}", failure.range.label());
        let mut report = SegmentReport::new(failure.index, id, failure.range);
        self.fail(&mut report, SegmentStage::Materialize, failure.error);
        report
    }

    fn fail(&self, report: &mut SegmentReport, stage: SegmentStage, error: AnalyzerError) {
        self.progress.on_error(&report.segment_id, stage, &error);
        report.errors.push(error.to_string());
        report.states.push(SegmentState::Failed(stage));
    }

    async fn process_segment(
        &self,
        segment: &Segment,
        params: &RunParameters,
        sampling: &SamplingConfig,
        layout: &RunLayout,
        keyword: Option<&KeywordMatcher>,
    ) -> SegmentReport {
        let id = segment.stem();
        let mut report = SegmentReport::new(segment.index, id.clone(), segment.range);
        report.states.push(SegmentState::Materialized);
        info!("🎬 Segment {} {} ({})", segment.index + 1, segment.range, id);

        let analysis = match self
            .sample_frames(segment, sampling, layout, &mut report)
            .await
        {
            Ok(frames) => {
                self.transcribe(segment, params, layout, &mut report).await;
                self.describe(frames, params, &mut report).await
            }
            Err(error) => {
                self.progress
                    .on_error(&id, SegmentStage::SampleFrames, &error);
                report.errors.push(error.to_string());
                AnalysisResult::Failed {
                    reason: error.to_string(),
                }
            }
        };

        report.keyword_hit = keyword.map(|matcher| match &analysis {
            AnalysisResult::Description(text) => matcher.is_match(text),
            AnalysisResult::Failed { .. } => false,
        });
        let text = analysis.text();
        report.analysis = Some(analysis);
        report.states.push(SegmentState::Analyzed);

        if params.save_analysis {
            self.progress
                .on_status(&id, SegmentStage::Persist, "saving analysis");
            let path = layout.analysis_path(&id);
            match write_analysis(&path, &text).await {
                Ok(()) => {
                    report.artifact_path = Some(path);
                    report.states.push(SegmentState::Persisted);
                }
                Err(error) => {
                    self.progress.on_error(&id, SegmentStage::Persist, &error);
                    report.errors.push(error.to_string());
                }
            }
        }

        info!(
            "⏱️  [{}] frames {:.2}s, transcript {:.2}s, analysis {:.2}s",
            id,
            secs(report.timings.sampling),
            secs(report.timings.transcription),
            secs(report.timings.analysis)
        );
        report
    }

    /// Sample frames; an empty sample is reported as a decode error
    async fn sample_frames(
        &self,
        segment: &Segment,
        sampling: &SamplingConfig,
        layout: &RunLayout,
        report: &mut SegmentReport,
    ) -> Result<Vec<Frame>> {
        self.progress.on_status(
            &report.segment_id,
            SegmentStage::SampleFrames,
            "extracting frames",
        );
        let frames_dir = sampling
            .persist_frames
            .then(|| layout.frames_dir_for(&report.segment_id));
        let started = Instant::now();
        let frames = self
            .sampler
            .sample(&segment.path, sampling, frames_dir.as_deref())
            .await?;
        report.timings.sampling = Some(started.elapsed());

        if frames.is_empty() {
            return Err(AnalyzerError::MediaDecode {
                path: segment.path.clone(),
                reason: "no frames could be decoded".to_string(),
            });
        }
        report.frames_sampled = frames.len();
        report.states.push(SegmentState::FramesSampled);
        Ok(frames)
    }

    async fn transcribe(
        &self,
        segment: &Segment,
        params: &RunParameters,
        layout: &RunLayout,
        report: &mut SegmentReport,
    ) {
        if !params.transcribe {
            return;
        }
        let Some(transcriber) = &self.transcriber else {
            debug!("No speech-to-text backend configured, skipping transcript");
            return;
        };

        self.progress.on_status(
            &report.segment_id,
            SegmentStage::Transcribe,
            "transcribing audio",
        );
        let started = Instant::now();
        let transcript = transcriber
            .transcribe(&segment.path, &layout.segments_dir)
            .await;
        report.timings.transcription = Some(started.elapsed());

        if let Transcript::Unavailable { reason } = &transcript {
            let error = AnalyzerError::Transcription {
                path: segment.path.clone(),
                reason: reason.clone(),
            };
            self.progress
                .on_error(&report.segment_id, SegmentStage::Transcribe, &error);
            report.errors.push(error.to_string());
        }
        report.transcript = Some(transcript);
        report.states.push(SegmentState::TranscriptAttempted);
    }

    async fn describe(
        &self,
        frames: Vec<Frame>,
        params: &RunParameters,
        report: &mut SegmentReport,
    ) -> AnalysisResult {
        self.progress.on_status(
            &report.segment_id,
            SegmentStage::Analyze,
            "describing segment",
        );
        let started = Instant::now();
        let analysis = self
            .analyzer
            .analyze(
                frames,
                report.transcript.as_ref(),
                &params.prompts,
                params.temperature,
            )
            .await;
        report.timings.analysis = Some(started.elapsed());

        if let AnalysisResult::Failed { reason } = &analysis {
            let error = AnalyzerError::Analysis {
                reason: reason.clone(),
            };
            self.progress
                .on_error(&report.segment_id, SegmentStage::Analyze, &error);
            report.errors.push(error.to_string());
        }
        analysis
    }

    async fn cleanup(
        &self,
        segmenter: &mut Segmenter,
        segment: &Segment,
        keep: bool,
        report: &mut SegmentReport,
    ) {
        match segmenter.release(segment, keep).await {
            Ok(()) => {
                if !report.is_failed() {
                    report.states.push(SegmentState::Cleaned);
                }
            }
            Err(error) => {
                warn!("Failed to remove {}: {}", segment.path.display(), error);
                self.progress
                    .on_error(&report.segment_id, SegmentStage::Cleanup, &error);
                report.errors.push(error.to_string());
            }
        }
    }
}

fn count(reports: &[SegmentReport], predicate: impl Fn(&SegmentReport) -> bool) -> usize {
    reports.iter().filter(|r| predicate(r)).count()
}

fn secs(duration: Option<Duration>) -> f64 {
    duration.map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_matcher() {
        let matcher = KeywordMatcher::new("electric guitar").unwrap();
        assert!(matcher.is_match("A man plays an Electric Guitar on stage"));
        assert!(!matcher.is_match("An acoustic guitar"));
        assert_eq!(matcher.keyword(), "electric guitar");

        let literal = KeywordMatcher::new("c++ (v2)").unwrap();
        assert!(literal.is_match("written in C++ (v2)"));

        assert!(KeywordMatcher::new("  ").is_err());
    }

    #[test]
    fn test_report_states() {
        let mut report = SegmentReport::new(0, "s".into(), TimeRange::new(0.0, 60.0));
        report.states.push(SegmentState::Materialized);
        assert!(!report.is_failed());

        report
            .states
            .push(SegmentState::Failed(SegmentStage::Materialize));
        assert_eq!(report.failed_stage(), Some(SegmentStage::Materialize));
        assert!(report.reached(SegmentState::Materialized));
        assert!(!report.reached(SegmentState::Analyzed));
    }
}
