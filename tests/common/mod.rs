//! In-memory collaborators for integration tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use video_analyzer_rust::llm::{ChatRequest, VisionProvider, VisionResponse};
use video_analyzer_rust::media::{FrameGrab, MediaInfo};
use video_analyzer_rust::source::SourceInfo;
use video_analyzer_rust::{
    AnalyzerError, Collaborators, MediaBackend, Pipeline, PipelineSettings, ProgressSink,
    SegmentReport, SegmentStage, SourceResolver, SpeechToText, StopSignal, TimeRange, VisionModel,
};

/// Fake media files hold their duration in seconds as text
pub fn write_video(path: &Path, seconds: f64) {
    std::fs::write(path, seconds.to_string()).unwrap();
}

pub struct FakeMedia {
    pub fps: f64,
    /// Range starts whose trim fails
    pub fail_trim_at: Vec<f64>,
    /// Frame positions at or past this fail to decode
    pub fail_decode_from: Option<u64>,
    pub fail_audio: bool,
    pub trims: Mutex<Vec<TimeRange>>,
    pub decoded: AtomicUsize,
}

impl Default for FakeMedia {
    fn default() -> Self {
        Self {
            fps: 30.0,
            fail_trim_at: Vec::new(),
            fail_decode_from: None,
            fail_audio: false,
            trims: Mutex::new(Vec::new()),
            decoded: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MediaBackend for FakeMedia {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let content = tokio::fs::read_to_string(path).await?;
        let duration: f64 = content.trim().parse()?;
        Ok(MediaInfo {
            duration: Some(duration),
            fps: self.fps,
            total_frames: (duration * self.fps).round() as u64,
            width: 1280,
            height: 720,
            has_audio: !self.fail_audio,
        })
    }

    async fn trim(&self, _input: &Path, range: TimeRange, output: &Path) -> Result<()> {
        self.trims.lock().unwrap().push(range);
        if self.fail_trim_at.contains(&range.start) {
            return Err(anyhow!("corrupt stream at {}", range.start));
        }
        let length = range.length().ok_or_else(|| anyhow!("open range"))?;
        tokio::fs::write(output, length.to_string()).await?;
        Ok(())
    }

    async fn decode_frame(&self, _input: &Path, grab: FrameGrab) -> Result<Vec<u8>> {
        if let Some(limit) = self.fail_decode_from {
            if grab.position >= limit {
                return Err(anyhow!("decode error at {}", grab.position));
            }
        }
        self.decoded.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xff, 0xd8, (grab.position % 256) as u8])
    }

    async fn extract_audio(&self, _input: &Path, output: &Path, _bitrate: &str) -> Result<()> {
        if self.fail_audio {
            return Err(anyhow!("no audio stream"));
        }
        tokio::fs::write(output, b"mp3").await?;
        Ok(())
    }
}

pub struct FakeResolver {
    pub title: String,
    pub duration: Option<f64>,
    /// Range starts whose download fails
    pub fail_download_at: Vec<f64>,
    pub downloads: Mutex<Vec<Option<TimeRange>>>,
}

impl FakeResolver {
    pub fn new(title: &str, duration: Option<f64>) -> Self {
        Self {
            title: title.to_string(),
            duration,
            fail_download_at: Vec::new(),
            downloads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SourceResolver for FakeResolver {
    async fn resolve(&self, _url: &Url) -> Result<SourceInfo> {
        Ok(SourceInfo {
            title: self.title.clone(),
            duration: self.duration,
        })
    }

    async fn download(
        &self,
        _url: &Url,
        range: Option<TimeRange>,
        output_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf> {
        self.downloads.lock().unwrap().push(range);
        if let Some(range) = range {
            if self.fail_download_at.contains(&range.start) {
                return Err(anyhow!("HTTP 404"));
            }
        }
        let length = match range {
            Some(r) => r.length().unwrap_or(0.0),
            None => self.duration.unwrap_or(30.0),
        };
        let path = output_dir.join(format!("{}.mkv", file_stem));
        tokio::fs::write(&path, length.to_string()).await?;
        Ok(path)
    }
}

pub struct FakeSpeech {
    pub text: String,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, audio: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !audio.exists() {
            return Err(anyhow!("missing audio file"));
        }
        if self.fail {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "fake-speech"
    }
}

pub struct FakeVision {
    /// 1-based call numbers that fail
    pub fail_on: Vec<usize>,
    pub reply: String,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl FakeVision {
    pub fn new(reply: &str) -> Self {
        Self {
            fail_on: Vec::new(),
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: vec![call],
            ..Self::new("A quiet street")
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for FakeVision {
    async fn complete(&self, request: &ChatRequest) -> Result<VisionResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_on.contains(&call) {
            return Err(anyhow!("429 quota exceeded"));
        }
        Ok(VisionResponse {
            content: format!("{} (call {})", self.reply, call),
            tokens_used: Some(100),
        })
    }

    fn provider_type(&self) -> VisionProvider {
        VisionProvider::LMStudio
    }

    fn model_name(&self) -> &str {
        "fake-vision"
    }
}

/// Records callbacks; optionally stops the run after N results
#[derive(Default)]
pub struct RecordingProgress {
    pub statuses: Mutex<Vec<(String, SegmentStage)>>,
    pub results: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<(String, SegmentStage, String)>>,
    pub stop_after: Option<(usize, StopSignal)>,
}

impl ProgressSink for RecordingProgress {
    fn on_status(&self, segment_id: &str, stage: SegmentStage, _message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push((segment_id.to_string(), stage));
    }

    fn on_segment_result(&self, report: &SegmentReport) {
        let mut results = self.results.lock().unwrap();
        results.push(report.segment_id.clone());
        if let Some((limit, signal)) = &self.stop_after {
            if results.len() >= *limit {
                signal.stop();
            }
        }
    }

    fn on_error(&self, segment_id: &str, stage: SegmentStage, error: &AnalyzerError) {
        self.errors.lock().unwrap().push((
            segment_id.to_string(),
            stage,
            error.kind().to_string(),
        ));
    }
}

pub struct Harness {
    pub media: Arc<FakeMedia>,
    pub resolver: Arc<FakeResolver>,
    pub speech: Option<Arc<FakeSpeech>>,
    pub vision: Arc<FakeVision>,
    pub progress: Arc<RecordingProgress>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            media: Arc::new(FakeMedia::default()),
            resolver: Arc::new(FakeResolver::new("Remote clip", Some(125.0))),
            speech: Some(Arc::new(FakeSpeech::new("hello from the stage"))),
            vision: Arc::new(FakeVision::new("A guitarist plays an electric guitar")),
            progress: Arc::new(RecordingProgress::default()),
        }
    }

    pub fn pipeline(&self, output_root: &Path) -> Pipeline {
        let collaborators = Collaborators {
            media: self.media.clone(),
            resolver: self.resolver.clone(),
            speech: self
                .speech
                .clone()
                .map(|s| s as Arc<dyn SpeechToText>),
            vision: self.vision.clone(),
        };
        let settings = PipelineSettings {
            output_root: output_root.to_path_buf(),
            ..PipelineSettings::default()
        };
        Pipeline::new(collaborators, settings, self.progress.clone())
    }
}

/// Regular files directly inside `dir`
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}
