use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

use crate::segment::TimeRange;

/// Media tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// ffmpeg binary
    pub ffmpeg_bin: String,

    /// ffprobe binary
    pub ffprobe_bin: String,

    /// JPEG quality for sampled frames (2 = best, 31 = worst)
    pub jpeg_quality: u8,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            jpeg_quality: 2,
        }
    }
}

/// Stream properties of a media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds, when reported
    pub duration: Option<f64>,
    pub fps: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

/// One frame to decode from a file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGrab {
    /// Frame number in the file
    pub position: u64,
    /// Position in seconds
    pub timestamp: f64,
    /// Output size, `None` keeps the native size
    pub size: Option<(u32, u32)>,
}

/// Low-level codec operations
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Write `range` of `input` to `output`
    async fn trim(&self, input: &Path, range: TimeRange, output: &Path) -> Result<()>;

    /// Decode a single frame and return it JPEG-encoded
    async fn decode_frame(&self, input: &Path, grab: FrameGrab) -> Result<Vec<u8>>;

    /// Demux the audio track into a compressed file
    async fn extract_audio(&self, input: &Path, output: &Path, bitrate: &str) -> Result<()>;
}

/// `MediaBackend` implemented with the ffmpeg command line tools
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    config: MediaConfig,
}

impl FfmpegBackend {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Re-encode `input` to H.264/AAC MP4 at the given video bitrate
    pub async fn transcode(&self, input: &Path, output: &Path, video_bitrate: u64) -> Result<()> {
        info!(
            "🎞️  Re-encoding {} at {} kbit/s",
            input.display(),
            video_bitrate / 1000
        );

        let result = Command::new(&self.config.ffmpeg_bin)
            .arg("-y")
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(input)
            .args(["-c:v", "libx264", "-b:v"])
            .arg(video_bitrate.to_string())
            .args(["-c:a", "aac", "-movflags", "+faststart"])
            .arg(output)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.ffmpeg_bin))?;

        if !result.status.success() {
            return Err(anyhow!(
                "transcode failed for {}: {}",
                input.display(),
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.config.ffprobe_bin)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.ffprobe_bin))?;

        if !output.status.success() {
            return Err(anyhow!("ffprobe failed for {}", path.display()));
        }

        let data: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let info = parse_probe(&data)?;

        debug!(
            "📹 Probed {} ({}x{}, {:.2}fps, {} frames, {:?}s)",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.total_frames,
            info.duration
        );
        Ok(info)
    }

    async fn trim(&self, input: &Path, range: TimeRange, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.config.ffmpeg_bin);
        command
            .args(["-y", "-v", "error", "-ss"])
            .arg(format!("{:.3}", range.start))
            .arg("-i")
            .arg(input);
        if let Some(length) = range.length() {
            command.arg("-t").arg(format!("{:.3}", length));
        }
        let result = command
            .args(["-map", "0", "-c", "copy", "-avoid_negative_ts", "make_zero"])
            .arg(output)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.ffmpeg_bin))?;

        if !result.status.success() {
            return Err(anyhow!(
                "ffmpeg trim failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        Ok(())
    }

    async fn decode_frame(&self, input: &Path, grab: FrameGrab) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.config.ffmpeg_bin);
        command
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", grab.timestamp))
            .arg("-i")
            .arg(input)
            .args(["-frames:v", "1"]);
        if let Some((width, height)) = grab.size {
            command.arg("-vf").arg(format!("scale={}:{}", width, height));
        }
        let result = command
            .arg("-q:v")
            .arg(self.config.jpeg_quality.to_string())
            .args(["-f", "image2pipe", "-vcodec", "mjpeg", "-"])
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.ffmpeg_bin))?;

        if !result.status.success() || result.stdout.is_empty() {
            return Err(anyhow!(
                "no frame decoded at position {} ({:.3}s): {}",
                grab.position,
                grab.timestamp,
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        Ok(result.stdout)
    }

    async fn extract_audio(&self, input: &Path, output: &Path, bitrate: &str) -> Result<()> {
        debug!("🎵 Extracting audio from {}", input.display());

        let result = Command::new(&self.config.ffmpeg_bin)
            .args(["-y", "-v", "error", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "libmp3lame", "-b:a", bitrate])
            .arg(output)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.ffmpeg_bin))?;

        if !result.status.success() {
            return Err(anyhow!(
                "audio extraction failed for {}: {}",
                input.display(),
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        Ok(())
    }
}

/// Build `MediaInfo` from `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe(data: &serde_json::Value) -> Result<MediaInfo> {
    let streams = data["streams"]
        .as_array()
        .ok_or_else(|| anyhow!("ffprobe output has no streams"))?;

    let video = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .ok_or_else(|| anyhow!("No video stream found"))?;

    let has_audio = streams.iter().any(|s| s["codec_type"] == "audio");

    let duration = data["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| video["duration"].as_str().and_then(|s| s.parse().ok()))
        .filter(|d| d.is_finite() && *d > 0.0);

    let fps = video["avg_frame_rate"]
        .as_str()
        .and_then(parse_frame_rate)
        .or_else(|| video["r_frame_rate"].as_str().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let total_frames = video["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .or_else(|| duration.map(|d| (d * fps).round() as u64))
        .unwrap_or(0);

    Ok(MediaInfo {
        duration,
        fps,
        total_frames,
        width: video["width"].as_u64().unwrap_or(0) as u32,
        height: video["height"].as_u64().unwrap_or(0) as u32,
        has_audio,
    })
}

/// Parse an ffprobe rate such as `30000/1001` or `25`
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Video bitrate (bit/s) that keeps a clip of `duration` seconds under `target_mb`
pub fn target_video_bitrate(target_mb: u64, duration: f64) -> u64 {
    if duration <= 0.0 {
        return 0;
    }
    (target_mb as f64 * 8.0 * 1024.0 * 1024.0 / duration * 0.6) as u64
}
