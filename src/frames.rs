//! Still-frame sampling from segment files

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AnalyzerError, Result};
use crate::media::{FrameGrab, MediaBackend};

/// Target sampling frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SamplingRate {
    FramesPerSecond(f64),
    SecondsPerFrame(f64),
}

impl SamplingRate {
    fn value(&self) -> f64 {
        match *self {
            SamplingRate::FramesPerSecond(v) | SamplingRate::SecondsPerFrame(v) => v,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let value = self.value();
        if !value.is_finite() || value <= 0.0 {
            return Err(AnalyzerError::InvalidParameters(format!(
                "sampling rate must be greater than 0, got {}",
                value
            )));
        }
        Ok(())
    }

    /// Frames to skip between samples for a video at `native_fps`; never below 1
    pub fn stride(&self, native_fps: f64) -> u64 {
        let raw = match *self {
            SamplingRate::FramesPerSecond(target) if target > 0.0 => native_fps / target,
            SamplingRate::SecondsPerFrame(seconds) => native_fps * seconds,
            SamplingRate::FramesPerSecond(_) => 1.0,
        };
        if raw.is_finite() && raw >= 1.0 {
            raw.floor() as u64
        } else {
            1
        }
    }
}

impl Default for SamplingRate {
    fn default() -> Self {
        SamplingRate::SecondsPerFrame(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub rate: SamplingRate,
    /// Divide both frame dimensions by this; 0 disables resizing
    pub resize_ratio: u32,
    /// Also write every sampled frame to disk
    pub persist_frames: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate: SamplingRate::default(),
            resize_ratio: 0,
            persist_frames: false,
        }
    }
}

/// A sampled still image, JPEG-encoded
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 1-based ordinal within the segment
    pub ordinal: usize,
    /// Frame number in the segment file
    pub position: u64,
    /// Seconds from the segment start
    pub timestamp: f64,
    pub jpeg: Vec<u8>,
}

impl Frame {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }

    /// `data:` URL suitable for an image part of a chat request
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64())
    }
}

/// Frame dimensions after dividing by `ratio`; ratios 0 and 1 keep the size
pub fn scaled_dimensions(width: u32, height: u32, ratio: u32) -> (u32, u32) {
    if ratio <= 1 {
        return (width, height);
    }
    ((width / ratio).max(1), (height / ratio).max(1))
}

/// Positions `0, stride, 2*stride, ...` below `total_frames`
pub fn frame_positions(total_frames: u64, stride: u64) -> impl Iterator<Item = u64> {
    (0..total_frames).step_by(stride.max(1) as usize)
}

/// File name of a persisted frame
pub fn frame_file_name(stem: &str, ordinal: usize) -> String {
    format!("{}_frame_{}.jpg", stem, ordinal)
}

/// Decodes frames from a segment at a configured rate
pub struct FrameSampler {
    media: Arc<dyn MediaBackend>,
}

impl FrameSampler {
    pub fn new(media: Arc<dyn MediaBackend>) -> Self {
        Self { media }
    }

    /// Sample `segment` according to `config`.
    ///
    /// A decode failure stops sampling and returns the frames gathered so far.
    /// Frames are written under `persist_dir` when it is given.
    pub async fn sample(
        &self,
        segment: &Path,
        config: &SamplingConfig,
        persist_dir: Option<&Path>,
    ) -> Result<Vec<Frame>> {
        let info = self
            .media
            .probe(segment)
            .await
            .map_err(|e| AnalyzerError::MediaDecode {
                path: segment.to_path_buf(),
                reason: format!("{:#}", e),
            })?;

        if info.fps <= 0.0 || info.total_frames == 0 {
            return Err(AnalyzerError::MediaDecode {
                path: segment.to_path_buf(),
                reason: "no decodable video frames".to_string(),
            });
        }

        let stride = config.rate.stride(info.fps);
        let size = (config.resize_ratio > 1)
            .then(|| scaled_dimensions(info.width, info.height, config.resize_ratio));
        let stem = segment
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "segment".to_string());

        debug!(
            "🖼️  Sampling {} every {} frame(s) of {} at {:.2}fps",
            segment.display(),
            stride,
            info.total_frames,
            info.fps
        );

        let persist_dir = match persist_dir {
            Some(dir) => match tokio::fs::create_dir_all(dir).await {
                Ok(()) => Some(dir.to_path_buf()),
                Err(e) => {
                    warn!("Cannot create frame directory {}: {}", dir.display(), e);
                    None
                }
            },
            None => None,
        };

        let mut frames = Vec::new();
        for position in frame_positions(info.total_frames, stride) {
            let grab = FrameGrab {
                position,
                timestamp: position as f64 / info.fps,
                size,
            };

            let jpeg = match self.media.decode_frame(segment, grab).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        "⚠️  Frame decode stopped at position {} of {}: {:#}",
                        position,
                        segment.display(),
                        e
                    );
                    break;
                }
            };

            let frame = Frame {
                ordinal: frames.len() + 1,
                position,
                timestamp: grab.timestamp,
                jpeg,
            };

            if let Some(dir) = &persist_dir {
                let path: PathBuf = dir.join(frame_file_name(&stem, frame.ordinal));
                if let Err(e) = tokio::fs::write(&path, &frame.jpeg).await {
                    warn!("Failed to save frame {}: {}", path.display(), e);
                }
            }

            frames.push(frame);
        }

        info!("🖼️  Extracted {} frame(s) from {}", frames.len(), segment.display());
        Ok(frames)
    }
}
