use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use crate::error::AnalyzerError;
use crate::media::MediaBackend;
use crate::segment::{format_seconds, TimeRange};

/// Remote acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// yt-dlp binary
    pub ytdlp_bin: String,

    /// Format selector passed to `-f`
    pub format: String,

    /// Re-encode around cut points so ranged downloads start on a keyframe
    pub force_keyframes_at_cuts: bool,

    /// Upper bound for continuous sources when no max duration is given (seconds)
    pub continuous_horizon_seconds: u64,

    /// Chunk size for continuous sources when the interval is 0 (seconds)
    pub continuous_chunk_seconds: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: "yt-dlp".to_string(),
            format: "(bestvideo[vcodec^=av01]/bestvideo[vcodec^=vp9]/bestvideo)+bestaudio/best"
                .to_string(),
            force_keyframes_at_cuts: true,
            continuous_horizon_seconds: 48 * 60 * 60,
            continuous_chunk_seconds: 180,
        }
    }
}

/// Where a video comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceLocation {
    Local(PathBuf),
    Remote(Url),
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLocation::Local(path) => write!(f, "{}", path.display()),
            SourceLocation::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// A resolved input video. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSource {
    pub location: SourceLocation,
    pub title: String,
    /// Total duration in seconds, `None` for live or unknown sources
    pub duration: Option<f64>,
}

impl VideoSource {
    pub fn is_remote(&self) -> bool {
        matches!(self.location, SourceLocation::Remote(_))
    }

    /// Stem used for naming files derived from this source
    pub fn stem(&self) -> String {
        match &self.location {
            SourceLocation::Local(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| sanitize_name(&self.title)),
            SourceLocation::Remote(_) => sanitize_name(&self.title),
        }
    }

    /// Resolve a location into a source, probing or querying for its duration.
    ///
    /// Failure here aborts the run before any segment is processed.
    pub async fn open(
        location: SourceLocation,
        resolver: &dyn SourceResolver,
        media: &dyn MediaBackend,
    ) -> crate::error::Result<Self> {
        match location {
            SourceLocation::Local(path) => {
                if !path.exists() {
                    return Err(AnalyzerError::SourceResolution {
                        source_id: path.display().to_string(),
                        reason: "file does not exist".to_string(),
                    });
                }
                let info = media.probe(&path).await.map_err(|e| {
                    AnalyzerError::SourceResolution {
                        source_id: path.display().to_string(),
                        reason: format!("{:#}", e),
                    }
                })?;
                let title = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "video".to_string());

                info!("📂 Opened {} ({:?}s)", path.display(), info.duration);
                Ok(Self {
                    location: SourceLocation::Local(path),
                    title,
                    duration: info.duration,
                })
            }
            SourceLocation::Remote(url) => {
                let info = resolver.resolve(&url).await.map_err(|e| {
                    AnalyzerError::SourceResolution {
                        source_id: url.to_string(),
                        reason: format!("{:#}", e),
                    }
                })?;

                info!("🌐 Resolved '{}' ({:?}s) from {}", info.title, info.duration, url);
                Ok(Self {
                    location: SourceLocation::Remote(url),
                    title: info.title,
                    duration: info.duration.filter(|d| *d > 0.0),
                })
            }
        }
    }
}

/// Metadata returned by a resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub title: String,
    pub duration: Option<f64>,
}

/// Remote media acquisition
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, url: &Url) -> Result<SourceInfo>;

    /// Download `range` of `url` (or the full media when `None`) into
    /// `output_dir`, naming the file `<file_stem>.<ext>`. Returns the written path.
    async fn download(
        &self,
        url: &Url,
        range: Option<TimeRange>,
        output_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf>;
}

/// `SourceResolver` backed by the yt-dlp command line tool
#[derive(Debug, Clone, Default)]
pub struct YtDlpResolver {
    config: DownloadConfig,
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
}

impl YtDlpResolver {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    /// `--download-sections` argument for a range
    pub fn section_arg(range: &TimeRange) -> String {
        match range.end {
            Some(end) => format!("*{}-{}", format_seconds(range.start), format_seconds(end)),
            None => format!("*{}-inf", format_seconds(range.start)),
        }
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    async fn resolve(&self, url: &Url) -> Result<SourceInfo> {
        let output = Command::new(&self.config.ytdlp_bin)
            .args(["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings"])
            .arg(url.as_str())
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.ytdlp_bin))?;

        if !output.status.success() {
            return Err(anyhow!(
                "yt-dlp could not resolve {}: {}",
                url,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)?;
        Ok(SourceInfo {
            title: info.title.unwrap_or_else(|| "video".to_string()),
            duration: info.duration,
        })
    }

    async fn download(
        &self,
        url: &Url,
        range: Option<TimeRange>,
        output_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(output_dir).await?;
        let template = output_dir.join(format!("{}.%(ext)s", file_stem));

        let mut command = Command::new(&self.config.ytdlp_bin);
        command
            .arg(url.as_str())
            .args(["--no-playlist", "--no-warnings", "--print", "after_move:filepath"])
            .arg("-f")
            .arg(&self.config.format)
            .arg("-o")
            .arg(&template);
        if let Some(range) = range {
            command.arg("--download-sections").arg(Self::section_arg(&range));
            if self.config.force_keyframes_at_cuts {
                command.arg("--force-keyframes-at-cuts");
            }
        }

        debug!("Running {:?}", command);
        let output = command
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.ytdlp_bin))?;

        if !output.status.success() {
            return Err(anyhow!(
                "yt-dlp download failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reported = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from);

        match reported {
            Some(path) if path.exists() => Ok(path),
            _ => find_downloaded(output_dir, file_stem)
                .ok_or_else(|| anyhow!("yt-dlp reported success but no file named {} exists", file_stem)),
        }
    }
}

/// Look for `<stem>.mp4`, then `.mkv`, then `.webm`
fn find_downloaded(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["mp4", "mkv", "webm"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|p| p.exists())
}

/// Make a title safe to use as a file or directory name
pub fn sanitize_name(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}
