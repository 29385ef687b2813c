use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use url::Url;

use video_analyzer_rust::media::{target_video_bitrate, MediaBackend};
use video_analyzer_rust::source::sanitize_name;
use video_analyzer_rust::{Config, FfmpegBackend, SourceResolver, TimeRange, YtDlpResolver};

#[derive(Parser)]
#[command(name = "download-segment")]
#[command(about = "Download a time range of a remote video and re-encode it under a size budget")]
struct Cli {
    /// Video URL
    url: Url,

    /// Range start in seconds
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Range end in seconds
    #[arg(long, default_value_t = 60)]
    end: u64,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Size budget for the re-encoded file in megabytes
    #[arg(long, default_value_t = 200)]
    target_size_mb: u64,

    /// Keep the raw download next to the re-encoded file
    #[arg(long)]
    keep_raw: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("video_analyzer_rust=info,download_segment=info,warn")
        .init();

    let cli = Cli::parse();
    if cli.end <= cli.start {
        bail!("--end ({}) must be after --start ({})", cli.end, cli.start);
    }

    let config = Config::load()?;
    let resolver = YtDlpResolver::new(config.download.clone());
    let media = FfmpegBackend::new(config.media.clone());

    let info = resolver.resolve(&cli.url).await?;
    let title = sanitize_name(&info.title);
    let range = TimeRange::new(cli.start as f64, cli.end as f64);
    info!("🌐 '{}' {}", info.title, range);

    let raw = resolver
        .download(
            &cli.url,
            Some(range),
            &cli.output_dir,
            &format!("{}_raw_{}", title, range.label()),
        )
        .await?;

    let duration = match media.probe(&raw).await {
        Ok(probed) => probed.duration.unwrap_or((cli.end - cli.start) as f64),
        Err(e) => {
            warn!("Could not probe {}: {:#}", raw.display(), e);
            (cli.end - cli.start) as f64
        }
    };
    let bitrate = target_video_bitrate(cli.target_size_mb, duration);

    let output = cli
        .output_dir
        .join(format!("{}_segment_{}.mp4", title, range.label()));
    media.transcode(&raw, &output, bitrate).await?;

    if !cli.keep_raw && raw != output {
        if let Err(e) = tokio::fs::remove_file(&raw).await {
            warn!("Failed to remove {}: {}", raw.display(), e);
        }
    }

    info!("✅ Saved {}", output.display());
    Ok(())
}
