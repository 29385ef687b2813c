use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use video_analyzer_rust::transcription::SpeechProvider;
use video_analyzer_rust::{
    Config, Pipeline, RunParameters, SamplingRate, SourceKind, StopSignal, TracingProgress,
};

fn cli() -> Command {
    Command::new("video-analyzer")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Segment, sample and describe videos with a vision-language model")
        .arg(
            Arg::new("source")
                .value_name("SOURCE")
                .help("Video file path or URL")
                .required(true),
        )
        .arg(
            Arg::new("url")
                .long("url")
                .help("Treat SOURCE as a URL")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .short('i')
                .value_name("SECONDS")
                .help("Segment length in seconds (0 = whole video)")
                .value_parser(value_parser!(u64))
                .default_value("60"),
        )
        .arg(
            Arg::new("seconds-per-frame")
                .long("seconds-per-frame")
                .value_name("SECONDS")
                .help("Sample one frame every N seconds")
                .value_parser(value_parser!(f64))
                .conflicts_with("fps"),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_name("FRAMES")
                .help("Sample N frames per second")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("resize")
                .long("resize")
                .value_name("RATIO")
                .help("Divide frame dimensions by RATIO (0 = no resize)")
                .value_parser(value_parser!(u32))
                .default_value("0"),
        )
        .arg(
            Arg::new("save-frames")
                .long("save-frames")
                .help("Write sampled frames to disk")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-transcription")
                .long("no-transcription")
                .help("Skip audio transcription")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("show-transcript")
                .long("show-transcript")
                .help("Log each segment's transcript")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("temperature")
                .long("temperature")
                .short('t')
                .value_name("TEMP")
                .help("Sampling temperature for the model")
                .value_parser(value_parser!(f32)),
        )
        .arg(
            Arg::new("system-prompt")
                .long("system-prompt")
                .value_name("TEXT")
                .help("Override the system prompt"),
        )
        .arg(
            Arg::new("user-prompt")
                .long("user-prompt")
                .value_name("TEXT")
                .help("Override the user prompt"),
        )
        .arg(
            Arg::new("max-duration")
                .long("max-duration")
                .value_name("SECONDS")
                .help("Stop after this many seconds of video")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("continuous")
                .long("continuous")
                .help("Treat the URL as a live source with no fixed end")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("keyword")
                .long("keyword")
                .short('k')
                .value_name("TEXT")
                .help("Report segments whose description mentions TEXT"),
        )
        .arg(
            Arg::new("no-save-analysis")
                .long("no-save-analysis")
                .help("Do not write analysis JSON files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("keep-segments")
                .long("keep-segments")
                .help("Keep segment files after analysis")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .value_name("DIR")
                .help("Root directory for run output")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Configure logging based on verbose flag
    if matches.get_flag("verbose") {
        tracing_subscriber::fmt()
            .with_target(true)
            .with_thread_ids(true)
            .with_env_filter("debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_env_filter(log_filter(&config.output.log_level))
            .init();
    }

    if let Some(dir) = matches.get_one::<PathBuf>("output-dir") {
        config.output.base_dir = dir.clone();
    }
    if matches.get_flag("no-transcription") {
        config.speech.provider = SpeechProvider::Disabled;
    }
    config.validate()?;
    info!("{}", config.summary());

    let params = build_params(&matches, &config);
    params.validate()?;

    let progress = Arc::new(TracingProgress::new(matches.get_flag("show-transcript")));
    let pipeline = Pipeline::from_config(&config, progress)?;

    let stop = StopSignal::new();
    let on_ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, finishing the current segment");
            on_ctrl_c.stop();
        }
    });

    match pipeline.run(&params, stop).await {
        Ok(summary) => {
            info!("{}", summary.summary());
            Ok(())
        }
        Err(e) => {
            error!("❌ Run aborted: {}", e);
            Err(e.into())
        }
    }
}

/// Filter for the library and this binary; everything else at warn
fn log_filter(level: &str) -> String {
    format!("video_analyzer_rust={level},video_analyzer={level},warn")
}

fn build_params(matches: &clap::ArgMatches, config: &Config) -> RunParameters {
    let source = matches
        .get_one::<String>("source")
        .cloned()
        .unwrap_or_default();

    let mut prompts = config.prompts.to_prompts();
    if let Some(system) = matches.get_one::<String>("system-prompt") {
        prompts.system = system.clone();
    }
    if let Some(user) = matches.get_one::<String>("user-prompt") {
        prompts.user = user.clone();
    }

    let mut params = RunParameters::new(source, prompts)
        .with_interval(matches.get_one::<u64>("interval").copied().unwrap_or(60))
        .with_resize_ratio(matches.get_one::<u32>("resize").copied().unwrap_or(0))
        .with_save_frames(matches.get_flag("save-frames"))
        .with_transcription(!matches.get_flag("no-transcription"))
        .with_continuous(matches.get_flag("continuous"))
        .with_save_analysis(!matches.get_flag("no-save-analysis"))
        .with_keep_segments(matches.get_flag("keep-segments") || config.output.keep_segments);

    if matches.get_flag("url") {
        params = params.with_kind(SourceKind::Url);
    }
    if let Some(fps) = matches.get_one::<f64>("fps") {
        params = params.with_sampling_rate(SamplingRate::FramesPerSecond(*fps));
    }
    if let Some(spf) = matches.get_one::<f64>("seconds-per-frame") {
        params = params.with_sampling_rate(SamplingRate::SecondsPerFrame(*spf));
    }
    if let Some(temperature) = matches.get_one::<f32>("temperature") {
        params = params.with_temperature(*temperature);
    }
    if let Some(max) = matches.get_one::<u64>("max-duration") {
        params = params.with_max_duration(*max);
    }
    if let Some(keyword) = matches.get_one::<String>("keyword") {
        params = params.with_keyword(keyword.clone());
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_filter_keeps_binary_info() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(log_filter("info"))
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            info!("Video Analysis Summary: 3 segments");
            info!(target: "video_analyzer_rust::pipeline", "Segment 1 done");
            info!(target: "reqwest::connect", "connection pooled");
            warn!(target: "reqwest::connect", "connection reset");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Video Analysis Summary: 3 segments"));
        assert!(output.contains("Segment 1 done"));
        assert!(!output.contains("connection pooled"));
        assert!(output.contains("connection reset"));
    }

    #[test]
    fn test_build_params_from_flags() {
        let matches = cli()
            .try_get_matches_from([
                "video-analyzer",
                "https://example.com/live",
                "--continuous",
                "--interval",
                "20",
                "--fps",
                "0.5",
                "--keyword",
                "electric guitar",
            ])
            .unwrap();
        let params = build_params(&matches, &Config::default());

        assert_eq!(params.kind, SourceKind::Url);
        assert!(params.continuous);
        assert_eq!(params.interval_seconds, 20);
        assert_eq!(params.sampling_rate, SamplingRate::FramesPerSecond(0.5));
        assert_eq!(params.keyword.as_deref(), Some("electric guitar"));
        assert!(params.validate().is_ok());
    }
}
