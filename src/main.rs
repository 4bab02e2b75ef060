// src/main.rs
use anyhow::{bail, Context, Result};
use clap::Parser;
use presence_analyzer::data::FeatureExporter;
use presence_analyzer::video::{validate_file_format, validate_file_size};
use presence_analyzer::{analyze_with_timeout, AnalyzerConfig, BodyLanguageAnalyzer};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "presence_analyzer",
    version,
    about = "Score posture, eye contact and gestures in a recorded interview answer"
)]
struct Cli {
    /// Recorded answer (mp4, avi, mov or webm by default)
    video: PathBuf,

    /// JSON config file; defaults to the per-user config location
    #[arg(long)]
    config: Option<PathBuf>,

    /// External landmark estimator executable
    #[arg(long)]
    landmark_command: Option<PathBuf>,

    /// Argument passed to the estimator before the modality (repeatable)
    #[arg(long = "landmark-arg")]
    landmark_args: Vec<String>,

    /// Directory to write the per-frame feature CSV into
    #[arg(long)]
    features_csv: Option<PathBuf>,

    /// Print the rounded payload for the language-model feedback step
    #[arg(long)]
    prompt_data: bool,

    /// Wall-clock limit for the analysis; 0 disables it
    #[arg(long)]
    timeout_secs: Option<u64>,
}

/// How long shutdown waits for an abandoned analysis thread.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AnalyzerConfig::load_or_default(cli.config.as_deref())?;
    if let Some(command) = cli.landmark_command {
        config.landmark_command = Some(command);
    }
    if !cli.landmark_args.is_empty() {
        config.landmark_args = cli.landmark_args;
    }
    if let Some(secs) = cli.timeout_secs {
        config.analysis_timeout_secs = secs;
    }

    let filename = cli
        .video
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());

    if !validate_file_format(&filename, &config.supported_video_formats) {
        bail!(
            "Unsupported video format: {} (expected one of {})",
            filename,
            config.supported_video_formats.join(", ")
        );
    }

    let bytes = std::fs::read(&cli.video)
        .with_context(|| format!("Failed to read {}", cli.video.display()))?;

    if !validate_file_size(bytes.len() as u64, config.max_video_size_mb) {
        bail!(
            "{} is larger than the {} MB limit",
            filename,
            config.max_video_size_mb
        );
    }

    let analyzer = BodyLanguageAnalyzer::new(config);
    info!("Analyzing {} in {:?} mode", filename, analyzer.initial_state());

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let outcome = runtime.block_on(analyze_with_timeout(analyzer, bytes, filename));
    // Exit on time even if a timed-out job is still unwinding.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    if let Some(dir) = &cli.features_csv {
        let exporter = FeatureExporter::new(dir, None);
        let path = exporter.export_csv(&outcome.frame_features, outcome.fps)?;
        info!("Wrote per-frame features to {}", path.display());
    }

    let output = if cli.prompt_data {
        outcome.report.to_prompt_data()
    } else {
        serde_json::to_value(&outcome.report)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
