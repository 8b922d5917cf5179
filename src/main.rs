use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use motor_audio_analyzer::{
    audio::AudioFormat,
    config::Config,
    error::{AnalyzerError, AudioError},
    export,
    pipeline::{AnalysisEngine, AnalysisOptions, AnalysisRecord},
};

#[derive(Parser)]
#[command(
    name = "motor-audio-analyzer",
    version,
    about = "Spectral diagnostics for short motor-noise recordings",
    long_about = "Motor Audio Analyzer decodes a short recording, computes six spectral views and a table of diagnostic features, and writes the images, features.csv and analysis.json into an output directory."
)]
struct Cli {
    /// Audio file path (WAV, MP3, FLAC, M4A)
    input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "analysis")]
    output: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Abort unfinished transforms after this many milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if cli.dump_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No input file given (see --help)"))?;

    info!("Starting Motor Audio Analyzer v{}", env!("CARGO_PKG_VERSION"));
    info!("Input: {:?}", input);
    info!("Output: {:?}", cli.output);

    let format = AudioFormat::from_path(&input)?;
    let size = tokio::fs::metadata(&input)
        .await
        .with_context(|| format!("Cannot read {:?}", input))?
        .len();
    if size > config.audio.max_file_bytes {
        let error = AnalyzerError::from(AudioError::FileTooLarge {
            size,
            limit: config.audio.max_file_bytes,
        });
        anyhow::bail!(error.user_message());
    }
    let bytes = tokio::fs::read(&input).await?;

    let filename = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let options = AnalysisOptions {
        deadline: cli.deadline_ms.map(Duration::from_millis),
        ..AnalysisOptions::default()
    };

    // The pipeline is CPU-bound and runs on its own rayon pool
    let record = tokio::task::spawn_blocking(move || -> motor_audio_analyzer::Result<AnalysisRecord> {
        let engine = AnalysisEngine::new(config)?;
        engine.analyze_bytes(&filename, &bytes, format, &options)
    })
    .await?
    .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    write_outputs(&record, &cli.output).await?;

    for (spectrogram, error) in record.failed_transforms() {
        warn!("{}: {}", spectrogram.display_name(), error);
    }
    for failure in record.features.failures() {
        warn!("{} features: {}", failure.category, failure.reason);
    }

    info!("Analysis complete! Output saved to: {:?}", cli.output);
    Ok(())
}

async fn write_outputs(record: &AnalysisRecord, output_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(output_dir).await?;

    for spectrogram in &record.spectrograms {
        if let Some(image) = spectrogram.image() {
            let path = output_dir.join(format!("{}.png", spectrogram.key()));
            tokio::fs::write(&path, image.png()).await?;
            info!("Wrote {:?}", path);
        }
    }

    tokio::fs::write(output_dir.join("features.csv"), export::features_to_csv(&record.features)).await?;
    tokio::fs::write(output_dir.join("analysis.json"), export::record_to_json(record)?).await?;
    Ok(())
}
