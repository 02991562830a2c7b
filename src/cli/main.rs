//! Background removal CLI tool
//!
//! Command-line interface for running one removal through the processor.

use super::config::CliConfigBuilder;
use crate::{
    processor::BackgroundRemovalProcessor,
    services::{NoOpProgressReporter, ProgressReporter, TracingProgressReporter},
    tracing_config::{events, init_cli_tracing, spans},
    types::RemovalOutcome,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

/// On-device background removal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-ondevice")]
pub struct Cli {
    /// Input image path or file:// URI
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Keep the full canvas instead of cropping transparent borders
    #[arg(long)]
    pub no_trim: bool,

    /// Grayscale mask to apply as alpha (default: use the input's own alpha)
    #[arg(long, value_name = "PATH")]
    pub mask: Option<PathBuf>,

    /// Directory for the result [default: system temp dir]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum decoded pixel count
    #[arg(long, value_name = "N")]
    pub max_pixels: Option<u64>,

    /// Attempts allowed under memory pressure
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Execution units to plan the parallel trim for [default: detected]
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// JSON configuration file (flags override its values)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the full outcome as JSON instead of just the location
    #[arg(long)]
    pub json: bool,

    /// Report each processing stage
    #[arg(long)]
    pub progress: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;
    let segmenter = if cli.mask.is_some() { "mask" } else { "alpha-channel" };
    let session = spans::session(&session_id, segmenter);

    let outcome = run(&cli).instrument(session).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
        );
    } else {
        println!("{}", outcome.location);
    }
    Ok(())
}

/// Run one removal as described by `cli`
///
/// Library errors are reported with their stable code.
pub async fn run(cli: &Cli) -> Result<RemovalOutcome> {
    let config = CliConfigBuilder::from_cli(cli)?;
    let options = CliConfigBuilder::options_from_cli(cli);
    let reporter: Arc<dyn ProgressReporter> = if cli.progress {
        Arc::new(TracingProgressReporter::new(cli.verbose > 0))
    } else {
        Arc::new(NoOpProgressReporter)
    };

    let processor = BackgroundRemovalProcessor::builder(config)
        .segmenter(CliConfigBuilder::segmenter_from_cli(cli)?)
        .progress_reporter(reporter)
        .build()
        .context("Failed to build processor")?;

    info!("Removing background from {}", cli.input);
    let outcome = processor
        .remove_background_async(cli.input.clone(), options)
        .instrument(spans::removal(&cli.input, options.trim))
        .await
        .map_err(|e| {
            events::error_with_code(&e, &cli.input);
            anyhow::anyhow!("[{}] {}", e.code(), e)
        })?;

    events::performance_metric("removal", outcome.timings.total_ms);
    info!(
        "Segmentation took {:.0}% of {}ms",
        outcome.timings.segmentation_ratio() * 100.0,
        outcome.timings.total_ms
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::ImageLocation;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["bgremove-ondevice", "file:///x/in.png", "-vv", "--json"]).unwrap();
        assert_eq!(cli.input, "file:///x/in.png");
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        assert!(!cli.no_trim);
        assert!(cli.mask.is_none());

        assert!(Cli::try_parse_from(["bgremove-ondevice"]).is_err());
    }

    #[tokio::test]
    async fn test_run_writes_trimmed_result() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("sticker.png");
        let mut image = RgbaImage::new(12, 8);
        for y in 1..=5 {
            for x in 2..=9 {
                image.put_pixel(x, y, Rgba([200, 10, 10, 255]));
            }
        }
        image.save(&input).unwrap();

        let out_dir = dir.path().join("out");
        let cli = Cli::try_parse_from([
            "bgremove-ondevice",
            input.to_str().unwrap(),
            "--output-dir",
            out_dir.to_str().unwrap(),
        ])
        .unwrap();

        let outcome = run(&cli).await.unwrap();
        assert_eq!(outcome.output_dimensions, (8, 5));
        let saved = ImageLocation::parse(&outcome.location).unwrap();
        assert_eq!(saved.path(), out_dir.join("sticker.png"));
        assert_eq!(image::open(saved.path()).unwrap().into_rgba8().dimensions(), (8, 5));
    }

    #[tokio::test]
    async fn test_run_reports_error_code() {
        let cli = Cli::try_parse_from(["bgremove-ondevice", "https://example.com/a.png"]).unwrap();
        let err = run(&cli).await.unwrap_err();
        assert!(err.to_string().starts_with("[INVALID_INPUT]"));
    }
}
