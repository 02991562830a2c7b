//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{RemovalConfig, RemovalOptions},
    segmentation::{AlphaChannelSegmenter, MaskSegmenter, SegmentationService},
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Convert CLI arguments to library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `RemovalConfig`: config file (if any), then flag overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let mut config = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        if let Some(max_pixels) = cli.max_pixels {
            config.max_pixels = max_pixels;
        }
        if let Some(max_attempts) = cli.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(workers) = cli.workers {
            config.available_units = Some(workers);
        }
        if let Some(output_dir) = &cli.output_dir {
            config.output_dir = Some(output_dir.clone());
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub(crate) fn options_from_cli(cli: &Cli) -> RemovalOptions {
        RemovalOptions::with_trim(!cli.no_trim)
    }

    /// Mask segmenter when `--mask` is given, alpha-channel otherwise
    pub(crate) fn segmenter_from_cli(cli: &Cli) -> Result<Arc<dyn SegmentationService>> {
        match &cli.mask {
            Some(path) => {
                let segmenter = MaskSegmenter::from_path(path)
                    .with_context(|| format!("Failed to load mask {}", path.display()))?;
                Ok(Arc::new(segmenter))
            },
            None => Ok(Arc::new(AlphaChannelSegmenter::new())),
        }
    }
}
