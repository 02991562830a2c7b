#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # On-device Background Removal
//!
//! A single-flight background removal pipeline for memory-constrained
//! devices. One call takes an image location, decodes it within a fixed pixel
//! budget, asks an injected segmentation service for the foreground, crops
//! transparent borders, and persists a PNG.
//!
//! ## Features
//!
//! - **Single flight**: a second concurrent request is rejected with
//!   [`BgRemovalError::Busy`], never queued
//! - **Bounded decode**: sources above the pixel budget (4 MP by default) are
//!   downscaled before segmentation
//! - **Memory-pressure recovery**: allocation failures re-run the whole
//!   decode and segmentation attempt, up to a configurable limit
//! - **Parallel trim**: large results are scanned for their visible bounds on
//!   scoped worker threads
//! - **Fallback signal**: an unavailable segmentation service fails fast with
//!   `REQUIRES_API_FALLBACK` so callers can switch to a remote service
//! - **Stable error codes**: every failure kind has a machine-readable
//!   [`code`](BgRemovalError::code)
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_ondevice::{BackgroundRemovalProcessor, RemovalConfig, RemovalOptions};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .output_dir("/tmp/results")
//!     .build()?;
//! let processor = BackgroundRemovalProcessor::new(config)?;
//!
//! let outcome = processor.remove_background("file:///photos/cat.png", RemovalOptions::default())?;
//! println!("saved to {} ({}x{})", outcome.location, outcome.output_dimensions.0, outcome.output_dimensions.1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom collaborators
//!
//! Segmentation, decoding, persistence and memory relief are traits. Plug a
//! model in by implementing [`SegmentationService`]:
//!
//! ```rust,no_run
//! use bgremove_ondevice::{
//!     BackgroundRemovalProcessor, ForegroundResult, RemovalConfig, Result, SegmentationService,
//! };
//! use image::RgbaImage;
//! use std::sync::Arc;
//!
//! struct MyModel;
//!
//! impl SegmentationService for MyModel {
//!     fn segment(&self, image: &RgbaImage) -> Result<ForegroundResult> {
//!         Ok(ForegroundResult::found(image.clone()))
//!     }
//! }
//!
//! # fn example() -> anyhow::Result<()> {
//! let processor = BackgroundRemovalProcessor::builder(RemovalConfig::default())
//!     .segmenter(Arc::new(MyModel))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI
//! - `webp-support`: WebP input decoding

pub mod bounds;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod gate;
pub mod loader;
pub mod location;
pub mod processor;
pub mod retry;
pub mod segmentation;
pub mod services;
pub mod sizing;
#[cfg(test)]
pub(crate) mod test_utils;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod writer;

pub use bounds::{BoundingBox, Bounds, BoundsReducer, Region, ScanStrategy, TrimResult};
pub use codec::{ImageCodec, ImageCrateCodec};
pub use config::{OutputFormat, RemovalConfig, RemovalConfigBuilder, RemovalOptions};
pub use error::{BgRemovalError, Result};
pub use gate::{RequestGate, RequestLease};
pub use loader::ImageLoader;
pub use location::ImageLocation;
pub use processor::{BackgroundRemovalProcessor, ProcessorBuilder};
pub use retry::{
    AttemptPhase, Attempted, MemoryRelief, NoOpMemoryRelief, RetryController, TracingMemoryRelief,
};
pub use segmentation::{
    AlphaChannelSegmenter, ForegroundResult, MaskSegmenter, SegmentationService,
};
pub use services::{
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
    TracingProgressReporter,
};
pub use sizing::PixelBudget;
pub use types::{ProcessingTimings, RemovalOutcome};
pub use writer::{FileSystemWriter, ResultWriter};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

use std::sync::OnceLock;

static DEFAULT_PROCESSOR: OnceLock<BackgroundRemovalProcessor> = OnceLock::new();

fn default_processor() -> Result<&'static BackgroundRemovalProcessor> {
    if let Some(processor) = DEFAULT_PROCESSOR.get() {
        return Ok(processor);
    }
    let processor = BackgroundRemovalProcessor::new(RemovalConfig::default())?;
    Ok(DEFAULT_PROCESSOR.get_or_init(|| processor))
}

/// Remove the background using the process-wide default processor
///
/// All callers of this function share one admission gate, so at most one of
/// them runs at a time. Results go to the system temp directory.
///
/// # Examples
///
/// ```rust,no_run
/// use bgremove_ondevice::{remove_background, BgRemovalError, RemovalOptions};
///
/// match remove_background("/photos/cat.png", RemovalOptions::default()) {
///     Ok(outcome) => println!("{}", outcome.location),
///     Err(BgRemovalError::Busy) => println!("try again later"),
///     Err(e) => eprintln!("{}: {}", e.code(), e),
/// }
/// ```
pub fn remove_background(image_location: &str, options: RemovalOptions) -> Result<RemovalOutcome> {
    default_processor()?.remove_background(image_location, options)
}

/// Whether the default processor can segment on this device
///
/// `false` means every [`remove_background`] call would fail with
/// [`BgRemovalError::Unsupported`].
#[must_use]
pub fn is_native_supported() -> bool {
    default_processor().is_ok_and(BackgroundRemovalProcessor::is_native_supported)
}

/// Async variant of [`remove_background`]
pub async fn remove_background_async(
    image_location: impl Into<String>,
    options: RemovalOptions,
) -> Result<RemovalOutcome> {
    default_processor()?
        .remove_background_async(image_location, options)
        .await
}
