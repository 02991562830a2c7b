//! Background removal processor
//!
//! This module provides the `BackgroundRemovalProcessor` that drives one
//! removal from admission to a persisted result. Codec, segmentation,
//! persistence and memory relief are injected, so the same pipeline runs
//! behind the CLI, in tests, and inside an embedding application.

use crate::{
    bounds::{Bounds, BoundsReducer},
    codec::{ImageCodec, ImageCrateCodec},
    config::{RemovalConfig, RemovalOptions},
    error::{BgRemovalError, Result},
    gate::{RequestGate, RequestLease},
    loader::ImageLoader,
    location::ImageLocation,
    retry::{MemoryRelief, RetryController, TracingMemoryRelief},
    segmentation::{AlphaChannelSegmenter, SegmentationService},
    services::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker},
    sizing::PixelBudget,
    types::{ProcessingTimings, RemovalOutcome},
    writer::{FileSystemWriter, ResultWriter},
};
use chrono::Utc;
use instant::Instant;
use log::{debug, info};
use std::sync::Arc;
use tracing::{info as trace_info, instrument, span, warn as trace_warn, Level};

/// Output of one successful attempt, before persistence
struct AttemptOutput {
    bytes: Vec<u8>,
    dimensions: (u32, u32),
    bounds: Option<Bounds>,
}

/// Builder for `BackgroundRemovalProcessor`
///
/// Every collaborator has a default: the `image` crate codec, the
/// alpha-channel segmenter, a filesystem writer into the configured output
/// directory, a logging memory-relief hint, and no progress reporting.
pub struct ProcessorBuilder {
    config: RemovalConfig,
    gate: Option<Arc<RequestGate>>,
    codec: Option<Arc<dyn ImageCodec>>,
    segmenter: Option<Arc<dyn SegmentationService>>,
    writer: Option<Arc<dyn ResultWriter>>,
    relief: Option<Arc<dyn MemoryRelief>>,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl ProcessorBuilder {
    #[must_use]
    pub fn new(config: RemovalConfig) -> Self {
        Self {
            config,
            gate: None,
            codec: None,
            segmenter: None,
            writer: None,
            relief: None,
            reporter: None,
        }
    }

    /// Share an admission gate with other processors
    #[must_use]
    pub fn gate(mut self, gate: Arc<RequestGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    #[must_use]
    pub fn segmenter(mut self, segmenter: Arc<dyn SegmentationService>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    #[must_use]
    pub fn writer(mut self, writer: Arc<dyn ResultWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    #[must_use]
    pub fn memory_relief(mut self, relief: Arc<dyn MemoryRelief>) -> Self {
        self.relief = Some(relief);
        self
    }

    #[must_use]
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Build the processor
    ///
    /// # Errors
    /// - Any [`RemovalConfig::validate`] failure
    pub fn build(self) -> Result<BackgroundRemovalProcessor> {
        self.config.validate()?;

        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(ImageCrateCodec::new()));
        let writer = self.writer.unwrap_or_else(|| {
            Arc::new(FileSystemWriter::new(self.config.resolved_output_dir()))
        });
        let relief = self.relief.unwrap_or_else(|| Arc::new(TracingMemoryRelief));

        Ok(BackgroundRemovalProcessor {
            gate: self.gate.unwrap_or_default(),
            loader: ImageLoader::new(Arc::clone(&codec), self.config.max_pixels),
            retry: RetryController::new(self.config.max_attempts, relief),
            reducer: BoundsReducer::from_config(&self.config),
            codec,
            segmenter: self
                .segmenter
                .unwrap_or_else(|| Arc::new(AlphaChannelSegmenter::new())),
            writer,
            reporter: self
                .reporter
                .unwrap_or_else(|| Arc::new(NoOpProgressReporter)),
            config: self.config,
        })
    }
}

/// Single-flight background removal pipeline
///
/// Cloning is cheap and clones share the admission gate.
#[derive(Clone)]
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    gate: Arc<RequestGate>,
    loader: ImageLoader,
    codec: Arc<dyn ImageCodec>,
    segmenter: Arc<dyn SegmentationService>,
    writer: Arc<dyn ResultWriter>,
    retry: RetryController,
    reducer: BoundsReducer,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("busy", &self.gate.is_held())
            .field("codec", &self.codec.name())
            .field("segmenter", &self.segmenter.name())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Processor with default collaborators
    ///
    /// # Errors
    /// - Any [`RemovalConfig::validate`] failure
    pub fn new(config: RemovalConfig) -> Result<Self> {
        ProcessorBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder(config: RemovalConfig) -> ProcessorBuilder {
        ProcessorBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Whether a removal is currently in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.gate.is_held()
    }

    /// Whether the segmentation service can run on this device
    ///
    /// When this is `false` every request fails with `Unsupported`
    /// (`REQUIRES_API_FALLBACK`) and the caller should use a remote service.
    #[must_use]
    pub fn is_native_supported(&self) -> bool {
        self.segmenter.is_available()
    }

    /// Remove the background from the image at `image_location`
    ///
    /// `image_location` is a filesystem path or a `file://` URI. Returns the
    /// persisted result's location and metadata. The admission gate is
    /// released before this returns, on every path.
    ///
    /// # Errors
    /// - `Busy` when another removal is in flight (nothing was started)
    /// - `Unsupported` when the segmentation service is unavailable
    /// - `InvalidInput` for an unparseable location
    /// - `LoadFailure` when the source cannot be read or decoded
    /// - `OutOfMemory` when memory pressure persisted through every attempt
    /// - `Segmentation` or `NoForeground` from the segmentation service
    /// - `Persistence` when the result cannot be stored
    #[instrument(skip(self, options), fields(trim = options.trim))]
    pub fn remove_background(
        &self,
        image_location: &str,
        options: RemovalOptions,
    ) -> Result<RemovalOutcome> {
        let lease = self.admit()?;
        self.run_admitted(lease, image_location, options)
    }

    /// Same as [`remove_background`](Self::remove_background), run on
    /// tokio's blocking pool
    ///
    /// Admission happens on the calling task, so `Busy` is reported without
    /// waiting for a blocking thread.
    ///
    /// # Errors
    /// - Same as [`remove_background`](Self::remove_background)
    /// - `Internal` when the blocking task could not complete
    pub async fn remove_background_async(
        &self,
        image_location: impl Into<String>,
        options: RemovalOptions,
    ) -> Result<RemovalOutcome> {
        let lease = self.admit()?;
        let processor = self.clone();
        let location = image_location.into();

        tokio::task::spawn_blocking(move || processor.run_admitted(lease, &location, options))
            .await
            .map_err(|e| BgRemovalError::internal(format!("Removal task failed: {}", e)))?
    }

    fn admit(&self) -> Result<RequestLease> {
        self.gate.lease().ok_or_else(|| {
            trace_warn!("rejected removal: another removal is in progress");
            let error = BgRemovalError::Busy;
            self.reporter.report_error(
                ProcessingStage::Admission,
                error.code(),
                &error.to_string(),
            );
            error
        })
    }

    fn run_admitted(
        &self,
        lease: RequestLease,
        image_location: &str,
        options: RemovalOptions,
    ) -> Result<RemovalOutcome> {
        let total_start = Instant::now();
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        tracker.report_stage(ProcessingStage::Admission);

        let result = self.execute(image_location, options, &mut tracker, total_start);
        drop(lease);

        match &result {
            Ok(outcome) => {
                tracker.report_completion(&outcome.timings);
                info!(
                    "Removed background from {} in {}ms ({} attempt(s))",
                    image_location, outcome.timings.total_ms, outcome.attempts
                );
            },
            Err(e) => {
                tracker.report_error(e.code(), &e.to_string());
                debug!("Removal of {} failed: {} ({})", image_location, e, e.code());
            },
        }
        result
    }

    fn execute(
        &self,
        image_location: &str,
        options: RemovalOptions,
        tracker: &mut ProgressTracker,
        total_start: Instant,
    ) -> Result<RemovalOutcome> {
        if !self.segmenter.is_available() {
            trace_warn!(service = self.segmenter.name(), "segmentation unavailable on this device");
            return Err(BgRemovalError::Unsupported);
        }
        let location = ImageLocation::parse(image_location)?;
        let mut timings = ProcessingTimings::new();

        tracker.report_stage(ProcessingStage::SizePlanning);
        let inspect_start = Instant::now();
        let budget = {
            let _span = span!(Level::DEBUG, "size_planning", max_pixels = self.loader.max_pixels())
                .entered();
            self.loader.plan(&location)?
        };
        timings.inspect_ms = inspect_start.elapsed().as_millis() as u64;

        trace_info!(
            source = %location,
            source_width = budget.source_width,
            source_height = budget.source_height,
            target_width = budget.target_width,
            target_height = budget.target_height,
            "starting background removal"
        );

        let attempted = self.retry.run(|attempt| {
            self.attempt(&location, &budget, options, attempt, &mut timings, tracker)
        })?;
        let output = attempted.value;

        tracker.report_stage(ProcessingStage::Persisting);
        let persist_start = Instant::now();
        let name = location.suggested_name(self.config.output_format.extension());
        let saved = self
            .writer
            .write(&output.bytes, &name)
            .map_err(into_persistence_error)?;
        drop(output.bytes);
        timings.persist_ms = persist_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Completed);
        Ok(RemovalOutcome {
            location: saved,
            output_dimensions: output.dimensions,
            loaded_dimensions: budget.target_dimensions(),
            source_dimensions: (budget.source_width, budget.source_height),
            trimmed_bounds: output.bounds,
            attempts: attempted.attempts,
            timings,
            completed_at: Utc::now(),
        })
    }

    /// One decode -> segment -> trim -> encode pass
    ///
    /// Each buffer is dropped as soon as the next stage owns its successor,
    /// so at most one decoded and one foreground image are alive.
    fn attempt(
        &self,
        location: &ImageLocation,
        budget: &PixelBudget,
        options: RemovalOptions,
        attempt: u32,
        timings: &mut ProcessingTimings,
        tracker: &mut ProgressTracker,
    ) -> Result<AttemptOutput> {
        let _span = span!(Level::DEBUG, "attempt", attempt).entered();
        if attempt > 1 {
            tracker.report_stage_with_description(
                ProcessingStage::MemoryRelief,
                format!(
                    "Retrying after memory pressure (attempt {}/{})",
                    attempt,
                    self.retry.max_attempts()
                ),
            );
        }

        tracker.report_stage(ProcessingStage::ImageLoading);
        let decode_start = Instant::now();
        let decoded = self.loader.load(location, budget)?;
        timings.image_decode_ms += decode_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Segmentation);
        let segment_start = Instant::now();
        let segmented = {
            let _span = span!(Level::INFO, "segmentation", service = self.segmenter.name()).entered();
            self.segmenter.segment(&decoded)
        };
        drop(decoded);
        timings.segmentation_ms += segment_start.elapsed().as_millis() as u64;
        let foreground = segmented
            .map_err(into_segmentation_error)?
            .into_foreground()?;

        let (image, bounds) = if options.trim {
            tracker.report_stage(ProcessingStage::Trimming);
            let trim_start = Instant::now();
            let trimmed = {
                let _span = span!(
                    Level::DEBUG,
                    "trim",
                    width = foreground.width(),
                    height = foreground.height()
                )
                .entered();
                self.reducer.trim(&foreground)?
            };
            drop(foreground);
            let elapsed = trim_start.elapsed().as_millis() as u64;
            timings.trim_ms = Some(timings.trim_ms.unwrap_or(0) + elapsed);
            (trimmed.image, Some(trimmed.bounds))
        } else {
            (foreground, None)
        };

        tracker.report_stage(ProcessingStage::Encoding);
        let encode_start = Instant::now();
        let bytes = self.codec.encode(&image, self.config.output_format)?;
        timings.image_encode_ms += encode_start.elapsed().as_millis() as u64;

        Ok(AttemptOutput {
            bytes,
            dimensions: image.dimensions(),
            bounds,
        })
    }
}

/// Keep retryable and terminal kinds; anything else is a service failure
fn into_segmentation_error(error: BgRemovalError) -> BgRemovalError {
    match error {
        e @ (BgRemovalError::Segmentation(_)
        | BgRemovalError::NoForeground
        | BgRemovalError::MemoryPressure(_)) => e,
        e if e.is_memory_pressure() => e,
        e => BgRemovalError::segmentation(e.to_string()),
    }
}

fn into_persistence_error(error: BgRemovalError) -> BgRemovalError {
    match error {
        e @ BgRemovalError::Persistence(_) => e,
        e => BgRemovalError::persistence(e.to_string()),
    }
}
