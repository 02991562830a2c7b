//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different frontends to implement their own progress handling.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Stages of one removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Acquiring the request gate
    Admission,
    /// Reading the source size and planning the decode size
    SizePlanning,
    /// Decoding the source at the planned size
    ImageLoading,
    /// Running the segmentation service
    Segmentation,
    /// Dropping buffers and requesting relief before a retry
    MemoryRelief,
    /// Cropping transparent borders
    Trimming,
    /// Encoding the result
    Encoding,
    /// Handing the result to the writer
    Persisting,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Admission => "Waiting for admission",
            ProcessingStage::SizePlanning => "Planning decode size",
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::Segmentation => "Extracting foreground",
            ProcessingStage::MemoryRelief => "Recovering from memory pressure",
            ProcessingStage::Trimming => "Trimming transparent borders",
            ProcessingStage::Encoding => "Encoding result",
            ProcessingStage::Persisting => "Saving result",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Typical progress percentage when the stage starts
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Admission => 0,
            ProcessingStage::SizePlanning => 5,
            ProcessingStage::ImageLoading => 10,
            ProcessingStage::Segmentation => 30,
            ProcessingStage::MemoryRelief => 30,
            ProcessingStage::Trimming => 80,
            ProcessingStage::Encoding => 90,
            ProcessingStage::Persisting => 97,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_description(stage, stage.description().to_string(), start_time)
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Receives progress from the pipeline
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    ///
    /// # Arguments
    /// * `stage` - Stage where error occurred
    /// * `code` - Stable error code
    /// * `error` - Error description
    fn report_error(&self, stage: ProcessingStage, code: &str, error: &str);
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _code: &str, _error: &str) {}
}

/// Reports progress as `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressReporter {
    verbose: bool,
}

impl TracingProgressReporter {
    /// # Arguments
    /// * `verbose` - Include elapsed time and the full timing breakdown
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            tracing::info!(
                stage = ?update.stage,
                elapsed_ms = update.elapsed_ms,
                "[{}%] {}",
                update.progress,
                update.description
            );
        } else {
            tracing::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        tracing::info!(total_ms = timings.total_ms, "Background removal completed");

        if self.verbose {
            tracing::info!(
                inspect_ms = timings.inspect_ms,
                decode_ms = timings.image_decode_ms,
                segmentation_ms = timings.segmentation_ms,
                trim_ms = ?timings.trim_ms,
                encode_ms = timings.image_encode_ms,
                persist_ms = timings.persist_ms,
                other_ms = timings.other_overhead_ms(),
                "Detailed timings"
            );
        }
    }

    fn report_error(&self, stage: ProcessingStage, code: &str, error: &str) {
        tracing::error!(code, "Error during {}: {}", stage.description(), error);
    }
}

/// Tracks the current stage and elapsed time for one removal
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report progress with custom description
    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        self.reporter.report_progress(ProgressUpdate::with_description(
            stage,
            description,
            self.start_time,
        ));
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: &ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, code: &str, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Admission);
        self.reporter.report_error(stage, code, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}
