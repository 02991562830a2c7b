//! Result and timing types for background removal operations

use crate::bounds::Bounds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing breakdown for one removal, summed over all attempts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Reading the source header and planning the decode size
    pub inspect_ms: u64,

    /// Decoding (and resampling) the source
    pub image_decode_ms: u64,

    /// Segmentation service calls
    pub segmentation_ms: u64,

    /// Bounds reduction and crop (None when trimming was not requested)
    pub trim_ms: Option<u64>,

    /// Encoding the result
    pub image_encode_ms: u64,

    /// Handing the encoded bytes to the writer
    pub persist_ms: u64,

    /// End-to-end time including admission
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of the total spent in segmentation
    #[must_use]
    pub fn segmentation_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.segmentation_ms as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to any measured stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.inspect_ms
            + self.image_decode_ms
            + self.segmentation_ms
            + self.trim_ms.unwrap_or(0)
            + self.image_encode_ms
            + self.persist_ms;
        self.total_ms.saturating_sub(measured)
    }
}

/// What a successful removal produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalOutcome {
    /// Where the writer stored the result (a `file://` URI for the default writer)
    pub location: String,

    /// Dimensions of the encoded result
    pub output_dimensions: (u32, u32),

    /// Dimensions the source was decoded at
    pub loaded_dimensions: (u32, u32),

    /// Dimensions of the source as stored
    pub source_dimensions: (u32, u32),

    /// Bounds used for the crop (None when trimming was not requested)
    pub trimmed_bounds: Option<Bounds>,

    /// Attempts the retry loop needed
    pub attempts: u32,

    /// Per-stage timings
    pub timings: ProcessingTimings,

    /// When the result was persisted
    pub completed_at: DateTime<Utc>,
}

impl RemovalOutcome {
    /// Whether the source was decoded below its stored resolution
    #[must_use]
    pub fn was_downscaled(&self) -> bool {
        self.loaded_dimensions != self.source_dimensions
    }
}
