//! Decode-size planning against a fixed pixel budget
//!
//! Peak decode memory is bounded by the budget, not by the source, so the
//! same photo behaves the same on every device.

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};

/// Planned decode resolution for one source image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBudget {
    /// Maximum decoded pixel count
    pub max_pixels: u64,
    /// Source width in pixels
    pub source_width: u32,
    /// Source height in pixels
    pub source_height: u32,
    /// Planned decode width (>= 1)
    pub target_width: u32,
    /// Planned decode height (>= 1)
    pub target_height: u32,
    /// Downscale factor applied per axis (1.0 = no scaling)
    pub scale: f64,
}

impl PixelBudget {
    /// Plan the decode resolution for a `source_width` x `source_height` image
    ///
    /// Sources within budget are decoded as-is. Larger sources are scaled by
    /// `sqrt(source_pixels / max_pixels)` per axis, floored, and clamped to at
    /// least one pixel. The result always satisfies
    /// `target_width * target_height <= max_pixels`.
    ///
    /// # Errors
    /// - Zero source dimension
    /// - Zero budget
    pub fn plan(source_width: u32, source_height: u32, max_pixels: u64) -> Result<Self> {
        if source_width == 0 || source_height == 0 {
            return Err(BgRemovalError::invalid_input(format!(
                "Image has no pixels ({}x{})",
                source_width, source_height
            )));
        }
        if max_pixels == 0 {
            return Err(BgRemovalError::invalid_config("Pixel budget must be at least 1"));
        }

        let source_pixels = u64::from(source_width) * u64::from(source_height);
        if source_pixels <= max_pixels {
            return Ok(Self {
                max_pixels,
                source_width,
                source_height,
                target_width: source_width,
                target_height: source_height,
                scale: 1.0,
            });
        }

        let scale = (source_pixels as f64 / max_pixels as f64).sqrt();
        let mut width = ((f64::from(source_width) / scale).floor() as u64).max(1);
        let mut height = ((f64::from(source_height) / scale).floor() as u64).max(1);

        // A 1-pixel clamp on a sliver image can push the other axis over
        if width * height > max_pixels {
            if width == 1 {
                height = (max_pixels / width).max(1);
            } else if height == 1 {
                width = (max_pixels / height).max(1);
            }
        }
        // Float rounding can overshoot by a row or column
        while width * height > max_pixels {
            if width >= height && width > 1 {
                width -= 1;
            } else if height > 1 {
                height -= 1;
            } else {
                break;
            }
        }

        let target_width = u32::try_from(width).unwrap_or(source_width).min(source_width);
        let target_height = u32::try_from(height).unwrap_or(source_height).min(source_height);

        tracing::debug!(
            source_width,
            source_height,
            target_width,
            target_height,
            scale,
            "planned downscaled decode"
        );

        Ok(Self {
            max_pixels,
            source_width,
            source_height,
            target_width,
            target_height,
            scale,
        })
    }

    /// Whether decoding needs to downscale
    #[must_use]
    pub fn is_downscaled(&self) -> bool {
        self.target_width != self.source_width || self.target_height != self.source_height
    }

    #[must_use]
    pub fn target_pixels(&self) -> u64 {
        u64::from(self.target_width) * u64::from(self.target_height)
    }

    #[must_use]
    pub fn target_dimensions(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }
}
