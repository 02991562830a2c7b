//! Foreground segmentation seam
//!
//! Segmentation itself is an external capability. The pipeline hands it a
//! decoded image and gets back either an extracted foreground (alpha marks
//! what to keep) or an explicit "nothing found". The two adapters here do no
//! learning of their own: one trusts the alpha channel the source already
//! carries, the other applies a mask produced elsewhere.

use crate::error::{BgRemovalError, Result};
use image::{imageops, GrayImage, Rgba, RgbaImage};
use std::path::Path;

/// Outcome of one segmentation call
#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundResult {
    /// Extracted foreground, or `None` when nothing was detected
    pub foreground: Option<RgbaImage>,
}

impl ForegroundResult {
    #[must_use]
    pub fn found(foreground: RgbaImage) -> Self {
        Self {
            foreground: Some(foreground),
        }
    }

    #[must_use]
    pub fn nothing() -> Self {
        Self { foreground: None }
    }

    /// The foreground, or `NoForeground`
    ///
    /// # Errors
    /// - Nothing was detected
    pub fn into_foreground(self) -> Result<RgbaImage> {
        self.foreground.ok_or(BgRemovalError::NoForeground)
    }
}

/// Extracts the foreground from a decoded image
pub trait SegmentationService: Send + Sync {
    /// # Errors
    /// - `MemoryPressure` when an allocation fails (retried by the caller)
    /// - `Segmentation` for any other failure
    fn segment(&self, image: &RgbaImage) -> Result<ForegroundResult>;

    /// Whether the service can run on this device
    ///
    /// An unavailable service makes every request fail with `Unsupported`
    /// before the source is touched, so callers can switch to a remote
    /// service.
    fn is_available(&self) -> bool {
        true
    }

    /// Service name for logging
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Uses the source's own alpha channel as the foreground
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaChannelSegmenter;

impl AlphaChannelSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SegmentationService for AlphaChannelSegmenter {
    fn segment(&self, image: &RgbaImage) -> Result<ForegroundResult> {
        if image.pixels().all(|p| p[3] == 0) {
            return Ok(ForegroundResult::nothing());
        }
        Ok(ForegroundResult::found(image.clone()))
    }

    fn name(&self) -> &'static str {
        "alpha-channel"
    }
}

/// Applies an externally produced grayscale mask as alpha
///
/// The mask is resampled to the decoded image's size, so it may come from a
/// model running at any resolution.
#[derive(Debug, Clone)]
pub struct MaskSegmenter {
    mask: GrayImage,
}

impl MaskSegmenter {
    #[must_use]
    pub fn new(mask: GrayImage) -> Self {
        Self { mask }
    }

    /// Load the mask from an image file (converted to 8-bit luma)
    ///
    /// # Errors
    /// - The mask file cannot be opened or decoded
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let mask = image::open(path_ref)
            .map_err(|e| {
                BgRemovalError::invalid_input(format!(
                    "Failed to load mask '{}': {}",
                    path_ref.display(),
                    e
                ))
            })?
            .into_luma8();
        log::debug!(
            "Loaded mask {} ({}x{})",
            path_ref.display(),
            mask.width(),
            mask.height()
        );
        Ok(Self::new(mask))
    }

    #[must_use]
    pub fn mask_dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }
}

impl SegmentationService for MaskSegmenter {
    fn segment(&self, image: &RgbaImage) -> Result<ForegroundResult> {
        let (width, height) = image.dimensions();
        if self.mask.width() == 0 || self.mask.height() == 0 {
            return Err(BgRemovalError::segmentation("Mask has no pixels"));
        }

        let resized;
        let mask = if self.mask.dimensions() == (width, height) {
            &self.mask
        } else {
            resized = imageops::resize(&self.mask, width, height, imageops::FilterType::Triangle);
            &resized
        };

        if mask.pixels().all(|p| p[0] == 0) {
            return Ok(ForegroundResult::nothing());
        }

        let mut foreground = RgbaImage::new(width, height);
        for ((source, alpha), target) in image
            .pixels()
            .zip(mask.pixels())
            .zip(foreground.pixels_mut())
        {
            let alpha = alpha[0];
            if alpha > 0 {
                *target = Rgba([source[0], source[1], source[2], alpha]);
            }
        }
        Ok(ForegroundResult::found(foreground))
    }

    fn is_available(&self) -> bool {
        self.mask.width() > 0 && self.mask.height() > 0
    }

    fn name(&self) -> &'static str {
        "mask"
    }
}
