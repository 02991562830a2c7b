//! Budgeted image loading

use crate::codec::ImageCodec;
use crate::error::{BgRemovalError, Result};
use crate::location::ImageLocation;
use crate::sizing::PixelBudget;
use image::RgbaImage;
use std::sync::Arc;

/// Loads source images no larger than a fixed pixel budget
#[derive(Clone)]
pub struct ImageLoader {
    codec: Arc<dyn ImageCodec>,
    max_pixels: u64,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("codec", &self.codec.name())
            .field("max_pixels", &self.max_pixels)
            .finish()
    }
}

impl ImageLoader {
    #[must_use]
    pub fn new(codec: Arc<dyn ImageCodec>, max_pixels: u64) -> Self {
        Self { codec, max_pixels }
    }

    #[must_use]
    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    /// Read the source header and plan its decode size
    ///
    /// # Errors
    /// - The source header cannot be read (`LoadFailure`, `MemoryPressure`)
    /// - The source reports a zero dimension (`InvalidInput`)
    pub fn plan(&self, location: &ImageLocation) -> Result<PixelBudget> {
        let (width, height) = self.codec.dimensions(location)?;
        PixelBudget::plan(width, height, self.max_pixels)
    }

    /// Decode the source at the planned size
    ///
    /// # Errors
    /// - Any codec decode failure
    /// - The codec returned a different size than requested (`Internal`)
    pub fn load(&self, location: &ImageLocation, budget: &PixelBudget) -> Result<RgbaImage> {
        let (width, height) = budget.target_dimensions();
        let image = self.codec.decode(location, width, height)?;
        if image.dimensions() != (width, height) {
            return Err(BgRemovalError::processing_stage_error(
                "image loading",
                &format!(
                    "codec '{}' returned {}x{} instead of {}x{}",
                    self.codec.name(),
                    image.width(),
                    image.height(),
                    width,
                    height
                ),
                Some(&location.to_string()),
            ));
        }
        log::debug!("Loaded {} at {}x{}", location, width, height);
        Ok(image)
    }
}
