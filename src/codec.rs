//! Image codec seam
//!
//! The pipeline only needs three things from a codec: the source size
//! without decoding pixels, a decode at a planned size, and an encode of the
//! result. [`ImageCrateCodec`] provides them with the `image` crate.

use crate::config::OutputFormat;
use crate::error::{BgRemovalError, Result};
use crate::location::ImageLocation;
use image::{imageops::FilterType, ImageReader, Limits, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Decode/encode capability used by the pipeline
pub trait ImageCodec: Send + Sync {
    /// Source dimensions, read from the header only
    ///
    /// # Errors
    /// - `LoadFailure` when the source is missing or not a decodable image
    fn dimensions(&self, location: &ImageLocation) -> Result<(u32, u32)>;

    /// Decode the source into an RGBA image of exactly the given size
    ///
    /// # Errors
    /// - `MemoryPressure` when an allocation fails
    /// - `LoadFailure` for any other decode failure
    fn decode(
        &self,
        location: &ImageLocation,
        target_width: u32,
        target_height: u32,
    ) -> Result<RgbaImage>;

    /// Encode an RGBA image, preserving alpha
    ///
    /// # Errors
    /// - `MemoryPressure` when an allocation fails
    /// - `Internal` for any other encoder failure
    fn encode(&self, image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>>;

    /// Codec name for logging
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Codec backed by the `image` crate
///
/// The crate cannot decode at a reduced size, so a source is decoded in full
/// and resampled straight away. Its default 512 MiB allocation cap would turn
/// every large photo into a failure, so decoding runs without limits unless a
/// ceiling is set with [`with_max_decode_bytes`](Self::with_max_decode_bytes).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec {
    max_decode_bytes: Option<u64>,
}

impl ImageCrateCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse sources whose full decode would allocate more than `bytes`
    ///
    /// Refused sources fail with `LoadFailure` and are not retried.
    #[must_use]
    pub fn with_max_decode_bytes(mut self, bytes: u64) -> Self {
        self.max_decode_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn max_decode_bytes(&self) -> Option<u64> {
        self.max_decode_bytes
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::no_limits();
        limits.max_alloc = self.max_decode_bytes;
        limits
    }

    fn open(&self, path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>> {
        if !path.exists() {
            return Err(BgRemovalError::load_failure(format!(
                "Image file does not exist: {}",
                path.display()
            )));
        }

        let mut reader = ImageReader::open(path)
            .and_then(ImageReader::with_guessed_format)
            .map_err(|e| classify_io(&e, path))?;
        reader.limits(self.limits());
        Ok(reader)
    }
}

impl ImageCodec for ImageCrateCodec {
    fn dimensions(&self, location: &ImageLocation) -> Result<(u32, u32)> {
        let reader = self.open(location.path())?;
        if reader.format().is_none() {
            return Err(BgRemovalError::load_failure(format!(
                "Unrecognized image format: {}",
                location
            )));
        }
        reader
            .into_dimensions()
            .map_err(BgRemovalError::from_decode_error)
    }

    fn decode(
        &self,
        location: &ImageLocation,
        target_width: u32,
        target_height: u32,
    ) -> Result<RgbaImage> {
        let decoded = self.open(location.path())?
            .decode()
            .map_err(BgRemovalError::from_decode_error)?;

        if decoded.width() == target_width && decoded.height() == target_height {
            return Ok(decoded.into_rgba8());
        }

        log::debug!(
            "Resampling {} from {}x{} to {}x{}",
            location,
            decoded.width(),
            decoded.height(),
            target_width,
            target_height
        );
        // The full-size decode is dropped as soon as the resampled copy exists
        let resized = decoded.resize_exact(target_width, target_height, FilterType::Triangle);
        drop(decoded);
        Ok(resized.into_rgba8())
    }

    fn encode(&self, image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), format.image_format())
            .map_err(BgRemovalError::from_encode_error)?;
        Ok(buffer)
    }

    fn name(&self) -> &'static str {
        "image"
    }
}

fn classify_io(error: &std::io::Error, path: &Path) -> BgRemovalError {
    if error.kind() == std::io::ErrorKind::OutOfMemory {
        BgRemovalError::memory_pressure(format!("Reading {}: {}", path.display(), error))
    } else {
        BgRemovalError::load_failure(format!("Failed to open '{}': {}", path.display(), error))
    }
}
