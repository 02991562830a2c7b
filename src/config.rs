//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Reference decode budget: 4 megapixels
pub const DEFAULT_MAX_PIXELS: u64 = 4_000_000;

/// Attempts allowed before memory pressure escalates to out-of-memory
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Images at or below this pixel count are always trimmed sequentially
pub const DEFAULT_PARALLEL_PIXEL_THRESHOLD: u64 = 1_000_000;

/// Minimum worker count for the parallel trim (also the minimum core count)
pub const DEFAULT_MIN_WORKERS: usize = 4;

/// Maximum worker count for the parallel trim
pub const DEFAULT_MAX_WORKERS: usize = 8;

const MAX_ATTEMPTS_CEILING: u32 = 10;

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
}

impl OutputFormat {
    /// File extension (without the dot)
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
        }
    }

    /// Matching `image` crate format
    #[must_use]
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// Per-call options passed alongside the image location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalOptions {
    /// Crop transparent borders from the result (default: true)
    pub trim: bool,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self { trim: true }
    }
}

impl RemovalOptions {
    /// Options with trimming set explicitly
    #[must_use]
    pub fn with_trim(trim: bool) -> Self {
        Self { trim }
    }
}

/// Configuration for the removal pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Maximum decoded pixel count per attempt
    pub max_pixels: u64,

    /// Attempts allowed when allocations fail
    pub max_attempts: u32,

    /// Pixel count above which trimming may run in parallel
    pub parallel_pixel_threshold: u64,

    /// Lower clamp for the trim worker count
    pub min_workers: usize,

    /// Upper clamp for the trim worker count
    pub max_workers: usize,

    /// Execution units to plan for (None = detect at runtime)
    pub available_units: Option<usize>,

    /// Encoded output format
    pub output_format: OutputFormat,

    /// Directory for results (None = system temp dir)
    pub output_dir: Option<PathBuf>,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            max_pixels: DEFAULT_MAX_PIXELS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            parallel_pixel_threshold: DEFAULT_PARALLEL_PIXEL_THRESHOLD,
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            available_units: None,
            output_format: OutputFormat::default(),
            output_dir: None,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bgremove_ondevice::RemovalConfig;
    ///
    /// let config = RemovalConfig::builder()
    ///     .max_pixels(2_000_000)
    ///     .max_attempts(2)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_attempts, 2);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - `max_pixels` is zero
    /// - `max_attempts` outside 1-10
    /// - `min_workers` is zero or greater than `max_workers`
    /// - `available_units` is `Some(0)`
    pub fn validate(&self) -> Result<()> {
        if self.max_pixels == 0 {
            return Err(BgRemovalError::config_value_error(
                "max_pixels",
                self.max_pixels,
                ">= 1",
                Some(DEFAULT_MAX_PIXELS),
            ));
        }

        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_CEILING {
            return Err(BgRemovalError::config_value_error(
                "max_attempts",
                self.max_attempts,
                "1-10",
                Some(DEFAULT_MAX_ATTEMPTS),
            ));
        }

        if self.min_workers == 0 || self.min_workers > self.max_workers {
            return Err(BgRemovalError::invalid_config(format!(
                "Worker range {}..={} is empty or starts at zero",
                self.min_workers, self.max_workers
            )));
        }

        if self.available_units == Some(0) {
            return Err(BgRemovalError::invalid_config(
                "available_units must be at least 1 when set",
            ));
        }

        Ok(())
    }

    /// Directory results are written into
    #[must_use]
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Parse and validate a configuration from JSON
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    /// - Malformed JSON
    /// - Any [`validate`](Self::validate) failure
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BgRemovalError::invalid_config(format!("Malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    ///
    /// # Errors
    /// - The file cannot be read
    /// - Any [`from_json_str`](Self::from_json_str) failure
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path_ref, &e))?;
        Self::from_json_str(&content)
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set the decode pixel budget
    #[must_use]
    pub fn max_pixels(mut self, max_pixels: u64) -> Self {
        self.config.max_pixels = max_pixels;
        self
    }

    /// Set the attempt ceiling for memory-pressure retries
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set the pixel count above which trimming may run in parallel
    #[must_use]
    pub fn parallel_pixel_threshold(mut self, pixels: u64) -> Self {
        self.config.parallel_pixel_threshold = pixels;
        self
    }

    /// Set the worker clamp range for parallel trimming
    #[must_use]
    pub fn worker_range(mut self, min_workers: usize, max_workers: usize) -> Self {
        self.config.min_workers = min_workers;
        self.config.max_workers = max_workers;
        self
    }

    /// Override detected execution units
    #[must_use]
    pub fn available_units(mut self, units: usize) -> Self {
        self.config.available_units = Some(units);
        self
    }

    /// Set output format
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set the directory results are written into
    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any [`RemovalConfig::validate`] failure
    pub fn build(self) -> Result<RemovalConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RemovalConfig::default();
        assert_eq!(config.max_pixels, 4_000_000);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.parallel_pixel_threshold, 1_000_000);
        assert_eq!((config.min_workers, config.max_workers), (4, 8));
        assert_eq!(config.output_format, OutputFormat::Png);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RemovalConfig::builder()
            .max_pixels(1000)
            .max_attempts(5)
            .available_units(6)
            .output_dir("/tmp/results")
            .output_format(OutputFormat::Png)
            .build()
            .unwrap();

        assert_eq!(config.max_pixels, 1000);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.available_units, Some(6));
        assert_eq!(config.resolved_output_dir(), PathBuf::from("/tmp/results"));
        assert_eq!(config.output_format.extension(), "png");
        assert_eq!(config.output_format.image_format(), image::ImageFormat::Png);
    }

    #[test]
    fn test_config_validation_failures() {
        assert!(RemovalConfig::builder().max_pixels(0).build().is_err());
        assert!(RemovalConfig::builder().max_attempts(0).build().is_err());
        assert!(RemovalConfig::builder().max_attempts(11).build().is_err());
        assert!(RemovalConfig::builder().worker_range(0, 8).build().is_err());
        assert!(RemovalConfig::builder().worker_range(9, 8).build().is_err());
        assert!(RemovalConfig::builder().available_units(0).build().is_err());

        let err = RemovalConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
        assert!(err.to_string().contains("Recommended: 3"));
    }

    #[test]
    fn test_config_from_json() {
        let config = RemovalConfig::from_json_str(r#"{"max_pixels": 500, "max_workers": 6}"#)
            .unwrap();
        assert_eq!(config.max_pixels, 500);
        assert_eq!(config.max_workers, 6);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);

        assert!(RemovalConfig::from_json_str(r#"{"max_attempts": 0}"#).is_err());
        assert!(RemovalConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_options_default_to_trim() {
        assert!(RemovalOptions::default().trim);
        let parsed: RemovalOptions = serde_json::from_str("{}").unwrap();
        assert!(parsed.trim);
        let parsed: RemovalOptions = serde_json::from_str(r#"{"trim": false}"#).unwrap();
        assert!(!parsed.trim);
    }
}
