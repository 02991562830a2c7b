//! Error types for background removal operations

use image::error::ImageError;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error kinds surfaced by the removal pipeline
///
/// Each variant maps to a stable [`code`](BgRemovalError::code) so an
/// application shell can branch on the kind without parsing messages.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Another removal is already in flight; nothing was started
    #[error("Another background removal is in progress")]
    Busy,

    /// On-device segmentation is unavailable; the caller should use a
    /// remote service instead
    #[error("On-device background removal is not available on this device")]
    Unsupported,

    /// The image location could not be parsed or is not supported
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The source image could not be decoded for a reason other than memory
    #[error("Could not load image: {0}")]
    LoadFailure(String),

    /// An allocation failed; retried by the retry controller
    #[error("Memory pressure: {0}")]
    MemoryPressure(String),

    /// Memory pressure persisted through every allowed attempt
    #[error("Out of memory after {attempts} attempts: {cause}")]
    OutOfMemory { attempts: u32, cause: String },

    /// The segmentation service failed for a reason other than memory
    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    /// Segmentation finished but found nothing to keep
    #[error("No foreground detected")]
    NoForeground,

    /// The encoded result could not be written
    #[error("Could not save result: {0}")]
    Persistence(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors raised by adapters
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec errors raised by adapters
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new load failure error
    pub fn load_failure<S: Into<String>>(msg: S) -> Self {
        Self::LoadFailure(msg.into())
    }

    /// Create a new memory pressure error
    pub fn memory_pressure<S: Into<String>>(msg: S) -> Self {
        Self::MemoryPressure(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for this error kind
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Busy => "BACKGROUND_REMOVER_BUSY",
            Self::Unsupported => "REQUIRES_API_FALLBACK",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::LoadFailure(_) => "LOAD_ERROR",
            Self::MemoryPressure(_) => "MEMORY_PRESSURE",
            Self::OutOfMemory { .. } => "OOM_ERROR",
            Self::Segmentation(_) => "PROCESSING_FAILED",
            Self::NoForeground => "NO_FOREGROUND",
            Self::Persistence(_) => "SAVE_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) | Self::Image(_) | Self::Internal(_) => "BACKGROUND_REMOVAL_ERROR",
        }
    }

    /// Whether this failure is plausibly resolved by retrying after relief
    #[must_use]
    pub fn is_memory_pressure(&self) -> bool {
        match self {
            Self::MemoryPressure(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::OutOfMemory,
            Self::Image(e) => image_error_is_memory(e),
            _ => false,
        }
    }

    /// Classify a codec error raised while decoding a source image
    ///
    /// Allocation failures become [`BgRemovalError::MemoryPressure`]; every
    /// other codec failure is a [`BgRemovalError::LoadFailure`]. A decode
    /// rejected by a configured `Limits` ceiling fails the same way on every
    /// attempt, so it is a load failure too.
    #[must_use]
    pub fn from_decode_error(error: ImageError) -> Self {
        if image_error_is_memory(&error) {
            Self::MemoryPressure(error.to_string())
        } else {
            Self::LoadFailure(error.to_string())
        }
    }

    /// Classify a codec error raised while encoding a result image
    #[must_use]
    pub fn from_encode_error(error: ImageError) -> Self {
        if image_error_is_memory(&error) {
            Self::MemoryPressure(error.to_string())
        } else {
            Self::Internal(format!("Failed to encode result: {}", error))
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Internal(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

fn image_error_is_memory(error: &ImageError) -> bool {
    match error {
        ImageError::IoError(io) => io.kind() == std::io::ErrorKind::OutOfMemory,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::error::{LimitError, LimitErrorKind};
    use std::path::Path;

    #[test]
    fn test_error_codes_are_distinct_per_kind() {
        assert_eq!(BgRemovalError::Busy.code(), "BACKGROUND_REMOVER_BUSY");
        assert_eq!(BgRemovalError::NoForeground.code(), "NO_FOREGROUND");
        assert_eq!(BgRemovalError::Unsupported.code(), "REQUIRES_API_FALLBACK");
        assert_eq!(
            BgRemovalError::OutOfMemory {
                attempts: 3,
                cause: "alloc".to_string()
            }
            .code(),
            "OOM_ERROR"
        );
        assert_ne!(
            BgRemovalError::NoForeground.code(),
            BgRemovalError::segmentation("boom").code()
        );
    }

    #[test]
    fn test_error_display() {
        let err = BgRemovalError::OutOfMemory {
            attempts: 3,
            cause: "bitmap allocation".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Out of memory after 3 attempts: bitmap allocation"
        );

        let err = BgRemovalError::invalid_config("bad budget");
        assert_eq!(err.to_string(), "Invalid configuration: bad budget");
    }

    #[test]
    fn test_memory_classification() {
        let io_oom = ImageError::IoError(std::io::Error::new(std::io::ErrorKind::OutOfMemory, "oom"));
        assert!(matches!(
            BgRemovalError::from_decode_error(io_oom),
            BgRemovalError::MemoryPressure(_)
        ));

        // A configured allocation ceiling rejects the same source every time
        let limit = ImageError::Limits(LimitError::from_kind(LimitErrorKind::InsufficientMemory));
        let err = BgRemovalError::from_decode_error(limit);
        assert!(matches!(err, BgRemovalError::LoadFailure(_)));
        assert!(!err.is_memory_pressure());
        let limit = ImageError::Limits(LimitError::from_kind(LimitErrorKind::InsufficientMemory));
        assert!(!BgRemovalError::Image(limit).is_memory_pressure());

        let dims = ImageError::Limits(LimitError::from_kind(LimitErrorKind::DimensionError));
        assert!(matches!(
            BgRemovalError::from_decode_error(dims),
            BgRemovalError::LoadFailure(_)
        ));

        let io = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "oom");
        assert!(BgRemovalError::from(io).is_memory_pressure());
        assert!(!BgRemovalError::NoForeground.is_memory_pressure());
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = BgRemovalError::file_io_error("write result", Path::new("/out/a.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write result"));
        assert!(error_string.contains("/out/a.png"));

        let err = BgRemovalError::config_value_error("max_attempts", 0, "1-10", Some(3));
        let error_string = err.to_string();
        assert!(error_string.contains("max_attempts"));
        assert!(error_string.contains("1-10"));
        assert!(error_string.contains("Recommended: 3"));

        let err = BgRemovalError::processing_stage_error("trim", "worker panicked", Some("8 regions"));
        assert!(err.to_string().contains("trim"));
        assert!(err.to_string().contains("8 regions"));
    }
}
