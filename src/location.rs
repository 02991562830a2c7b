//! Image location parsing
//!
//! Callers hand the pipeline a string: either a filesystem path or a
//! `file://` URI. Anything else is rejected before any work starts.

use crate::error::{BgRemovalError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use url::{ParseError, Url};

const FALLBACK_NAME: &str = "result";

/// A parsed, local image location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocation {
    path: PathBuf,
}

impl ImageLocation {
    /// Parse a path or `file://` URI
    ///
    /// `file://` URIs must name a local file: an empty host or `localhost`.
    ///
    /// # Errors
    /// - Empty or whitespace-only input
    /// - A URI scheme other than `file`
    /// - A `file://` URI with a remote host or without a file name
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BgRemovalError::invalid_input("The provided image URI is empty"));
        }

        let url = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(ParseError::RelativeUrlWithoutBase) => {
                return Ok(Self {
                    path: PathBuf::from(trimmed),
                })
            },
            Err(e) => {
                return Err(BgRemovalError::invalid_input(format!(
                    "Malformed image URI '{}': {}",
                    raw, e
                )))
            },
        };

        // `C:\photos\a.png` parses as scheme `c`
        if url.scheme().len() == 1 {
            return Ok(Self {
                path: PathBuf::from(trimmed),
            });
        }

        if url.scheme() != "file" {
            return Err(BgRemovalError::invalid_input(format!(
                "Unsupported URI scheme '{}' in {}",
                url.scheme(),
                raw
            )));
        }

        let path = url.to_file_path().map_err(|()| {
            BgRemovalError::invalid_input(format!("Not a local file URI: {}", raw))
        })?;
        if path.file_name().is_none() {
            return Err(BgRemovalError::invalid_input(format!(
                "The provided image URI has no file name: {}",
                raw
            )));
        }
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Output file name: source stem with a new extension
    ///
    /// Falls back to `result.<ext>` when the source has no usable name.
    #[must_use]
    pub fn suggested_name(&self, extension: &str) -> String {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_NAME);
        format!("{}.{}", stem, extension)
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Render a local path as a `file://` URI
///
/// Relative paths are resolved against the working directory.
///
/// # Errors
/// - The working directory cannot be determined
/// - The path cannot be expressed as a URI
pub fn to_file_uri(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| BgRemovalError::file_io_error("resolve working directory for", path, &e))?
            .join(path)
    };

    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|()| {
            BgRemovalError::invalid_input(format!(
                "Cannot express '{}' as a file URI",
                absolute.display()
            ))
        })
}
