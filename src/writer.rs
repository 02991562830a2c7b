//! Result persistence

use crate::error::{BgRemovalError, Result};
use crate::location::to_file_uri;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stores encoded results and returns where they ended up
pub trait ResultWriter: Send + Sync {
    /// Persist `bytes` under (a sanitized form of) `suggested_name`
    ///
    /// # Errors
    /// - `Persistence` when the bytes cannot be stored
    fn write(&self, bytes: &[u8], suggested_name: &str) -> Result<String>;
}

/// Writes results into a directory and returns `file://` URIs
///
/// Each result is written to a temporary file in the target directory and
/// then renamed into place, so readers never observe a partial file. An
/// existing result with the same name is replaced.
#[derive(Debug, Clone)]
pub struct FileSystemWriter {
    output_dir: PathBuf,
}

impl FileSystemWriter {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn target_path(&self, suggested_name: &str) -> PathBuf {
        let name = Path::new(suggested_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("result.png");
        self.output_dir.join(name)
    }
}

impl ResultWriter for FileSystemWriter {
    fn write(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            BgRemovalError::persistence(format!(
                "Failed to create output directory '{}': {}",
                self.output_dir.display(),
                e
            ))
        })?;

        let target = self.target_path(suggested_name);
        let mut staging = tempfile::NamedTempFile::new_in(&self.output_dir).map_err(|e| {
            BgRemovalError::persistence(format!(
                "Failed to create staging file in '{}': {}",
                self.output_dir.display(),
                e
            ))
        })?;

        staging
            .write_all(bytes)
            .and_then(|()| staging.flush())
            .map_err(|e| BgRemovalError::persistence(format!("Failed to write result: {}", e)))?;

        staging.persist(&target).map_err(|e| {
            BgRemovalError::persistence(format!(
                "Failed to move result into '{}': {}",
                target.display(),
                e.error
            ))
        })?;

        log::info!("Saved {} bytes to {}", bytes.len(), target.display());
        to_file_uri(&target)
            .map_err(|e| BgRemovalError::persistence(format!("Saved result has no URI: {}", e)))
    }
}
