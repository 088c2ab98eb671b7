//! Per-conversion scratch directories.

use std::fmt;
use std::path::{Path, PathBuf};

use framereel_models::EncodeTarget;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::ConversionResult;

/// Name of the staged frames subdirectory.
const FRAMES_DIR: &str = "frames";

/// Working directory owned by exactly one conversion.
///
/// The directory tree is removed when the session is dropped. Removal errors
/// are logged and never propagated.
pub struct ConversionSession {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ConversionSession {
    /// Create a fresh session directory under `scratch_root`.
    pub fn create(scratch_root: &Path) -> ConversionResult<Self> {
        std::fs::create_dir_all(scratch_root)?;

        let dir = tempfile::Builder::new()
            .prefix("convert-")
            .tempdir_in(scratch_root)?;
        let path = dir.path().to_path_buf();
        std::fs::create_dir(path.join(FRAMES_DIR))?;

        info!("Created temp directory: {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Root of the session directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the canonically named frames.
    pub fn frames_dir(&self) -> PathBuf {
        self.path.join(FRAMES_DIR)
    }

    /// Where the encoder writes its output.
    pub fn output_path(&self, target: EncodeTarget) -> PathBuf {
        self.path.join(target.output_file_name())
    }

    /// Remove staged frames once they are no longer needed.
    pub async fn discard_frames(&self) {
        let frames_dir = self.frames_dir();
        if let Err(e) = tokio::fs::remove_dir_all(&frames_dir).await {
            warn!("Failed to remove frames directory {}: {}", frames_dir.display(), e);
        }
    }

    fn cleanup(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => debug!("Removed temp directory: {}", self.path.display()),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Cleanup error: failed to remove temp directory"
            ),
        }
    }
}

impl Drop for ConversionSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for ConversionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionSession")
            .field("path", &self.path)
            .field("open", &self.dir.is_some())
            .finish()
    }
}
