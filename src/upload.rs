//! Pushing finished artifacts to remote storage. Concrete cloud providers live outside this crate;
//! [LocalDirGateway] copies into a directory tree (a mounted drive, a synced folder).

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload to '{destination}' failed: {reason}")]
    UploadFailed { destination: String, reason: String },
}

pub trait UploadGateway: Send + Sync {
    /// Store `local` at `destination` (a `/`-separated relative path). Not retried by callers.
    fn upload(&self, local: &Path, destination: &str) -> Result<(), UploadError>;
}

/// Destination for an artifact: `{series}/{file name}`.
pub fn destination_for(series_dir: &str, local: &Path) -> String {
    let file = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", series_dir, file)
}

#[derive(Debug, Clone)]
pub struct LocalDirGateway {
    root: PathBuf,
}

impl LocalDirGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a destination onto the root, refusing anything that would step outside it.
    fn target(&self, destination: &str) -> Result<PathBuf, UploadError> {
        let relative = Path::new(destination);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if destination.trim().is_empty() || escapes {
            return Err(UploadError::UploadFailed {
                destination: destination.to_string(),
                reason: "destination must be a relative path inside the upload root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl UploadGateway for LocalDirGateway {
    fn upload(&self, local: &Path, destination: &str) -> Result<(), UploadError> {
        let failed = |reason: String| UploadError::UploadFailed {
            destination: destination.to_string(),
            reason,
        };
        let target = self.target(destination)?;
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| failed(format!("cannot create {}: {}", dir.display(), e)))?;
        }
        std::fs::copy(local, &target)
            .map_err(|e| failed(format!("cannot copy {}: {}", local.display(), e)))?;
        log::info!("uploaded {} -> {}", local.display(), target.display());
        Ok(())
    }
}
