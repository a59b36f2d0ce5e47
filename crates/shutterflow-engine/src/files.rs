//! Storage for uploaded reference photos and captured artifacts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shutterflow_device::CAPTURE_FILE_PREFIX;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, ShutterflowError};

/// Extension used when an upload's name carries none we accept.
const DEFAULT_EXTENSION: &str = "jpg";

/// Where the engine keeps its files.
#[async_trait]
pub trait FileStore: Send + Sync + std::fmt::Debug {
    /// Stores an uploaded photo under a fresh unique name.
    ///
    /// The stored file must decode as an image; otherwise it is removed and
    /// [`ShutterflowError::InvalidImageError`] is returned.
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<PathBuf>;

    /// Returns `true` if a regular file exists at `path`.
    async fn exists(&self, path: &Path) -> bool;

    /// Deletes `path`. Returns `false` if it was already gone.
    async fn delete(&self, path: &Path) -> Result<bool>;

    /// Deletes all but the `keep_latest` most recent capture artifacts.
    /// Returns the number of files removed.
    async fn prune_captures(&self, keep_latest: usize) -> Result<usize>;
}

/// [`FileStore`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    upload_dir: PathBuf,
    capture_dir: PathBuf,
}

impl LocalFileStore {
    /// Creates a store writing uploads to `upload_dir` and pruning
    /// `capture_dir`. Directories are created on first use.
    #[must_use]
    pub fn new(upload_dir: impl Into<PathBuf>, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            capture_dir: capture_dir.into(),
        }
    }

    /// Directory uploads are written to.
    #[must_use]
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Directory captures are pruned from.
    #[must_use]
    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }
}

/// Keeps a short alphanumeric extension from the suggested name.
fn upload_file_name(suggested_name: &str) -> String {
    let extension = Path::new(suggested_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map_or_else(|| DEFAULT_EXTENSION.to_string(), str::to_lowercase);
    format!("{}.{extension}", Uuid::new_v4())
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(upload_file_name(suggested_name));
        tokio::fs::write(&path, bytes).await?;

        let candidate = bytes.to_vec();
        let decoded = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&candidate).map(|_| ())
        })
        .await
        .map_err(|e| ShutterflowError::invalid_image(format!("validation task failed: {e}")))?;

        if let Err(e) = decoded {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %remove_err, "Failed to remove rejected upload");
            }
            return Err(ShutterflowError::invalid_image(e.to_string()));
        }

        info!(path = %path.display(), bytes = bytes.len(), "Upload stored");
        Ok(path)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .is_ok_and(|meta| meta.is_file())
    }

    async fn delete(&self, path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn prune_captures(&self, keep_latest: usize) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.capture_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut captures = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(CAPTURE_FILE_PREFIX) {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                captures.push((meta.modified()?, name, entry.path()));
            }
        }

        // Newest first; names embed a timestamp and break mtime ties.
        captures.sort_by(|a, b| (&b.0, &b.1).cmp(&(&a.0, &a.1)));

        let mut removed = 0;
        for (_, _, path) in captures.into_iter().skip(keep_latest) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to prune capture"),
            }
        }
        if removed > 0 {
            info!(removed, keep_latest, "Pruned old captures");
        }
        Ok(removed)
    }
}
