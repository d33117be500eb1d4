//! Snapshot sources for branch reloads.
//!
//! A snapshot is a version folder of line-oriented objects plus a small
//! pointer file naming the latest folder.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tessera_core::{SnapshotError, TesseraResult};
use tokio::io::{AsyncBufRead, BufReader};

/// Buffered reader over one snapshot object.
pub type SnapshotReader = Box<dyn AsyncBufRead + Send + Unpin>;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Human-readable location for logs and errors.
    fn location(&self) -> String;

    /// Version folder named by the pointer file, trimmed.
    async fn latest_version(&self) -> TesseraResult<String>;

    /// Object names under a version folder, sorted.
    async fn list_objects(&self, version: &str) -> TesseraResult<Vec<String>>;

    async fn open(&self, version: &str, object: &str) -> TesseraResult<SnapshotReader>;
}

/// Snapshot tree on a local (or mounted) filesystem:
/// `{root}/{version_file}` holds the version, `{root}/{version}/*` the objects.
#[derive(Debug, Clone)]
pub struct DirectorySnapshotSource {
    root: PathBuf,
    version_file: String,
    buffer_bytes: usize,
}

impl DirectorySnapshotSource {
    pub fn new(root: impl Into<PathBuf>, version_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            version_file: version_file.into(),
            buffer_bytes: tessera_core::config::DEFAULT_LINE_INITIAL_BYTES,
        }
    }

    /// Read buffer used for each object.
    pub fn with_buffer_bytes(mut self, bytes: usize) -> Self {
        self.buffer_bytes = bytes.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unreachable(&self, path: &Path, e: std::io::Error) -> SnapshotError {
        SnapshotError::SourceUnreachable {
            location: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl SnapshotSource for DirectorySnapshotSource {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn latest_version(&self) -> TesseraResult<String> {
        let pointer = self.root.join(&self.version_file);
        let content = tokio::fs::read_to_string(&pointer)
            .await
            .map_err(|e| self.unreachable(&pointer, e))?;
        let version = content.trim();
        if version.is_empty() {
            return Err(SnapshotError::VersionPointerEmpty {
                location: pointer.display().to_string(),
            }
            .into());
        }
        Ok(version.to_string())
    }

    async fn list_objects(&self, version: &str) -> TesseraResult<Vec<String>> {
        let folder = self.root.join(version);
        let mut dir = tokio::fs::read_dir(&folder)
            .await
            .map_err(|e| self.unreachable(&folder, e))?;
        let mut objects = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| self.unreachable(&folder, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| self.unreachable(&entry.path(), e))?;
            if file_type.is_file() {
                objects.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        objects.sort();
        Ok(objects)
    }

    async fn open(&self, version: &str, object: &str) -> TesseraResult<SnapshotReader> {
        let path = self.root.join(version).join(object);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| self.unreachable(&path, e))?;
        Ok(Box::new(BufReader::with_capacity(self.buffer_bytes, file)))
    }
}
