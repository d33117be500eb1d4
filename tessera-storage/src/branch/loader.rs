//! Branch table loading.
//!
//! Each snapshot object is newline-delimited `<key>,<value>` text. The value
//! is kept as the raw encoded cell. Lines with the wrong field count and lines
//! over the configured maximum are logged and skipped; the load only fails
//! when the source itself cannot be read.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{SnapshotError, TesseraConfig, TesseraResult};
use tokio::io::AsyncBufReadExt;
use tokio::sync::Mutex;

use super::snapshot::{SnapshotReader, SnapshotSource};
use super::BranchCache;

/// Outcome of one successful load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub version: String,
    pub generation: u64,
    pub objects: usize,
    pub entries: usize,
    pub skipped_lines: usize,
    pub oversized_lines: usize,
}

enum LineRead {
    Line,
    Oversized,
    Eof,
}

/// Read one line into `buf` without its line ending. A line longer than
/// `max_bytes` is consumed whole and reported as oversized.
async fn next_line(
    reader: &mut SnapshotReader,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> std::io::Result<LineRead> {
    buf.clear();
    let mut oversized = false;
    let mut read_any = false;
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            read_any = true;
            let (chunk, used, done) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (&available[..i], i + 1, true),
                None => (available, available.len(), false),
            };
            if !oversized {
                if buf.len() + chunk.len() > max_bytes {
                    oversized = true;
                    buf.clear();
                } else {
                    buf.extend_from_slice(chunk);
                }
            }
            (used, done)
        };
        reader.consume(used);
        if done {
            break;
        }
    }

    if !read_any {
        return Ok(LineRead::Eof);
    }
    if oversized {
        return Ok(LineRead::Oversized);
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(LineRead::Line)
}

/// Loads snapshot versions into a [`BranchCache`], one load at a time.
pub struct BranchCacheLoader {
    cache: Arc<BranchCache>,
    source: Arc<dyn SnapshotSource>,
    line_initial_bytes: usize,
    line_max_bytes: usize,
    load_lock: Mutex<()>,
}

impl BranchCacheLoader {
    pub fn new(cache: Arc<BranchCache>, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            cache,
            source,
            line_initial_bytes: tessera_core::config::DEFAULT_LINE_INITIAL_BYTES,
            line_max_bytes: tessera_core::config::DEFAULT_LINE_MAX_BYTES,
            load_lock: Mutex::new(()),
        }
    }

    pub fn from_config(
        cache: Arc<BranchCache>,
        source: Arc<dyn SnapshotSource>,
        config: &TesseraConfig,
    ) -> Self {
        Self::new(cache, source).with_line_buffer(config.line_initial_bytes, config.line_max_bytes)
    }

    pub fn with_line_buffer(mut self, initial_bytes: usize, max_bytes: usize) -> Self {
        self.line_initial_bytes = initial_bytes.min(max_bytes);
        self.line_max_bytes = max_bytes;
        self
    }

    pub fn cache(&self) -> &Arc<BranchCache> {
        &self.cache
    }

    /// Startup load: read the version pointer, then load that version.
    pub async fn initialize(&self) -> TesseraResult<LoadReport> {
        let version = self.source.latest_version().await.map_err(|e| {
            tracing::error!(source = %self.source.location(), error = %e, "Branch cache version pointer unreadable");
            e
        })?;
        tracing::info!(source = %self.source.location(), version = %version, "Branch cache version resolved");
        self.load(&version).await
    }

    /// Load one version and swap it in. On failure the current table stays.
    pub async fn load(&self, version: &str) -> TesseraResult<LoadReport> {
        let _guard = self.load_lock.lock().await;
        self.cache.begin_loading();
        tracing::info!(source = %self.source.location(), version = %version, "Branch cache load started");

        match self.read_version(version).await {
            Ok((entries, mut report)) => {
                report.generation = self.cache.update(entries, Some(version.to_string()));
                tracing::info!(
                    version = %report.version,
                    generation = report.generation,
                    objects = report.objects,
                    entries = report.entries,
                    skipped_lines = report.skipped_lines,
                    oversized_lines = report.oversized_lines,
                    "Branch cache load complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.cache.abort_loading();
                tracing::error!(version = %version, error = %e, "Branch cache load failed");
                Err(e)
            }
        }
    }

    async fn read_version(
        &self,
        version: &str,
    ) -> TesseraResult<(HashMap<String, Vec<u8>>, LoadReport)> {
        let objects = self.source.list_objects(version).await?;
        let mut entries = HashMap::new();
        let mut report = LoadReport {
            version: version.to_string(),
            ..Default::default()
        };
        let mut buf = Vec::with_capacity(self.line_initial_bytes);

        for object in objects {
            let mut reader = match self.source.open(version, &object).await {
                Ok(reader) => reader,
                Err(e) => {
                    tracing::warn!(object = %object, error = %e, "Skipping unreadable snapshot object");
                    continue;
                }
            };
            let before = entries.len();
            loop {
                let line = next_line(&mut reader, &mut buf, self.line_max_bytes)
                    .await
                    .map_err(|e| SnapshotError::Io {
                        reason: format!("{}/{}: {}", version, object, e),
                    })?;
                match line {
                    LineRead::Eof => break,
                    LineRead::Oversized => {
                        report.oversized_lines += 1;
                        tracing::warn!(
                            object = %object,
                            max_bytes = self.line_max_bytes,
                            "Skipping oversized snapshot line"
                        );
                    }
                    LineRead::Line if buf.is_empty() => {}
                    LineRead::Line => {
                        let parts: Vec<&[u8]> = buf.split(|b| *b == b',').collect();
                        if parts.len() != 2 {
                            report.skipped_lines += 1;
                            tracing::warn!(
                                object = %object,
                                parts = parts.len(),
                                line = %String::from_utf8_lossy(&buf[..buf.len().min(200)]),
                                "Skipping malformed snapshot line"
                            );
                            continue;
                        }
                        entries.insert(
                            String::from_utf8_lossy(parts[0]).into_owned(),
                            parts[1].to_vec(),
                        );
                    }
                }
            }
            report.objects += 1;
            tracing::info!(object = %object, entries = entries.len() - before, "Snapshot object loaded");
        }

        report.entries = entries.len();
        Ok((entries, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{CacheState, DirectorySnapshotSource};
    use tempfile::TempDir;

    fn snapshot_dir(version: &str, objects: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("latest.txt"), version).unwrap();
        let folder = dir.path().join(version);
        std::fs::create_dir_all(&folder).unwrap();
        for (name, content) in objects {
            std::fs::write(folder.join(name), content).unwrap();
        }
        dir
    }

    fn loader(dir: &TempDir) -> BranchCacheLoader {
        let source = Arc::new(DirectorySnapshotSource::new(dir.path(), "latest.txt").with_buffer_bytes(8));
        BranchCacheLoader::new(Arc::new(BranchCache::new()), source)
    }

    #[tokio::test]
    async fn test_initialize_loads_all_objects() {
        let dir = snapshot_dir(
            "v1",
            &[("a.csv", "d/7/a,AAA\nd/7/b,BBB\n"), ("b.csv", "d/7/c,CCC\r\n")],
        );
        let loader = loader(&dir);
        let report = loader.initialize().await.expect("load should succeed");
        assert_eq!(report.version, "v1");
        assert_eq!(report.objects, 2);
        assert_eq!(report.entries, 3);
        assert_eq!(loader.cache().read("d/7/c"), Some(b"CCC".to_vec()));
        assert!(matches!(loader.cache().state(), CacheState::Ready { entries: 3, .. }));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = snapshot_dir("v1", &[("a.csv", "good,1\nno-comma\na,b,c\n\nlast,2")]);
        let loader = loader(&dir);
        let report = loader.initialize().await.expect("load should succeed");
        assert_eq!(report.entries, 2);
        assert_eq!(report.skipped_lines, 2);
        assert_eq!(loader.cache().read("last"), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_oversized_line_skipped_not_fatal() {
        let long = format!("big,{}\nsmall,1\n", "x".repeat(500));
        let dir = snapshot_dir("v1", &[("a.csv", long.as_str())]);
        let source = Arc::new(DirectorySnapshotSource::new(dir.path(), "latest.txt").with_buffer_bytes(16));
        let loader = BranchCacheLoader::new(Arc::new(BranchCache::new()), source).with_line_buffer(8, 64);
        let report = loader.initialize().await.expect("load should succeed");
        assert_eq!(report.oversized_lines, 1);
        assert_eq!(report.entries, 1);
        assert!(loader.cache().read("big").is_none());
        assert_eq!(loader.cache().read("small"), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_large_line_within_max_survives_small_buffers() {
        let value = "y".repeat(4096);
        let content = format!("k,{}\n", value);
        let dir = snapshot_dir("v1", &[("a.csv", content.as_str())]);
        let loader = loader(&dir).with_line_buffer(4, 10_000);
        loader.initialize().await.expect("load should succeed");
        assert_eq!(loader.cache().read("k"), Some(value.into_bytes()));
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_generation() {
        let dir = snapshot_dir("v1", &[("a.csv", "k,old\n")]);
        let loader = loader(&dir);
        loader.initialize().await.expect("load should succeed");

        let err = loader.load("missing-version").await.unwrap_err();
        assert!(matches!(err, tessera_core::TesseraError::Snapshot(_)));
        assert_eq!(loader.cache().read("k"), Some(b"old".to_vec()));
        assert!(matches!(loader.cache().state(), CacheState::Ready { .. }));
    }
}
