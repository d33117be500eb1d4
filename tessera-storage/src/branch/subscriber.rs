//! Reload notifications.
//!
//! The snapshot producer announces each new version folder. Every notice is
//! acknowledged before the load starts, so redelivery never queues a second
//! load of a version that is already underway. Loads run in the background
//! and a failed load leaves the current table serving.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::loader::BranchCacheLoader;

/// "A new snapshot version is available."
#[derive(Debug)]
pub struct SnapshotNotice {
    pub version: String,
    /// Completed as soon as the notice is received.
    pub ack: Option<oneshot::Sender<()>>,
}

impl SnapshotNotice {
    pub fn new(version: impl Into<String>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                version: version.into(),
                ack: Some(tx),
            },
            rx,
        )
    }

    /// A notice nobody waits on.
    pub fn unacked(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ack: None,
        }
    }
}

/// Per-process subscriber that turns notices into background loads.
pub struct ReloadSubscriber {
    id: String,
    loader: Arc<BranchCacheLoader>,
}

impl ReloadSubscriber {
    pub fn new(loader: Arc<BranchCacheLoader>) -> Self {
        Self {
            id: format!("branch-cache-subscriber-{}", Uuid::now_v7()),
            loader,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Consume notices until the channel closes or shutdown flips to true.
    pub async fn run(
        self,
        mut notices: mpsc::Receiver<SnapshotNotice>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!(subscriber = %self.id, "Branch cache subscriber started");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!(subscriber = %self.id, "Branch cache subscriber shutting down");
                        break;
                    }
                }

                notice = notices.recv() => {
                    let Some(mut notice) = notice else {
                        tracing::info!(subscriber = %self.id, "Branch cache notice channel closed");
                        break;
                    };
                    if let Some(ack) = notice.ack.take() {
                        let _ = ack.send(());
                    }
                    tracing::info!(subscriber = %self.id, version = %notice.version, "Branch cache reload notice received");

                    let loader = Arc::clone(&self.loader);
                    tokio::spawn(async move {
                        // load() logs its own failure
                        let _ = loader.load(&notice.version).await;
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{BranchCache, DirectorySnapshotSource};
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_version(dir: &TempDir, version: &str, content: &str) {
        let folder = dir.path().join(version);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("part-0.csv"), content).unwrap();
    }

    async fn wait_for(cache: &BranchCache, key: &str, expected: &[u8]) -> bool {
        for _ in 0..200 {
            if cache.read(key).as_deref() == Some(expected) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_notice_is_acked_and_reload_swaps_table() {
        let dir = TempDir::new().unwrap();
        write_version(&dir, "v1", "k,one\n");
        write_version(&dir, "v2", "k,two\n");
        std::fs::write(dir.path().join("latest.txt"), "v1").unwrap();

        let cache = Arc::new(BranchCache::new());
        let source = Arc::new(DirectorySnapshotSource::new(dir.path(), "latest.txt"));
        let loader = Arc::new(BranchCacheLoader::new(Arc::clone(&cache), source));
        loader.initialize().await.expect("initial load should succeed");

        let subscriber = ReloadSubscriber::new(Arc::clone(&loader));
        assert!(subscriber.id().starts_with("branch-cache-subscriber-"));

        let (tx, rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(subscriber.run(rx, shutdown_rx));

        let (notice, acked) = SnapshotNotice::new("v2");
        tx.send(notice).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), acked)
            .await
            .expect("ack should arrive")
            .expect("ack sender kept");
        assert!(wait_for(&cache, "k", b"two").await);

        let _ = shutdown_tx.send(true);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("subscriber should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_serving() {
        let dir = TempDir::new().unwrap();
        write_version(&dir, "v1", "k,one\n");
        std::fs::write(dir.path().join("latest.txt"), "v1").unwrap();

        let cache = Arc::new(BranchCache::new());
        let source = Arc::new(DirectorySnapshotSource::new(dir.path(), "latest.txt"));
        let loader = Arc::new(BranchCacheLoader::new(Arc::clone(&cache), source));
        loader.initialize().await.unwrap();

        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(ReloadSubscriber::new(loader).run(rx, shutdown_rx));

        tx.send(SnapshotNotice::unacked("does-not-exist")).await.unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("subscriber should stop when channel closes")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.read("k"), Some(b"one".to_vec()));
    }
}
