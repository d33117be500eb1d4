//! Branch tier: an in-memory key -> encoded cell map, replaced wholesale.
//!
//! Readers take a reference-counted handle to the current [`Generation`]
//! under a brief read lock and then look up keys without holding any lock.
//! A reload builds a complete new map off to the side and swaps the handle,
//! so a single lookup always sees exactly one generation.

mod loader;
mod snapshot;
mod subscriber;

pub use loader::{BranchCacheLoader, LoadReport};
pub use snapshot::{DirectorySnapshotSource, SnapshotReader, SnapshotSource};
pub use subscriber::{ReloadSubscriber, SnapshotNotice};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

/// One complete branch table.
#[derive(Debug, Default)]
pub struct Generation {
    /// 0 for the empty table the cache starts with.
    pub id: u64,
    pub version: Option<String>,
    pub entries: HashMap<String, Vec<u8>>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl Generation {
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lifecycle of the branch table as seen by operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    Uninitialized,
    Loading,
    Ready {
        generation: u64,
        version: Option<String>,
        entries: usize,
    },
}

#[derive(Debug)]
pub struct BranchCache {
    current: RwLock<Arc<Generation>>,
    next_id: AtomicU64,
    loading: AtomicBool,
}

impl Default for BranchCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Generation::default())),
            next_id: AtomicU64::new(1),
            loading: AtomicBool::new(false),
        }
    }

    /// Build a ready cache from a fixed table.
    pub fn with_entries(entries: HashMap<String, Vec<u8>>) -> Self {
        let cache = Self::new();
        cache.update(entries, None);
        cache
    }

    /// The generation current at the time of the call.
    pub fn snapshot(&self) -> Arc<Generation> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.snapshot().get(key).map(<[u8]>::to_vec)
    }

    /// Replace the whole table. Returns the new generation id.
    pub fn update(&self, entries: HashMap<String, Vec<u8>>, version: Option<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let generation = Arc::new(Generation {
            id,
            version,
            entries,
            loaded_at: Some(Utc::now()),
        });
        match self.current.write() {
            Ok(mut guard) => *guard = generation,
            Err(poisoned) => *poisoned.into_inner() = generation,
        }
        self.loading.store(false, Ordering::SeqCst);
        id
    }

    pub fn begin_loading(&self) {
        self.loading.store(true, Ordering::SeqCst);
    }

    /// Drop the loading mark after a failed load; the old table keeps serving.
    pub fn abort_loading(&self) {
        self.loading.store(false, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> CacheState {
        if self.loading.load(Ordering::SeqCst) {
            return CacheState::Loading;
        }
        let generation = self.snapshot();
        if generation.id == 0 {
            return CacheState::Uninitialized;
        }
        CacheState::Ready {
            generation: generation.id,
            version: generation.version.clone(),
            entries: generation.len(),
        }
    }
}
