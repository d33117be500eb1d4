//! LMDB-backed base tier.
//!
//! Uses the heed crate to read a memory-mapped copy of the base rows. Keys
//! are the row key bytes and values are the encoded cells, so `Prefixes`
//! batches map directly onto LMDB prefix iteration.
//!
//! The base tier is read-only for request handling. [`LmdbRowStore::put_rows`]
//! exists to seed a local environment from an export.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tessera_core::TesseraResult;

use crate::backend::{Row, RowSet, RowStore};

/// Error type for LMDB row store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored key is not UTF-8.
    #[error("Row key is not valid UTF-8: {0}")]
    KeyEncoding(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for tessera_core::TesseraError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::EnvOpen(_) | LmdbStoreError::DbOpen(_) | LmdbStoreError::Io(_) => {
                tessera_core::TesseraError::Storage(
                    tessera_core::StorageError::BackendUnavailable {
                        reason: e.to_string(),
                    },
                )
            }
            _ => tessera_core::TesseraError::Storage(tessera_core::StorageError::ReadFailed {
                reason: e.to_string(),
            }),
        }
    }
}

/// Base rows stored in a single unnamed LMDB database.
pub struct LmdbRowStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbRowStore {
    /// Open (or create) an environment at `path` sized to `max_size_mb`.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            LmdbStoreError::EnvOpen(format!("map size of {} MiB overflows usize", max_size_mb))
        })?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Bulk import rows in one write transaction. Returns the number written.
    pub fn put_rows<I, K, V>(&self, rows: I) -> Result<usize, LmdbStoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let mut written = 0;
        for (key, value) in rows {
            self.db
                .put(&mut wtxn, key.as_ref(), value.as_ref())
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            written += 1;
        }
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        tracing::debug!(rows = written, "LMDB bulk import committed");
        Ok(written)
    }

    fn read_sync(&self, batch: RowSet) -> Result<Vec<Row>, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut out = Vec::new();
        match batch {
            RowSet::Keys(keys) => {
                for key in keys {
                    let value = self
                        .db
                        .get(&rtxn, key.as_bytes())
                        .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
                    if let Some(value) = value.filter(|v| !v.is_empty()) {
                        out.push(Row::new(key, value.to_vec()));
                    }
                }
            }
            RowSet::Prefixes(prefixes) => {
                for prefix in prefixes {
                    let iter = self
                        .db
                        .prefix_iter(&rtxn, prefix.as_bytes())
                        .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
                    for entry in iter {
                        let (key, value) =
                            entry.map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
                        if value.is_empty() {
                            continue;
                        }
                        let key = std::str::from_utf8(key)
                            .map_err(|e| LmdbStoreError::KeyEncoding(e.to_string()))?;
                        out.push(Row::new(key, value.to_vec()));
                    }
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl RowStore for LmdbRowStore {
    async fn read_rows(&self, batch: RowSet) -> TesseraResult<Vec<Row>> {
        Ok(self.read_sync(batch)?)
    }
}
