//! In-memory row store.
//!
//! Sorted map behind a `RwLock`, with a failure hook for one key and a log of
//! the batch sizes it was asked to read.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use tessera_core::{StorageError, TesseraResult};

use crate::backend::{Row, RowSet, RowStore};

#[derive(Debug, Default)]
pub struct InMemoryRowStore {
    rows: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_on: RwLock<Option<String>>,
    batch_sizes: RwLock<Vec<usize>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let store = Self::new();
        if let Ok(mut map) = store.rows.write() {
            map.extend(rows.into_iter().map(|(k, v)| (k.into(), v.into())));
        }
        store
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> TesseraResult<()> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        rows.insert(key.into(), value.into());
        Ok(())
    }

    /// Make any batch that touches `key` fail.
    pub fn fail_on(&self, key: impl Into<String>) -> TesseraResult<()> {
        let mut fail = self.fail_on.write().map_err(|_| StorageError::LockPoisoned)?;
        *fail = Some(key.into());
        Ok(())
    }

    /// Sizes of every batch read so far, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .read()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_failure(&self, batch: &RowSet) -> TesseraResult<()> {
        let fail = self.fail_on.read().map_err(|_| StorageError::LockPoisoned)?;
        let Some(target) = fail.as_deref() else {
            return Ok(());
        };
        let hit = match batch {
            RowSet::Keys(keys) => keys.iter().any(|k| k == target),
            RowSet::Prefixes(prefixes) => prefixes.iter().any(|p| target.starts_with(p.as_str())),
        };
        if hit {
            return Err(StorageError::ReadFailed {
                reason: format!("injected failure for {}", target),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn read_rows(&self, batch: RowSet) -> TesseraResult<Vec<Row>> {
        if let Ok(mut sizes) = self.batch_sizes.write() {
            sizes.push(batch.len());
        }
        self.check_failure(&batch)?;

        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut out = Vec::new();
        match batch {
            RowSet::Keys(keys) => {
                for key in keys {
                    if let Some(value) = rows.get(&key) {
                        if !value.is_empty() {
                            out.push(Row::new(key, value.clone()));
                        }
                    }
                }
            }
            RowSet::Prefixes(prefixes) => {
                for prefix in prefixes {
                    let range = rows.range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded));
                    for (key, value) in range {
                        if !key.starts_with(prefix.as_str()) {
                            break;
                        }
                        if !value.is_empty() {
                            out.push(Row::new(key.clone(), value.clone()));
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}
