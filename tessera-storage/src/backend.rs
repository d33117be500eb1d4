//! Row-store seam.
//!
//! The base tier is any backend that can answer a batch of point keys or a
//! batch of prefix ranges. Implementations must be safe for concurrent calls;
//! the batched reader issues one call per batch in parallel.

use async_trait::async_trait;
use tessera_core::TesseraResult;

/// One stored row. `value` is the raw (still encoded) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: String,
    pub value: Vec<u8>,
}

impl Row {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A set of rows to read: either exact keys or key prefixes, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSet {
    Keys(Vec<String>),
    Prefixes(Vec<String>),
}

impl RowSet {
    pub fn len(&self) -> usize {
        match self {
            RowSet::Keys(items) | RowSet::Prefixes(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into consecutive sets of at most `size` items, keeping the mode.
    pub fn chunks(&self, size: usize) -> Vec<RowSet> {
        let size = size.max(1);
        match self {
            RowSet::Keys(items) => items
                .chunks(size)
                .map(|chunk| RowSet::Keys(chunk.to_vec()))
                .collect(),
            RowSet::Prefixes(items) => items
                .chunks(size)
                .map(|chunk| RowSet::Prefixes(chunk.to_vec()))
                .collect(),
        }
    }
}

/// Base-tier backend.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Read every row matching the set. Rows with no cell are not returned.
    async fn read_rows(&self, batch: RowSet) -> TesseraResult<Vec<Row>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_keep_mode_and_order() {
        let set = RowSet::Prefixes((0..5).map(|i| format!("d/m/{}", i)).collect());
        let chunks = set.chunks(2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks[2],
            RowSet::Prefixes(vec!["d/m/4".to_string()])
        );
        assert!(chunks.iter().all(|c| matches!(c, RowSet::Prefixes(_))));
    }

    #[test]
    fn test_chunks_of_empty_set() {
        assert!(RowSet::Keys(vec![]).chunks(10).is_empty());
        assert!(RowSet::Keys(vec![]).is_empty());
    }
}
