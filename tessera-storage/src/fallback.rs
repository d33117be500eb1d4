//! Oversize fallback hook.
//!
//! Requests that ask for more results than the cache rows hold are answered
//! by an external relational reader instead. This module only defines the
//! seam and turns its rows into triples.

use async_trait::async_trait;
use tessera_core::{DecodeError, Direction, TesseraResult, Triple};

/// A request routed around the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackRequest {
    Triples {
        ids: Vec<String>,
        limit: usize,
    },
    PropertyValues {
        ids: Vec<String>,
        property: String,
        value_type: Option<String>,
        direction: Direction,
        limit: usize,
    },
}

/// One typed scalar from a relational row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    String(String),
    Int64(i64),
    Float64(f64),
    Null,
}

impl Cell {
    /// Text form; `None` for null.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::String(s) => Some(s.clone()),
            Cell::Int64(i) => Some(i.to_string()),
            Cell::Float64(f) => Some(f.to_string()),
            Cell::Null => None,
        }
    }
}

/// Rows produced by the fallback reader.
pub trait FallbackRows: Iterator<Item = TesseraResult<Vec<Cell>>> + Send {}

impl<T> FallbackRows for T where T: Iterator<Item = TesseraResult<Vec<Cell>>> + Send {}

#[async_trait]
pub trait OversizeFallback: Send + Sync {
    async fn query(&self, request: FallbackRequest) -> TesseraResult<Box<dyn FallbackRows>>;
}

/// Column order of a fallback triple row.
const TRIPLE_COLUMNS: usize = 5;

/// `(provenance_id, subject_id, predicate, object_id, object_value)` to a
/// [`Triple`]. Null object columns stay empty.
pub fn row_to_triple(row: &[Cell]) -> TesseraResult<Triple> {
    if row.len() != TRIPLE_COLUMNS {
        return Err(DecodeError::MalformedValue {
            key: "fallback".to_string(),
            reason: format!("expected {} columns, got {}", TRIPLE_COLUMNS, row.len()),
        }
        .into());
    }
    let text = |i: usize| row[i].as_text().unwrap_or_default();
    Ok(Triple {
        provenance_id: text(0),
        subject_id: text(1),
        predicate: text(2),
        object_id: text(3),
        object_value: text(4),
        ..Default::default()
    })
}

/// Drain a row iterator into triples, stopping at the first bad row.
pub fn collect_triples(rows: Box<dyn FallbackRows>) -> TesseraResult<Vec<Triple>> {
    rows.map(|row| row.and_then(|cells| row_to_triple(&cells)))
        .collect()
}
