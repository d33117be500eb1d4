//! Request-kind handlers.
//!
//! [`Store`] is the one entry point the transport layer talks to. Each handler
//! validates its request, builds keys through the codec, reads through the
//! tiered resolver and returns a JSON payload in which every requested id is
//! present.

mod place;
mod population;
mod property;
mod stats;
mod triples;

pub use stats::triples_to_stat_var;
pub use triples::apply_limit;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_core::{DecodeError, TesseraConfig, TesseraResult, ValidationError};

use crate::backend::RowStore;
use crate::branch::BranchCache;
use crate::fallback::{FallbackRequest, FallbackRows, OversizeFallback};
use crate::payload::{decode_json, unzip_and_decode_keyed};
use crate::reader::{BatchedReader, ReaderConfig};
use crate::resolver::{TieredResolver, TieredRow};

pub struct Store {
    config: TesseraConfig,
    resolver: TieredResolver,
    fallback: Option<Arc<dyn OversizeFallback>>,
}

impl Store {
    /// Build a store over a base row store and an optional branch tier. The
    /// branch tier is ignored when the config disables it.
    pub fn new(
        base: Arc<dyn RowStore>,
        branch: Option<Arc<BranchCache>>,
        config: TesseraConfig,
    ) -> Self {
        let reader = BatchedReader::new(base, ReaderConfig::from(&config));
        let branch = branch.filter(|_| config.branch_cache_enabled);
        Self {
            resolver: TieredResolver::new(reader, branch),
            config,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn OversizeFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TieredResolver {
        &self.resolver
    }

    /// A limit of 0 means the cache limit.
    fn effective_limit(&self, limit: usize) -> usize {
        if limit == 0 {
            self.config.cache_limit
        } else {
            limit
        }
    }

    fn exceeds_cache(&self, limit: usize) -> bool {
        limit > self.config.cache_limit
    }

    async fn query_fallback(&self, request: FallbackRequest) -> TesseraResult<Box<dyn FallbackRows>> {
        match &self.fallback {
            Some(fallback) => {
                tracing::debug!(request = ?request, "Routing oversize request to fallback");
                fallback.query(request).await
            }
            None => Err(ValidationError::UnsupportedCombination {
                reason: format!(
                    "limit exceeds cache limit {} and no fallback is configured",
                    self.config.cache_limit
                ),
            }
            .into()),
        }
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Serialize a response payload.
fn to_payload<T: Serialize>(value: &T) -> TesseraResult<String> {
    serde_json::to_string(value).map_err(|e| {
        DecodeError::Record {
            key: "response".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Decode a resolved JSON row. Undecodable rows are logged and read as absent.
fn decode_row<T: DeserializeOwned>(key: &str, row: &TieredRow) -> Option<T> {
    let raw = row.raw()?;
    match decode_json(key, raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Masking undecodable row");
            None
        }
    }
}

/// Decode a resolved row that holds plain text.
fn decode_text(key: &str, row: &TieredRow) -> Option<String> {
    let raw = row.raw()?;
    match unzip_and_decode_keyed(key, raw) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Masking undecodable row");
            None
        }
    }
}
