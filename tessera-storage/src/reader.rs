//! Batched parallel reader.
//!
//! Splits a row set into batches no larger than the backend's request bound,
//! reads them concurrently, and feeds every returned row to a callback. The
//! first failure (batch read, callback, panicked task or cancellation) aborts
//! the remaining batches and is returned as the result of the whole read.
//!
//! Batch results are joined on the caller's task, so the callback is never
//! invoked concurrently with itself and may freely mutate local state.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{StorageError, TesseraConfig, TesseraError, TesseraResult};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::backend::{Row, RowSet, RowStore};
use crate::keys::RowToken;
use crate::payload::unzip_and_decode_keyed;

// ============================================================================
// CANCELLATION
// ============================================================================

/// Cancellation scope threaded through every read.
#[derive(Debug, Clone)]
pub struct ReadContext {
    cancel_rx: watch::Receiver<bool>,
}

/// Trips the flag of the [`ReadContext`] it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }
}

impl ReadContext {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        let (_tx, cancel_rx) = watch::channel(false);
        Self { cancel_rx }
    }

    /// A context plus the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (Self { cancel_rx }, CancelHandle { cancel_tx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once the context is cancelled. Never resolves for a context
    /// whose handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// `Err(Cancelled)` if the context has been cancelled.
    pub fn check(&self) -> TesseraResult<()> {
        if self.is_cancelled() {
            return Err(TesseraError::Cancelled);
        }
        Ok(())
    }
}

// ============================================================================
// READER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Keys or prefixes per backend call.
    pub batch_size: usize,
    /// Concurrently running batches. 0 runs every batch at once.
    pub max_concurrency: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            batch_size: tessera_core::config::DEFAULT_BATCH_SIZE,
            max_concurrency: 0,
        }
    }
}

impl From<&TesseraConfig> for ReaderConfig {
    fn from(config: &TesseraConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrency: config.max_concurrent_batches,
        }
    }
}

/// Rows decoded per token. Failed rows are kept apart so callers can tell
/// "no data" from "data that would not decode".
#[derive(Debug)]
pub struct DecodedRows<T> {
    pub values: HashMap<String, T>,
    pub failures: HashMap<String, TesseraError>,
}

impl<T> Default for DecodedRows<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            failures: HashMap::new(),
        }
    }
}

impl<T> DecodedRows<T> {
    pub fn get(&self, token: &str) -> Option<&T> {
        self.values.get(token)
    }

    pub fn remove(&mut self, token: &str) -> Option<T> {
        self.values.remove(token)
    }

    pub fn failure(&self, token: &str) -> Option<&TesseraError> {
        self.failures.get(token)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Fan-out reader over a [`RowStore`].
#[derive(Clone)]
pub struct BatchedReader {
    store: Arc<dyn RowStore>,
    config: ReaderConfig,
}

impl BatchedReader {
    pub fn new(store: Arc<dyn RowStore>, config: ReaderConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> ReaderConfig {
        self.config
    }

    /// Read every row in `rows`, invoking `callback` once per returned row.
    pub async fn read_rows<F>(
        &self,
        ctx: &ReadContext,
        rows: RowSet,
        mut callback: F,
    ) -> TesseraResult<()>
    where
        F: FnMut(Row) -> TesseraResult<()>,
    {
        if rows.is_empty() {
            return Ok(());
        }
        ctx.check()?;

        let batches = rows.chunks(self.config.batch_size);
        let batch_count = batches.len();
        let semaphore = (self.config.max_concurrency > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_concurrency)));

        let mut tasks = JoinSet::new();
        for batch in batches {
            let store = Arc::clone(&self.store);
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => tokio::select! {
                        biased;
                        _ = ctx.cancelled() => return Err(TesseraError::Cancelled),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                return Err(TesseraError::from(StorageError::BackendUnavailable {
                                    reason: "batch semaphore closed".to_string(),
                                }))
                            }
                        },
                    },
                    None => None,
                };
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => Err(TesseraError::Cancelled),
                    rows = store.read_rows(batch) => rows,
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(StorageError::ReadFailed {
                    reason: format!("batch task failed: {}", e),
                }
                .into())
            });
            let result = outcome.and_then(|batch_rows| {
                for row in batch_rows {
                    ctx.check()?;
                    callback(row)?;
                }
                Ok(())
            });
            if let Err(e) = result {
                tasks.abort_all();
                if e.is_cancelled() {
                    tracing::debug!(batches = batch_count, "Batched read cancelled");
                } else {
                    tracing::warn!(batches = batch_count, error = %e, "Batched read failed");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Read, unzip and transform every row, keyed by the row's token.
    ///
    /// A row whose token, payload or transform fails is logged and recorded
    /// in `failures`; it does not fail sibling rows. Read failures and
    /// cancellation still fail the whole call.
    pub async fn read_decoded<T, F>(
        &self,
        ctx: &ReadContext,
        rows: RowSet,
        token: RowToken,
        mut transform: F,
    ) -> TesseraResult<DecodedRows<T>>
    where
        F: FnMut(&str, Vec<u8>) -> TesseraResult<T>,
    {
        let mut decoded = DecodedRows::default();
        self.read_rows(ctx, rows, |row| {
            let token = match token.extract(&row.key) {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(key = %row.key, error = %e, "Skipping row with malformed key");
                    decoded.failures.insert(row.key, e);
                    return Ok(());
                }
            };
            let outcome = unzip_and_decode_keyed(&row.key, &row.value)
                .and_then(|json| transform(&token, json));
            match outcome {
                Ok(value) => {
                    decoded.values.insert(token, value);
                }
                Err(e) => {
                    tracing::warn!(key = %row.key, token = %token, error = %e, "Masking undecodable row");
                    decoded.failures.insert(token, e);
                }
            }
            Ok(())
        })
        .await?;
        Ok(decoded)
    }
}

// =============================================================================
// TESTS
// =============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
