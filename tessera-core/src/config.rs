//! Configuration types

use std::path::PathBuf;

use crate::{ConfigError, TesseraResult};

/// Default number of row keys per backend read.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default limit above which triples and property values bypass the cache.
pub const DEFAULT_CACHE_LIMIT: usize = 500;

/// Default name of the file that points at the latest branch snapshot folder.
pub const DEFAULT_VERSION_FILE: &str = "latest_branch_cache_version.txt";

/// Default initial line buffer for snapshot parsing (64 KiB).
pub const DEFAULT_LINE_INITIAL_BYTES: usize = 64 * 1024;

/// Default maximum line length for snapshot parsing (10 MiB).
pub const DEFAULT_LINE_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Storage access layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesseraConfig {
    /// Keys (or prefix ranges) per backend read.
    pub batch_size: usize,
    /// Requests asking for more results than this use the oversize fallback.
    pub cache_limit: usize,
    /// Cap on concurrently running batches. 0 runs one task per batch.
    pub max_concurrent_batches: usize,
    /// Whether the branch tier is loaded and consulted.
    pub branch_cache_enabled: bool,
    /// Root of the branch snapshot tree.
    pub snapshot_root: Option<PathBuf>,
    /// Pointer file name under `snapshot_root`.
    pub version_file: String,
    /// Initial line buffer capacity while loading snapshots.
    pub line_initial_bytes: usize,
    /// Lines longer than this are skipped.
    pub line_max_bytes: usize,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cache_limit: DEFAULT_CACHE_LIMIT,
            max_concurrent_batches: 0,
            branch_cache_enabled: true,
            snapshot_root: None,
            version_file: DEFAULT_VERSION_FILE.to_string(),
            line_initial_bytes: DEFAULT_LINE_INITIAL_BYTES,
            line_max_bytes: DEFAULT_LINE_MAX_BYTES,
        }
    }
}

impl TesseraConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TESSERA_BATCH_SIZE` (default: 1000)
    /// - `TESSERA_CACHE_LIMIT` (default: 500)
    /// - `TESSERA_MAX_CONCURRENT_BATCHES` (default: 0, one task per batch)
    /// - `TESSERA_BRANCH_CACHE_ENABLED` (default: true)
    /// - `TESSERA_SNAPSHOT_ROOT` (no default)
    /// - `TESSERA_SNAPSHOT_VERSION_FILE` (default: latest_branch_cache_version.txt)
    /// - `TESSERA_SNAPSHOT_LINE_INITIAL_BYTES` (default: 65536)
    /// - `TESSERA_SNAPSHOT_LINE_MAX_BYTES` (default: 10485760)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            batch_size: std::env::var("TESSERA_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            cache_limit: std::env::var("TESSERA_CACHE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_limit),
            max_concurrent_batches: std::env::var("TESSERA_MAX_CONCURRENT_BATCHES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_batches),
            branch_cache_enabled: std::env::var("TESSERA_BRANCH_CACHE_ENABLED")
                .ok()
                .map(|s| s.to_lowercase() != "false" && s != "0")
                .unwrap_or(defaults.branch_cache_enabled),
            snapshot_root: std::env::var("TESSERA_SNAPSHOT_ROOT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            version_file: std::env::var("TESSERA_SNAPSHOT_VERSION_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.version_file),
            line_initial_bytes: std::env::var("TESSERA_SNAPSHOT_LINE_INITIAL_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.line_initial_bytes),
            line_max_bytes: std::env::var("TESSERA_SNAPSHOT_LINE_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.line_max_bytes),
        }
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the cache limit.
    pub fn with_cache_limit(mut self, cache_limit: usize) -> Self {
        self.cache_limit = cache_limit;
        self
    }

    /// Cap concurrently running batches.
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max;
        self
    }

    /// Enable or disable the branch tier.
    pub fn with_branch_cache(mut self, enabled: bool) -> Self {
        self.branch_cache_enabled = enabled;
        self
    }

    /// Set the snapshot root directory.
    pub fn with_snapshot_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.snapshot_root = Some(root.into());
        self
    }

    /// Set the version pointer file name.
    pub fn with_version_file(mut self, name: impl Into<String>) -> Self {
        self.version_file = name.into();
        self
    }

    /// Set the snapshot line buffer bounds.
    pub fn with_line_buffer(mut self, initial_bytes: usize, max_bytes: usize) -> Self {
        self.line_initial_bytes = initial_bytes;
        self.line_max_bytes = max_bytes;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - batch_size > 0
    /// - cache_limit > 0
    /// - line_initial_bytes <= line_max_bytes
    /// - snapshot_root is set when the branch tier is enabled
    pub fn validate(&self) -> TesseraResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: self.batch_size.to_string(),
                reason: "batch_size must be greater than 0".to_string(),
            }
            .into());
        }

        if self.cache_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_limit".to_string(),
                value: self.cache_limit.to_string(),
                reason: "cache_limit must be greater than 0".to_string(),
            }
            .into());
        }

        if self.line_initial_bytes > self.line_max_bytes {
            return Err(ConfigError::InvalidValue {
                field: "line_initial_bytes".to_string(),
                value: self.line_initial_bytes.to_string(),
                reason: format!("must not exceed line_max_bytes ({})", self.line_max_bytes),
            }
            .into());
        }

        if self.branch_cache_enabled && self.snapshot_root.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "snapshot_root".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::TesseraError;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A zero batch size is always rejected regardless of other fields.
        #[test]
        fn prop_zero_batch_size_rejected(cache_limit in 1usize..10_000, concurrency in 0usize..64) {
            let config = TesseraConfig::default()
                .with_branch_cache(false)
                .with_batch_size(0)
                .with_cache_limit(cache_limit)
                .with_max_concurrent_batches(concurrency);
            let result = config.validate();
            if let Err(TesseraError::Config(ConfigError::InvalidValue { field, .. })) = result {
                prop_assert_eq!(field, "batch_size");
            } else {
                prop_assert!(false, "Expected ConfigError::InvalidValue");
            }
        }

        /// Any positive sizes with ordered line bounds validate.
        #[test]
        fn prop_positive_sizes_accepted(
            batch in 1usize..100_000,
            limit in 1usize..100_000,
            initial in 1usize..4096,
            extra in 0usize..4096,
        ) {
            let config = TesseraConfig::default()
                .with_snapshot_root("/tmp/snapshots")
                .with_batch_size(batch)
                .with_cache_limit(limit)
                .with_line_buffer(initial, initial + extra);
            prop_assert!(config.validate().is_ok());
        }
    }
}
