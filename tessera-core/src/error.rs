//! Error types for Tessera operations

use thiserror::Error;

/// Row-store backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Row read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("Row store unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Payload and key decoding errors. These are scoped to a single row.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload for {key} could not be decoded: {reason}")]
    Payload { key: String, reason: String },

    #[error("Record for {key} has an unexpected shape: {reason}")]
    Record { key: String, reason: String },

    #[error("{record}.Val is not set")]
    TagNotSet { record: String },

    #[error("Malformed row key: {key}")]
    MalformedKey { key: String },

    #[error("Malformed value for {key}: {reason}")]
    MalformedValue { key: String, reason: String },
}

/// Request validation errors. These are caller bugs and never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid ids: {ids:?}")]
    InvalidIds { ids: Vec<String> },

    #[error("Unsupported parameter combination: {reason}")]
    UnsupportedCombination { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Branch snapshot errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Snapshot source {location} unreachable: {reason}")]
    SourceUnreachable { location: String, reason: String },

    #[error("Snapshot version pointer at {location} is empty")]
    VersionPointerEmpty { location: String },

    #[error("Snapshot I/O error: {reason}")]
    Io { reason: String },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error)]
pub enum TesseraError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl TesseraError {
    /// True when the error came from a cancelled context rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TesseraError::Cancelled)
    }

    /// True for per-row decode failures.
    pub fn is_decode(&self) -> bool {
        matches!(self, TesseraError::Decode(_))
    }
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================
