//! Tessera Core - Shared Types
//!
//! Records, requests, errors and configuration for the Tessera storage
//! access layer. This crate does no I/O; every other crate depends on it.

pub mod config;
pub mod error;
pub mod records;
pub mod request;
pub mod telemetry;

pub use config::TesseraConfig;
pub use error::{
    ConfigError, DecodeError, SnapshotError, StorageError, TesseraError, TesseraResult,
    ValidationError,
};
pub use records::*;
pub use request::*;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
