//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Proptest generators for ids, constraints and stored records
//! - Fixtures for encoded rows, seeded stores and snapshot folders
//! - Assertions for Tessera error kinds and decoded payloads

pub use tessera_storage::InMemoryRowStore;

pub use tessera_core::{
    CacheChoice, DecodeError, Node, PopObsCollection, PopObsPlace, PopObsPop, PropValueCache,
    PropertyValue, SourceSeries, StorageError, TesseraConfig, TesseraError, TesseraResult, Triple,
    TriplesCache, TriplesRequest, ValidationError,
};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_storage::payload::{encode_json, unzip_and_decode, zip_and_encode};
use tessera_storage::{BranchCache, Store};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tessera inputs and records.

    use super::*;
    use proptest::prelude::*;

    /// An entity id of the shape `ns/Xyz123`, never containing a key separator.
    pub fn arb_id() -> impl Strategy<Value = String> {
        "(geoId|country|dc/p|wikidataId)/[A-Za-z0-9]{1,8}"
    }

    pub fn arb_ids(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_id(), 1..=max.max(1))
    }

    /// Property or value token: no `^`, `,` or whitespace.
    pub fn arb_token() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,11}"
    }

    pub fn arb_property_value() -> impl Strategy<Value = PropertyValue> {
        (arb_token(), arb_token()).prop_map(|(p, v)| PropertyValue::new(p, v))
    }

    /// Constraint list with distinct properties, in arbitrary order.
    pub fn arb_pvs() -> impl Strategy<Value = Vec<PropertyValue>> {
        prop::collection::btree_map(arb_token(), arb_token(), 0..5).prop_flat_map(|map| {
            let pvs: Vec<PropertyValue> = map
                .into_iter()
                .map(|(p, v)| PropertyValue::new(p, v))
                .collect();
            Just(pvs).prop_shuffle()
        })
    }

    pub fn arb_cache_choice() -> impl Strategy<Value = CacheChoice> {
        prop_oneof![Just(CacheChoice::Default), Just(CacheChoice::BaseCacheOnly)]
    }

    /// Arbitrary cell bytes, including ones that are not valid payloads.
    pub fn arb_cell() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..256)
    }

    pub fn arb_triple(subject: String) -> impl Strategy<Value = Triple> {
        (arb_token(), arb_id(), prop::collection::vec(arb_token(), 0..3)).prop_map(
            move |(predicate, object_id, object_types)| Triple {
                subject_id: subject.clone(),
                predicate,
                object_id,
                object_types,
                ..Default::default()
            },
        )
    }

    pub fn arb_pop_obs_place() -> impl Strategy<Value = PopObsPlace> {
        prop::collection::btree_map(arb_id(), arb_token(), 0..6).prop_map(|pops| PopObsPlace {
            populations: pops
                .into_iter()
                .map(|(id, pop_type)| {
                    (
                        id,
                        PopObsPop {
                            pop_type,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            ..Default::default()
        })
    }

    pub fn arb_source_series() -> impl Strategy<Value = SourceSeries> {
        (
            prop_oneof![
                Just("CensusPEP".to_string()),
                Just("CensusACS5YearSurvey".to_string()),
                Just("WorldDevelopmentIndicators".to_string()),
                arb_token(),
            ],
            prop_oneof![
                Just("CensusPEPSurvey".to_string()),
                Just("CensusACS5yrSurvey".to_string()),
                Just(String::new()),
            ],
            prop::collection::btree_map("20[0-2][0-9]", -1.0e6f64..1.0e6, 0..5),
        )
            .prop_map(|(import_name, measurement_method, val)| SourceSeries {
                import_name,
                measurement_method,
                val,
                ..Default::default()
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Encoded rows, seeded stores and snapshot folders.

    use super::*;

    /// A config small enough that multi-key reads span several batches.
    pub fn small_batch_config() -> TesseraConfig {
        TesseraConfig::default()
            .with_batch_size(2)
            .with_max_concurrent_batches(2)
    }

    /// Record encoded the way both tiers store it.
    pub fn encoded<T: Serialize>(value: &T) -> String {
        encode_json(value).expect("fixture record should encode")
    }

    /// Plain text cell, encoded.
    pub fn encoded_text(text: &str) -> String {
        zip_and_encode(text.as_bytes()).expect("fixture text should encode")
    }

    pub fn triples(subject: &str, predicate_objects: &[(&str, &str)]) -> TriplesCache {
        TriplesCache {
            triples: predicate_objects
                .iter()
                .map(|(p, o)| Triple {
                    subject_id: subject.to_string(),
                    predicate: p.to_string(),
                    object_id: o.to_string(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn nodes(dcids: &[&str]) -> PropValueCache {
        PropValueCache {
            nodes: dcids
                .iter()
                .map(|d| Node {
                    dcid: d.to_string(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    /// Builder for a [`Store`] over an in-memory base tier and a fixed
    /// branch table.
    #[derive(Debug, Default)]
    pub struct StoreFixture {
        base: Vec<(String, String)>,
        branch: HashMap<String, Vec<u8>>,
        config: Option<TesseraConfig>,
    }

    impl StoreFixture {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn base(mut self, key: impl Into<String>, cell: impl Into<String>) -> Self {
            self.base.push((key.into(), cell.into()));
            self
        }

        pub fn branch(mut self, key: impl Into<String>, cell: impl Into<String>) -> Self {
            self.branch.insert(key.into(), cell.into().into_bytes());
            self
        }

        pub fn config(mut self, config: TesseraConfig) -> Self {
            self.config = Some(config);
            self
        }

        /// Base store plus branch cache, for tests that inspect either side.
        pub fn parts(self) -> (Arc<InMemoryRowStore>, Arc<BranchCache>, TesseraConfig) {
            let base = Arc::new(InMemoryRowStore::from_rows(self.base));
            let branch = Arc::new(BranchCache::with_entries(self.branch));
            (base, branch, self.config.unwrap_or_default())
        }

        pub fn build(self) -> Store {
            let (base, branch, config) = self.parts();
            Store::new(base, Some(branch), config)
        }
    }

    /// Write a snapshot tree under `root`: a pointer file naming `version`
    /// and one object per `(name, content)` pair.
    pub fn write_snapshot(root: &Path, version_file: &str, version: &str, objects: &[(&str, &str)]) {
        std::fs::write(root.join(version_file), version).expect("pointer file should write");
        let folder = root.join(version);
        std::fs::create_dir_all(&folder).expect("version folder should exist");
        for (name, content) in objects {
            std::fs::write(folder.join(name), content).expect("snapshot object should write");
        }
    }

    /// Snapshot object text with one `key,cell` line per row.
    pub fn snapshot_lines(rows: &[(&str, &str)]) -> String {
        rows.iter()
            .map(|(key, cell)| format!("{},{}\n", key, cell))
            .collect()
    }

    pub fn snapshot_dir(version_file: &str, version: &str, objects: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().expect("temp dir should be created");
        write_snapshot(dir.path(), version_file, version, objects);
        dir
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Tessera error kinds and payloads.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a result is a missing-field validation error for `field`.
    #[track_caller]
    pub fn assert_missing_field<T: std::fmt::Debug>(result: &TesseraResult<T>, field: &str) {
        match result {
            Err(TesseraError::Validation(ValidationError::RequiredFieldMissing { field: f }))
                if f == field => {}
            other => panic!("Expected missing field {}, got: {:?}", field, other),
        }
    }

    #[track_caller]
    pub fn assert_cancelled<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(e) if e.is_cancelled() => {}
            other => panic!("Expected Cancelled, got: {:?}", other),
        }
    }

    /// Decode an encoded payload back into a record.
    #[track_caller]
    pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> T {
        let json = unzip_and_decode(payload).expect("payload should unzip");
        serde_json::from_slice(&json).expect("payload should hold the record")
    }

    /// Parse a plain JSON response.
    #[track_caller]
    pub fn parse_response(payload: &str) -> serde_json::Value {
        serde_json::from_str(payload).expect("response should be JSON")
    }
}

// ============================================================================
// TESTS
// ============================================================================
