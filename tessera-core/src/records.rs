//! Stored record shapes.
//!
//! Every base and branch cell decodes (after gzip + base64) into one of these
//! JSON documents. Field names follow the stored camelCase layout; empty
//! strings and lists are omitted on output the same way the producer omits
//! them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DecodeError, TesseraResult};

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

// ============================================================================
// GRAPH RECORDS
// ============================================================================

/// One entry in a triples row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Triple {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_types: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub predicate: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object_value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_types: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provenance_id: String,
}

/// A referenced node in a property-values row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dcid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provenance_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

/// Triples row payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriplesCache {
    #[serde(default)]
    pub triples: Vec<Triple>,
}

/// Property-values row payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropValueCache {
    #[serde(default, rename = "entities", skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
}

/// Property-labels row payload. Both lists are always present on output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropLabelCache {
    #[serde(default)]
    pub in_labels: Vec<String>,
    #[serde(default)]
    pub out_labels: Vec<String>,
}

// ============================================================================
// PLACE RECORDS
// ============================================================================

/// Ranked neighbour list for a (place, statistical variable) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPlacesInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_places: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rank_from_top: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rank_from_bottom: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_places: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top1000_places: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bottom1000_places: Vec<String>,
}

/// Statistical variable signature, assembled from the variable's triples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticalVariable {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pop_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pvs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub measured_prop: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub measurement_method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub measurement_denominator: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub measurement_qualifier: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scaling_factor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stat_type: String,
}

/// Why a place is interesting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestingPlaceAspect {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rank_from_top: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rank_from_bottom: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_var: Option<StatisticalVariable>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contained_in_place: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub place_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub per_capita: bool,
}

/// Interesting-aspects row payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestingPlaceAspects {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspects: Vec<InterestingPlaceAspect>,
}

/// Place-stat-vars row payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceStatsVar {
    #[serde(default)]
    pub stat_var_ids: Vec<String>,
}

/// A (place, population) pair in a populations response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacePopInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dcid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub population: String,
}

/// A (population, observed value) pair in an observations response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopObs {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dcid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub observation: String,
}

// ============================================================================
// POPULATION / OBSERVATION COMPOSITES
// ============================================================================

/// A single observation inside a pop-obs record.
///
/// Statistic fields (`measuredValue`, `meanValue`, `marginOfError`, ...) vary
/// by producer and are kept verbatim in `values`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopObsObservation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub measured_prop: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub measurement_method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub observation_date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub observation_period: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub observed_node: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

/// A statistical population and its observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopObsPop {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pop_type: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_constraints: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<PopObsObservation>,
}

/// Every population (keyed by population id) for one place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopObsPlace {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub place: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub populations: BTreeMap<String, PopObsPop>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<PopObsObservation>,
}

/// Per-place records for every place of a type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopObsCollection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub places: Vec<PopObsPlace>,
}

// ============================================================================
// TIME SERIES
// ============================================================================

/// One candidate series from a single source and measurement method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSeries {
    #[serde(default)]
    pub val: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub import_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub measurement_method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub observation_period: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scaling_factor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provenance_domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provenance_url: String,
}

/// Observation time series container.
///
/// As stored, `source_series` holds the alternatives and `data` is empty.
/// After ranking, `data` holds the winning series and `source_series` is
/// cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsTimeSeries {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub place_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub place_dcid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_dc_aggregate: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_series: Vec<SourceSeries>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provenance_domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provenance_url: String,
}

/// Chart-data row payload: a union over the stored value kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartStore {
    ObsTimeSeries(ObsTimeSeries),
}

impl ChartStore {
    /// Decode a chart-data JSON document.
    ///
    /// A document with no variant set is `DecodeError::TagNotSet`; an unknown
    /// variant is `DecodeError::Record`.
    pub fn decode(key: &str, json: &[u8]) -> TesseraResult<Self> {
        let mut fields: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(json).map_err(|e| DecodeError::Record {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(value) = fields.remove("obsTimeSeries") {
            let series: ObsTimeSeries =
                serde_json::from_value(value).map_err(|e| DecodeError::Record {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            return Ok(ChartStore::ObsTimeSeries(series));
        }

        match fields.keys().next() {
            None => Err(DecodeError::TagNotSet {
                record: "ChartStore".to_string(),
            }
            .into()),
            Some(other) => Err(DecodeError::Record {
                key: key.to_string(),
                reason: format!("ChartStore.Val has unexpected type {}", other),
            }
            .into()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
