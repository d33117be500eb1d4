//! Request types for every read kind.

use serde::{Deserialize, Serialize};

/// Which tiers a read may consult.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheChoice {
    /// Branch tier first, then base.
    #[default]
    Default,
    /// Base tier only.
    BaseCacheOnly,
}

impl CacheChoice {
    pub fn uses_branch(self) -> bool {
        matches!(self, CacheChoice::Default)
    }
}

/// Edge direction for property-value reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    #[default]
    Out,
    Both,
}

impl Direction {
    pub fn includes_in(self) -> bool {
        matches!(self, Direction::In | Direction::Both)
    }

    pub fn includes_out(self) -> bool {
        matches!(self, Direction::Out | Direction::Both)
    }
}

/// A population constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyValue {
    pub property: String,
    pub value: String,
}

impl PropertyValue {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriplesRequest {
    pub ids: Vec<String>,
    /// 0 means the configured cache limit.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub option: CacheChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValuesRequest {
    pub ids: Vec<String>,
    pub property: String,
    #[serde(default)]
    pub value_type: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub option: CacheChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopObsRequest {
    pub id: String,
    #[serde(default)]
    pub option: CacheChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceObsRequest {
    pub place_type: String,
    pub observation_date: String,
    pub population_type: String,
    #[serde(default)]
    pub pvs: Vec<PropertyValue>,
    #[serde(default)]
    pub option: CacheChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationsRequest {
    pub ids: Vec<String>,
    pub population_type: String,
    #[serde(default)]
    pub pvs: Vec<PropertyValue>,
    #[serde(default)]
    pub option: CacheChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationsRequest {
    pub ids: Vec<String>,
    pub measured_property: String,
    /// Snake case statistic name, e.g. `measured_value`.
    pub stats_type: String,
    pub observation_date: String,
    #[serde(default)]
    pub observation_period: String,
    #[serde(default)]
    pub measurement_method: String,
    #[serde(default)]
    pub option: CacheChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacesInRequest {
    pub ids: Vec<String>,
    pub place_type: String,
    #[serde(default)]
    pub option: CacheChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPlacesRequest {
    pub id: String,
    pub stat_var_ids: Vec<String>,
    #[serde(default)]
    pub within_place: Option<String>,
    #[serde(default)]
    pub is_per_capita: bool,
    #[serde(default)]
    pub option: CacheChoice,
}

/// Rankings of every place of one type, optionally within an ancestor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationsRankingsRequest {
    pub place_type: String,
    pub stat_var_ids: Vec<String>,
    #[serde(default)]
    pub within_place: Option<String>,
    #[serde(default)]
    pub is_per_capita: bool,
    #[serde(default)]
    pub option: CacheChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRequest {
    pub places: Vec<String>,
    pub stat_var: String,
    #[serde(default)]
    pub measurement_method: String,
    #[serde(default)]
    pub observation_period: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub option: CacheChoice,
}

/// Every source series for each (place, stat var) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatAllRequest {
    pub places: Vec<String>,
    pub stat_vars: Vec<String>,
    #[serde(default)]
    pub option: CacheChoice,
}

/// One place's ranked series, with every observation property pinnable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSeriesRequest {
    pub place: String,
    pub stat_var: String,
    #[serde(default)]
    pub measurement_method: String,
    #[serde(default)]
    pub observation_period: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub scaling_factor: String,
    #[serde(default)]
    pub option: CacheChoice,
}
