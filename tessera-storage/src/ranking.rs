//! Source ranking for competing observation series.
//!
//! A fixed table scores (import name, measurement method) pairs; lower is
//! better and unlisted pairs score [`LOWEST_RANK`]. Ties keep input order.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tessera_core::{ChartStore, ObsTimeSeries, SourceSeries};

/// Score given to any pair missing from the table.
pub const LOWEST_RANK: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankKey {
    pub import_name: String,
    pub measurement_method: String,
}

impl RankKey {
    pub fn new(import_name: &str, measurement_method: &str) -> Self {
        Self {
            import_name: import_name.to_string(),
            measurement_method: measurement_method.to_string(),
        }
    }
}

static STATS_RANKING: Lazy<HashMap<RankKey, u32>> = Lazy::new(|| {
    HashMap::from([
        // Population
        (RankKey::new("CensusPEP", "CensusPEPSurvey"), 0),
        (RankKey::new("CensusACS5YearSurvey", "CensusACS5yrSurvey"), 1),
        (RankKey::new("EurostatData", "EurostatRegionalPopulationData"), 2),
        (RankKey::new("WorldDevelopmentIndicators", ""), 3),
        // Unemployment rate
        (RankKey::new("BLS_LAUS", "BLSSeasonallyUnadjusted"), 0),
        (RankKey::new("EurostatData", ""), 1),
        // Covid
        (RankKey::new("NYT_COVID19", "NYT_COVID19_GitHub"), 0),
    ])
});

/// Rank of a (source, method) pair.
pub fn rank_of(import_name: &str, measurement_method: &str) -> u32 {
    STATS_RANKING
        .get(&RankKey::new(import_name, measurement_method))
        .copied()
        .unwrap_or(LOWEST_RANK)
}

fn series_rank(series: &SourceSeries) -> u32 {
    rank_of(&series.import_name, &series.measurement_method)
}

/// Index of the best candidate. The first candidate wins a tie.
pub fn pick_best_index<'a, I>(candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a SourceSeries>,
{
    let mut best: Option<(usize, u32)> = None;
    for (i, series) in candidates.into_iter().enumerate() {
        let rank = series_rank(series);
        if best.map_or(true, |(_, best_rank)| rank < best_rank) {
            best = Some((i, rank));
        }
    }
    best.map(|(i, _)| i)
}

pub fn pick_best(candidates: &[SourceSeries]) -> Option<&SourceSeries> {
    pick_best_index(candidates).map(|i| &candidates[i])
}

/// Candidates in rank order, stable for equal ranks.
pub fn rank_series(candidates: &[SourceSeries]) -> Vec<&SourceSeries> {
    let mut ranked: Vec<&SourceSeries> = candidates.iter().collect();
    ranked.sort_by_key(|series| series_rank(series));
    ranked
}

// ============================================================================
// FILTERING
// ============================================================================

/// Observation properties a caller may pin. An empty field matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObsProp {
    pub measurement_method: String,
    pub observation_period: String,
    pub unit: String,
    pub scaling_factor: String,
}

impl ObsProp {
    pub fn matches(&self, series: &SourceSeries) -> bool {
        fn pinned(want: &str, got: &str) -> bool {
            want.is_empty() || want == got
        }
        pinned(&self.measurement_method, &series.measurement_method)
            && pinned(&self.observation_period, &series.observation_period)
            && pinned(&self.unit, &series.unit)
            && pinned(&self.scaling_factor, &series.scaling_factor)
    }

    pub fn filter<'a>(&'a self, series: &'a [SourceSeries]) -> impl Iterator<Item = &'a SourceSeries> + 'a {
        series.iter().filter(move |s| self.matches(s))
    }
}

/// Best series among those matching `prop`.
pub fn best_matching<'a>(series: &'a [SourceSeries], prop: &'a ObsProp) -> Option<&'a SourceSeries> {
    let candidates: Vec<&SourceSeries> = prop.filter(series).collect();
    pick_best_index(candidates.iter().copied()).map(|i| candidates[i])
}

/// Replace the alternatives of `container` with its winning series.
///
/// `data` and the provenance fields come from the winner; unit, place name and
/// the aggregate flag stay as the container had them. `source_series` is
/// always cleared.
pub fn filter_and_rank(mut container: ObsTimeSeries, prop: &ObsProp) -> ObsTimeSeries {
    let series = std::mem::take(&mut container.source_series);
    if let Some(best) = best_matching(&series, prop) {
        container.data = best.val.clone();
        container.provenance_domain = best.provenance_domain.clone();
        container.provenance_url = best.provenance_url.clone();
    }
    container
}

/// Resolve a decoded chart-data row for `place`.
pub fn resolve_chart_store(store: ChartStore, place: &str, prop: &ObsProp) -> ObsTimeSeries {
    match store {
        ChartStore::ObsTimeSeries(mut series) => {
            series.place_dcid = place.to_string();
            filter_and_rank(series, prop)
        }
    }
}

/// Single value from the ranked series.
///
/// With a date, the value of the highest-ranked series that has that date.
/// Without one, the value at the latest date across all series; on a date
/// tie the higher-ranked series wins.
pub fn value_from_top_rank(series: &ObsTimeSeries, date: Option<&str>) -> Option<f64> {
    let ranked = rank_series(&series.source_series);
    match date.filter(|d| !d.is_empty()) {
        Some(date) => ranked.into_iter().find_map(|s| s.val.get(date).copied()),
        None => {
            let mut latest: Option<(&str, f64)> = None;
            for s in ranked {
                for (date, value) in &s.val {
                    if latest.map_or(true, |(best, _)| date.as_str() > best) {
                        latest = Some((date.as_str(), *value));
                    }
                }
            }
            latest.map(|(_, value)| value)
        }
    }
}


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
