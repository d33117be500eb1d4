//! Statistical variable series, ranked across sources.

use std::collections::BTreeMap;

use serde::Serialize;
use tessera_core::{
    CacheChoice, ChartStore, ObsTimeSeries, StatAllRequest, StatSeriesRequest,
    StatisticalVariable, StatsRequest, TesseraResult, TriplesCache, ValidationError,
};

use super::{decode_row, to_payload, Store};
use crate::keys::{chart_data_key, chart_data_keys, require_field, triples_keys, validate_ids};
use crate::payload::unzip_and_decode_keyed;
use crate::ranking::{best_matching, resolve_chart_store, value_from_top_rank, ObsProp};
use crate::reader::ReadContext;
use crate::resolver::TieredRow;

const STAT_VAR_TYPE: &str = "StatisticalVariable";

/// Assemble a [`StatisticalVariable`] from the triples stored for `id`.
///
/// Properties listed under `constraintProperties` become constraint pairs.
/// Triples about other subjects are ignored.
pub fn triples_to_stat_var(id: &str, cache: &TriplesCache) -> TesseraResult<StatisticalVariable> {
    let constraints: Vec<&str> = cache
        .triples
        .iter()
        .filter(|t| t.predicate == "constraintProperties")
        .map(|t| t.object_id.as_str())
        .collect();

    let mut sv = StatisticalVariable::default();
    for t in cache.triples.iter().filter(|t| t.subject_id == id) {
        let object = t.object_id.clone();
        match t.predicate.as_str() {
            "typeOf" => {
                if object != STAT_VAR_TYPE {
                    return Err(ValidationError::InvalidValue {
                        field: "stat_var".to_string(),
                        reason: format!("{} is not a {}", id, STAT_VAR_TYPE),
                    }
                    .into());
                }
            }
            "statType" => sv.stat_type = object.replacen("Value", "", 1),
            "populationType" => sv.pop_type = object,
            "measurementMethod" => sv.measurement_method = object,
            "measuredProperty" => sv.measured_prop = object,
            "measurementDenominator" => sv.measurement_denominator = object,
            "measurementQualifier" => sv.measurement_qualifier = object,
            "scalingFactor" => sv.scaling_factor = object,
            "unit" => sv.unit = object,
            other if constraints.contains(&other) => {
                sv.pvs.insert(other.to_string(), object);
            }
            _ => {}
        }
    }
    Ok(sv)
}

/// Per-place payload of [`Store::get_stat_all`].
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceStat {
    stat_var_data: BTreeMap<String, Option<ObsTimeSeries>>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatAll {
    place_data: BTreeMap<String, PlaceStat>,
}

fn decode_chart(key: &str, raw: &[u8]) -> TesseraResult<ChartStore> {
    let json = unzip_and_decode_keyed(key, raw)?;
    ChartStore::decode(key, &json)
}

impl Store {
    async fn stat_var(
        &self,
        ctx: &ReadContext,
        id: &str,
        option: CacheChoice,
    ) -> TesseraResult<StatisticalVariable> {
        require_field("stat_var", id)?;
        self.find_stat_var(ctx, id, option)
            .await?
            .ok_or_else(|| {
                ValidationError::RequiredFieldMissing {
                    field: format!("stat_var {}", id),
                }
                .into()
            })
    }

    /// `None` when no triples row exists for `id`.
    async fn find_stat_var(
        &self,
        ctx: &ReadContext,
        id: &str,
        option: CacheChoice,
    ) -> TesseraResult<Option<StatisticalVariable>> {
        let key = triples_keys(&[id.to_string()]).remove(0);
        let row = self.resolver.resolve_override_one(ctx, &key, option).await?;
        decode_row::<TriplesCache>(&key, &row)
            .map(|cache| triples_to_stat_var(id, &cache))
            .transpose()
    }

    /// One place's chart row, decoded. `None` when neither tier has it.
    async fn chart_for(
        &self,
        ctx: &ReadContext,
        place: &str,
        sv: &StatisticalVariable,
        option: CacheChoice,
    ) -> TesseraResult<Option<ChartStore>> {
        let key = chart_data_key(place, sv);
        let row = self.resolver.resolve_override_one(ctx, &key, option).await?;
        row.raw().map(|raw| decode_chart(&key, raw)).transpose()
    }

    /// `{place: ObsTimeSeries|null}`, each reduced to its best matching series.
    pub async fn get_stats(&self, ctx: &ReadContext, request: &StatsRequest) -> TesseraResult<String> {
        validate_ids(&request.places)?;
        let sv = self.stat_var(ctx, &request.stat_var, request.option).await?;
        let prop = ObsProp {
            measurement_method: request.measurement_method.clone(),
            observation_period: request.observation_period.clone(),
            unit: request.unit.clone(),
            scaling_factor: String::new(),
        };

        let keys = chart_data_keys(&request.places, &sv);
        let rows = self
            .resolver
            .resolve_override(ctx, &keys, request.option)
            .await?;

        let mut out: BTreeMap<&String, Option<ObsTimeSeries>> = BTreeMap::new();
        for (place, (key, row)) in request.places.iter().zip(rows) {
            let series = match row {
                TieredRow::Missing => None,
                TieredRow::Branch(raw) | TieredRow::Base(raw) => match decode_chart(&key, &raw) {
                    Ok(chart) => Some(resolve_chart_store(chart, place, &prop)),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Masking undecodable chart row");
                        None
                    }
                },
            };
            out.insert(place, series);
        }
        to_payload(&out)
    }

    /// `{placeData: {place: {statVarData: {statVar: ObsTimeSeries|null}}}}`
    /// with every stored source series kept, unranked.
    ///
    /// Unknown stat vars and pairs without a chart row are `null`.
    pub async fn get_stat_all(&self, ctx: &ReadContext, request: &StatAllRequest) -> TesseraResult<String> {
        if request.places.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "place".to_string(),
            }
            .into());
        }
        if request.stat_vars.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "stat_var".to_string(),
            }
            .into());
        }
        validate_ids(&request.places)?;

        let mut out = StatAll::default();
        for place in &request.places {
            let data = &mut out.place_data.entry(place.clone()).or_default().stat_var_data;
            for stat_var in &request.stat_vars {
                data.insert(stat_var.clone(), None);
            }
        }

        let mut keys = Vec::new();
        let mut pairs = Vec::new();
        for stat_var in &request.stat_vars {
            let Some(sv) = self.find_stat_var(ctx, stat_var, request.option).await? else {
                tracing::debug!(stat_var = %stat_var, "No triples for stat var");
                continue;
            };
            for place in &request.places {
                keys.push(chart_data_key(place, &sv));
                pairs.push((place, stat_var));
            }
        }

        let rows = self
            .resolver
            .resolve_override(ctx, &keys, request.option)
            .await?;
        for ((place, stat_var), (key, row)) in pairs.into_iter().zip(rows) {
            let Some(raw) = row.raw() else {
                continue;
            };
            let ChartStore::ObsTimeSeries(mut series) = decode_chart(&key, raw)?;
            series.place_dcid = place.clone();
            if let Some(place_stat) = out.place_data.get_mut(place) {
                place_stat.stat_var_data.insert(stat_var.clone(), Some(series));
            }
        }
        to_payload(&out)
    }

    /// A single value for (place, stat var), from the top-ranked source that
    /// has it. Without a date, the value at the latest date across sources.
    pub async fn get_stat_value(
        &self,
        ctx: &ReadContext,
        place: &str,
        stat_var: &str,
        date: Option<&str>,
    ) -> TesseraResult<Option<f64>> {
        validate_ids(&[place.to_string()])?;
        let sv = self.stat_var(ctx, stat_var, CacheChoice::Default).await?;
        let chart = self.chart_for(ctx, place, &sv, CacheChoice::Default).await?;
        Ok(chart.and_then(|ChartStore::ObsTimeSeries(series)| value_from_top_rank(&series, date)))
    }

    /// The `{date: value}` map of the best series matching every pinned
    /// observation property. `{}` when nothing matches.
    pub async fn get_stat_series(
        &self,
        ctx: &ReadContext,
        request: &StatSeriesRequest,
    ) -> TesseraResult<String> {
        validate_ids(&[request.place.clone()])?;
        let sv = self.stat_var(ctx, &request.stat_var, request.option).await?;
        let prop = ObsProp {
            measurement_method: request.measurement_method.clone(),
            observation_period: request.observation_period.clone(),
            unit: request.unit.clone(),
            scaling_factor: request.scaling_factor.clone(),
        };
        let values = match self.chart_for(ctx, &request.place, &sv, request.option).await? {
            Some(ChartStore::ObsTimeSeries(series)) => best_matching(&series.source_series, &prop)
                .map(|best| best.val.clone())
                .unwrap_or_default(),
            None => BTreeMap::new(),
        };
        to_payload(&values)
    }
}
