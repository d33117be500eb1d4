//! Place-centric reads: containment, related places, rankings, aspects,
//! geometry and the stat vars a place has data for.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tessera_core::{
    CacheChoice, InterestingPlaceAspects, LocationsRankingsRequest, PlaceStatsVar,
    PlacesInRequest, RelatedPlacesInfo, RelatedPlacesRequest, TesseraResult, ValidationError,
};

use super::{decode_row, decode_text, to_payload, Store};
use crate::keys::{
    interesting_aspects_keys, locations_rankings_keys, place_kml_key, place_stat_vars_keys,
    places_in_keys, related_places_keys, require_field, validate_ids, RowToken,
};
use crate::reader::ReadContext;

/// One (container, contained place) pair.
#[derive(Debug, Serialize)]
struct PlaceIn {
    dcid: String,
    place: String,
}

impl Store {
    /// `[{dcid, place}]` in request order. Ids without data contribute no
    /// pairs.
    pub async fn get_places_in(
        &self,
        ctx: &ReadContext,
        request: &PlacesInRequest,
    ) -> TesseraResult<String> {
        validate_ids(&request.ids)?;
        require_field("place_type", &request.place_type)?;
        let keys = places_in_keys(&request.ids, &request.place_type);
        let rows = self
            .resolver
            .resolve_override(ctx, &keys, request.option)
            .await?;

        let mut out = Vec::new();
        for (id, (key, row)) in request.ids.iter().zip(rows) {
            let Some(text) = decode_text(&key, &row) else {
                continue;
            };
            out.extend(
                text.split(',')
                    .filter(|place| !place.is_empty())
                    .map(|place| PlaceIn {
                        dcid: id.clone(),
                        place: place.to_string(),
                    }),
            );
        }
        to_payload(&out)
    }

    /// `{statVar: RelatedPlacesInfo|null}`.
    pub async fn get_related_places(
        &self,
        ctx: &ReadContext,
        request: &RelatedPlacesRequest,
    ) -> TesseraResult<String> {
        validate_ids(std::slice::from_ref(&request.id))?;
        if request.stat_var_ids.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "stat_var_ids".to_string(),
            }
            .into());
        }
        let keys = related_places_keys(
            &request.id,
            request.within_place.as_deref(),
            request.is_per_capita,
            &request.stat_var_ids,
        );
        let rows = self
            .resolver
            .resolve_override(ctx, &keys, request.option)
            .await?;

        let mut out: BTreeMap<String, Option<RelatedPlacesInfo>> = BTreeMap::new();
        for (key, row) in rows {
            let stat_var = RowToken::LastItem.extract(&key)?;
            out.insert(stat_var, decode_row(&key, &row));
        }
        to_payload(&out)
    }

    /// `{statVar: RelatedPlacesInfo|null}` ranking every place of one type.
    pub async fn get_locations_rankings(
        &self,
        ctx: &ReadContext,
        request: &LocationsRankingsRequest,
    ) -> TesseraResult<String> {
        require_field("place_type", &request.place_type)?;
        if request.stat_var_ids.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "stat_var_ids".to_string(),
            }
            .into());
        }
        if let Some(within) = request.within_place.as_ref().filter(|w| !w.is_empty()) {
            validate_ids(std::slice::from_ref(within))?;
        }
        let keys = locations_rankings_keys(
            &request.place_type,
            request.within_place.as_deref(),
            request.is_per_capita,
            &request.stat_var_ids,
        );
        let rows = self
            .resolver
            .resolve_override(ctx, &keys, request.option)
            .await?;

        let mut out: BTreeMap<String, Option<RelatedPlacesInfo>> = BTreeMap::new();
        for (key, row) in rows {
            let stat_var = RowToken::LastItem.extract(&key)?;
            out.insert(stat_var, decode_row(&key, &row));
        }
        tracing::debug!(
            place_type = %request.place_type,
            stat_vars = out.len(),
            "Resolved place-type rankings"
        );
        to_payload(&out)
    }

    /// `{id: InterestingPlaceAspects|null}`.
    pub async fn get_interesting_place_aspects(
        &self,
        ctx: &ReadContext,
        ids: &[String],
    ) -> TesseraResult<String> {
        validate_ids(ids)?;
        let rows = self
            .resolver
            .resolve_override(ctx, &interesting_aspects_keys(ids), CacheChoice::Default)
            .await?;
        let out: BTreeMap<&String, Option<InterestingPlaceAspects>> = ids
            .iter()
            .zip(rows)
            .map(|(id, (key, row))| (id, decode_row(&key, &row)))
            .collect();
        to_payload(&out)
    }

    /// The stored KML payload for a place, still encoded.
    pub async fn get_place_kml(&self, ctx: &ReadContext, id: &str) -> TesseraResult<Option<String>> {
        validate_ids(&[id.to_string()])?;
        let row = self
            .resolver
            .resolve_override_one(ctx, &place_kml_key(id), CacheChoice::Default)
            .await?;
        Ok(row.raw().map(|raw| String::from_utf8_lossy(raw).into_owned()))
    }

    async fn place_stat_vars(
        &self,
        ctx: &ReadContext,
        ids: &[String],
    ) -> TesseraResult<BTreeMap<String, Vec<String>>> {
        validate_ids(ids)?;
        let rows = self
            .resolver
            .resolve_override(ctx, &place_stat_vars_keys(ids), CacheChoice::Default)
            .await?;
        Ok(ids
            .iter()
            .zip(rows)
            .map(|(id, (key, row))| {
                let vars: PlaceStatsVar = decode_row(&key, &row).unwrap_or_default();
                (id.clone(), vars.stat_var_ids)
            })
            .collect())
    }

    /// `{id: [statVar]}`; ids without a row map to `[]`.
    pub async fn get_place_stat_vars(&self, ctx: &ReadContext, ids: &[String]) -> TesseraResult<String> {
        let vars = self.place_stat_vars(ctx, ids).await?;
        to_payload(&vars)
    }

    /// Sorted distinct stat vars across every id.
    pub async fn get_place_stat_vars_union(
        &self,
        ctx: &ReadContext,
        ids: &[String],
    ) -> TesseraResult<String> {
        let union: BTreeSet<String> = self
            .place_stat_vars(ctx, ids)
            .await?
            .into_values()
            .flatten()
            .collect();
        to_payload(&union)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{encoded, encoded_text, store_with};

    fn ctx() -> ReadContext {
        ReadContext::background()
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_places_in_flattens_in_request_order() {
        let store = store_with(
            vec![
                ("d/c/geoId/06^County", encoded_text("geoId/06001,geoId/06003")),
                ("d/c/geoId/07^County", encoded_text("geoId/07001")),
            ],
            vec![],
        );
        let request = PlacesInRequest {
            ids: ids(&["geoId/07", "geoId/99", "geoId/06"]),
            place_type: "County".to_string(),
            ..Default::default()
        };
        let payload = store.get_places_in(&ctx(), &request).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"dcid": "geoId/07", "place": "geoId/07001"},
                {"dcid": "geoId/06", "place": "geoId/06001"},
                {"dcid": "geoId/06", "place": "geoId/06003"},
            ])
        );
    }

    #[tokio::test]
    async fn test_related_places_keyed_by_stat_var() {
        let info = RelatedPlacesInfo {
            related_places: ids(&["geoId/07", "geoId/08"]),
            rank_from_top: 3,
            ..Default::default()
        };
        let store = store_with(
            vec![("d/q0/geoId/06^country/USA^Count_Person", encoded(&info))],
            vec![],
        );
        let request = RelatedPlacesRequest {
            id: "geoId/06".to_string(),
            stat_var_ids: ids(&["Count_Person", "Median_Age_Person"]),
            within_place: Some("country/USA".to_string()),
            is_per_capita: true,
            ..Default::default()
        };
        let payload = store.get_related_places(&ctx(), &request).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["Count_Person"]["rankFromTop"], 3);
        assert!(value["Median_Age_Person"].is_null());

        let empty = RelatedPlacesRequest {
            stat_var_ids: vec![],
            ..request
        };
        assert!(store.get_related_places(&ctx(), &empty).await.is_err());
    }

    #[tokio::test]
    async fn test_locations_rankings_read_wildcard_rows_from_both_tiers() {
        let base = RelatedPlacesInfo {
            related_places: ids(&["geoId/06001"]),
            rank_from_top: 1,
            ..Default::default()
        };
        let branch = RelatedPlacesInfo {
            related_places: ids(&["geoId/06003"]),
            rank_from_top: 2,
            ..Default::default()
        };
        let store = store_with(
            vec![
                ("d/q/*^County^geoId/06^Count_Person", encoded(&base)),
                ("d/q/*^County^geoId/06^Median_Age_Person", encoded(&base)),
            ],
            vec![("d/q/*^County^geoId/06^Median_Age_Person", encoded(&branch))],
        );
        let request = LocationsRankingsRequest {
            place_type: "County".to_string(),
            stat_var_ids: ids(&["Count_Person", "Median_Age_Person", "Count_Household"]),
            within_place: Some("geoId/06".to_string()),
            ..Default::default()
        };
        let payload = store.get_locations_rankings(&ctx(), &request).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["Count_Person"]["rankFromTop"], 1);
        assert_eq!(value["Median_Age_Person"]["rankFromTop"], 2);
        assert!(value["Count_Household"].is_null());

        let base_only = LocationsRankingsRequest {
            option: CacheChoice::BaseCacheOnly,
            ..request.clone()
        };
        let payload = store.get_locations_rankings(&ctx(), &base_only).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["Median_Age_Person"]["rankFromTop"], 1);

        let untyped = LocationsRankingsRequest {
            place_type: String::new(),
            ..request
        };
        assert!(store.get_locations_rankings(&ctx(), &untyped).await.is_err());
    }

    #[tokio::test]
    async fn test_interesting_aspects_null_when_missing() {
        let aspects = InterestingPlaceAspects {
            aspects: vec![tessera_core::InterestingPlaceAspect {
                rank_from_top: 1,
                place_type: "State".to_string(),
                ..Default::default()
            }],
        };
        let store = store_with(vec![], vec![("d/i/geoId/06", encoded(&aspects))]);
        let payload = store
            .get_interesting_place_aspects(&ctx(), &ids(&["geoId/06", "geoId/07"]))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["geoId/06"]["aspects"][0]["placeType"], "State");
        assert!(value["geoId/07"].is_null());
    }

    #[tokio::test]
    async fn test_place_kml_is_raw_payload() {
        let kml = encoded_text("<kml/>");
        let store = store_with(vec![("d/k/geoId/06", kml.clone())], vec![]);
        assert_eq!(
            store.get_place_kml(&ctx(), "geoId/06").await.unwrap(),
            Some(kml)
        );
        assert_eq!(store.get_place_kml(&ctx(), "geoId/07").await.unwrap(), None);
        assert!(store.get_place_kml(&ctx(), "").await.is_err());
    }

    #[tokio::test]
    async fn test_place_stat_vars_and_union() {
        let store = store_with(
            vec![
                (
                    "d/0/geoId/06",
                    encoded(&PlaceStatsVar {
                        stat_var_ids: ids(&["Count_Person", "Median_Age_Person"]),
                    }),
                ),
                (
                    "d/0/geoId/07",
                    encoded(&PlaceStatsVar {
                        stat_var_ids: ids(&["Count_Household", "Count_Person"]),
                    }),
                ),
            ],
            vec![],
        );
        let request = ids(&["geoId/06", "geoId/07", "geoId/08"]);
        let payload = store.get_place_stat_vars(&ctx(), &request).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["geoId/08"], serde_json::json!([]));

        let union = store.get_place_stat_vars_union(&ctx(), &request).await.unwrap();
        assert_eq!(
            union,
            r#"["Count_Household","Count_Person","Median_Age_Person"]"#
        );
    }
}
