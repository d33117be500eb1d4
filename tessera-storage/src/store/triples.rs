//! Triples for regular, observation and population ids.

use std::collections::{BTreeMap, HashMap, HashSet};

use tessera_core::{
    CacheChoice, PropValueCache, TesseraResult, Triple, TriplesCache, TriplesRequest, DecodeError,
};

use super::{decode_row, decode_text, to_payload, Store};
use crate::backend::RowSet;
use crate::fallback::{collect_triples, FallbackRequest};
use crate::keys::{
    obs_ancestor_keys, pop_pv_keys, property_values_keys, triples_keys, validate_ids,
    AncestorSlot, RowToken,
};
use crate::payload::unzip_and_decode_keyed;
use crate::reader::ReadContext;

const OBSERVATION_PREFIX: &str = "dc/o/";
const POPULATION_PREFIX: &str = "dc/p/";

type TripleMap = BTreeMap<String, Vec<Triple>>;

/// Cap triples per (direction, predicate, neighbour type) group.
///
/// Direction is relative to `id`: a triple whose subject is `id` is outgoing
/// and grouped by its object types, otherwise by its subject types. A triple
/// with no neighbour types counts under the empty type. Output keeps input
/// order and holds each distinct triple once. A limit of 0 keeps everything.
pub fn apply_limit(id: &str, triples: Vec<Triple>, limit: usize) -> Vec<Triple> {
    if limit == 0 {
        return triples;
    }

    let keep: Vec<bool> = {
        let mut counts: HashMap<(bool, &str, &str), usize> = HashMap::new();
        let mut selected: HashSet<&Triple> = HashSet::new();
        triples
            .iter()
            .map(|t| {
                if selected.contains(t) {
                    return false;
                }
                let out = t.subject_id == id;
                let types = if out { &t.object_types } else { &t.subject_types };
                let groups: Vec<&str> = if types.is_empty() {
                    vec![""]
                } else {
                    types.iter().map(String::as_str).collect()
                };
                let mut keep = false;
                for neighbour_type in groups {
                    let count = counts.entry((out, t.predicate.as_str(), neighbour_type)).or_insert(0);
                    if *count < limit {
                        *count += 1;
                        keep = true;
                    }
                }
                if keep {
                    selected.insert(t);
                }
                keep
            })
            .collect()
    };

    triples
        .into_iter()
        .zip(keep)
        .filter_map(|(t, keep)| keep.then_some(t))
        .collect()
}

/// A population-PV row is `p^v^p^v...`.
fn population_triples(id: &str, key: &str, text: &str) -> TesseraResult<Vec<Triple>> {
    let parts: Vec<&str> = text.split('^').collect();
    if parts.len() % 2 != 0 {
        return Err(DecodeError::MalformedValue {
            key: key.to_string(),
            reason: format!("wrong number of PVs: {}", text),
        }
        .into());
    }
    let mut triples = Vec::with_capacity(parts.len() / 2 + 1);
    triples.push(Triple {
        subject_id: id.to_string(),
        predicate: "numConstraints".to_string(),
        object_value: (parts.len() / 2).to_string(),
        ..Default::default()
    });
    for pair in parts.chunks(2) {
        triples.push(Triple {
            subject_id: id.to_string(),
            predicate: pair[0].to_string(),
            object_id: pair[1].to_string(),
            ..Default::default()
        });
    }
    Ok(triples)
}

impl Store {
    /// `{id: [Triple]}` for every requested id.
    pub async fn get_triples(
        &self,
        ctx: &ReadContext,
        request: &TriplesRequest,
    ) -> TesseraResult<String> {
        validate_ids(&request.ids)?;
        let limit = self.effective_limit(request.limit);
        let results = if self.exceeds_cache(limit) {
            self.triples_from_fallback(&request.ids, limit).await?
        } else {
            self.triples_from_cache(ctx, request, limit).await?
        };
        to_payload(&results)
    }

    async fn triples_from_cache(
        &self,
        ctx: &ReadContext,
        request: &TriplesRequest,
        limit: usize,
    ) -> TesseraResult<TripleMap> {
        let mut results: TripleMap = request
            .ids
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        let (observations, regular): (Vec<String>, Vec<String>) = request
            .ids
            .iter()
            .cloned()
            .partition(|id| id.starts_with(OBSERVATION_PREFIX));
        let populations: Vec<String> = regular
            .iter()
            .filter(|id| id.starts_with(POPULATION_PREFIX))
            .cloned()
            .collect();

        if !regular.is_empty() {
            let rows = self
                .resolver
                .resolve_override(ctx, &triples_keys(&regular), request.option)
                .await?;
            for (id, (key, row)) in regular.iter().zip(rows) {
                let cache: TriplesCache = decode_row(&key, &row).unwrap_or_default();
                results.insert(id.clone(), apply_limit(id, cache.triples, limit));
            }
        }

        if !observations.is_empty() {
            for slot in [AncestorSlot::ObservedNode, AncestorSlot::ComparedNode] {
                self.ancestor_triples(ctx, &observations, slot, request.option, &mut results)
                    .await?;
            }
        }

        if !populations.is_empty() {
            self.population_pv_triples(ctx, &populations, request.option, &mut results)
                .await?;
        }

        Ok(results)
    }

    /// `observedNode` / `comparedNode` triples, named after the ancestor's
    /// `name` property when it has one.
    async fn ancestor_triples(
        &self,
        ctx: &ReadContext,
        observations: &[String],
        slot: AncestorSlot,
        option: CacheChoice,
        results: &mut TripleMap,
    ) -> TesseraResult<()> {
        let rows = self
            .resolver
            .resolve_override(ctx, &obs_ancestor_keys(observations, slot), option)
            .await?;
        let ancestors: Vec<(&String, String)> = observations
            .iter()
            .zip(rows)
            .filter_map(|(id, (key, row))| decode_text(&key, &row).map(|ancestor| (id, ancestor)))
            .filter(|(_, ancestor)| !ancestor.is_empty())
            .collect();
        if ancestors.is_empty() {
            return Ok(());
        }

        let mut ancestor_ids: Vec<String> = ancestors.iter().map(|(_, a)| a.clone()).collect();
        ancestor_ids.sort();
        ancestor_ids.dedup();
        let name_rows = self
            .resolver
            .resolve_override(
                ctx,
                &property_values_keys(&ancestor_ids, "name", None, true),
                option,
            )
            .await?;
        let names: HashMap<String, String> = ancestor_ids
            .iter()
            .zip(name_rows)
            .filter_map(|(id, (key, row))| {
                let cache: PropValueCache = decode_row(&key, &row)?;
                let name = cache.nodes.into_iter().next()?.value;
                (!name.is_empty()).then(|| (id.clone(), name))
            })
            .collect();

        for (id, ancestor) in ancestors {
            let name = names.get(&ancestor).cloned().unwrap_or_else(|| ancestor.clone());
            results.entry(id.clone()).or_default().push(Triple {
                subject_id: id.clone(),
                predicate: slot.predicate().to_string(),
                object_id: ancestor,
                object_name: name,
                ..Default::default()
            });
        }
        Ok(())
    }

    /// Constraint triples for population ids. The branch tier is consulted
    /// only when the base tier has none of them.
    async fn population_pv_triples(
        &self,
        ctx: &ReadContext,
        populations: &[String],
        option: CacheChoice,
        results: &mut TripleMap,
    ) -> TesseraResult<()> {
        let keys = pop_pv_keys(populations);
        let decoded = self
            .resolver
            .reader()
            .read_decoded(ctx, RowSet::Keys(keys.clone()), RowToken::Id, |id, raw| {
                population_triples(id, id, &String::from_utf8_lossy(&raw))
            })
            .await?;
        let mut found = decoded.values;

        if found.is_empty() {
            if let Some(generation) = self.resolver.branch_generation(option) {
                for (id, key) in populations.iter().zip(&keys) {
                    let Some(raw) = generation.get(key) else {
                        continue;
                    };
                    let parsed = unzip_and_decode_keyed(key, raw).and_then(|text| {
                        population_triples(id, key, &String::from_utf8_lossy(&text))
                    });
                    match parsed {
                        Ok(triples) => {
                            found.insert(id.clone(), triples);
                        }
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "Masking undecodable population row");
                        }
                    }
                }
            }
        }

        for id in populations {
            if let Some(triples) = found.remove(id) {
                results.entry(id.clone()).or_default().extend(triples);
            }
        }
        Ok(())
    }

    async fn triples_from_fallback(&self, ids: &[String], limit: usize) -> TesseraResult<TripleMap> {
        let rows = self
            .query_fallback(FallbackRequest::Triples {
                ids: ids.to_vec(),
                limit,
            })
            .await?;
        let mut results: TripleMap = ids.iter().map(|id| (id.clone(), Vec::new())).collect();
        for triple in collect_triples(rows)? {
            if triple.object_id != triple.subject_id {
                if let Some(list) = results.get_mut(&triple.object_id) {
                    list.push(triple.clone());
                }
            }
            if let Some(list) = results.get_mut(&triple.subject_id) {
                list.push(triple);
            }
        }
        for (id, triples) in results.iter_mut() {
            *triples = apply_limit(id, std::mem::take(triples), limit);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{encoded, encoded_text, store_with};

    fn triple(subject: &str, predicate: &str, object: &str, object_types: &[&str]) -> Triple {
        Triple {
            subject_id: subject.to_string(),
            predicate: predicate.to_string(),
            object_id: object.to_string(),
            object_types: object_types.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn parse(payload: &str) -> BTreeMap<String, Vec<Triple>> {
        serde_json::from_str(payload).expect("payload should be JSON")
    }

    #[test]
    fn test_apply_limit_groups_by_predicate_and_type() {
        let triples = vec![
            triple("geoId/06", "containedInPlace", "country/USA", &["Country"]),
            triple("geoId/06", "containedInPlace", "usc/West", &["CensusRegion"]),
            triple("geoId/06", "containedInPlace", "usc/Pacific", &["CensusRegion"]),
            triple("geoId/06", "name", "", &[]),
            triple("geoId/06", "alternateName", "", &[]),
            Triple {
                subject_id: "geoId/06001".to_string(),
                predicate: "containedInPlace".to_string(),
                object_id: "geoId/06".to_string(),
                subject_types: vec!["County".to_string()],
                ..Default::default()
            },
        ];
        let limited = apply_limit("geoId/06", triples.clone(), 1);
        let objects: Vec<&str> = limited.iter().map(|t| t.object_id.as_str()).collect();
        assert_eq!(objects, vec!["country/USA", "usc/West", "", "", "geoId/06"]);

        assert_eq!(apply_limit("geoId/06", triples.clone(), 0), triples);
    }

    #[test]
    fn test_apply_limit_dedupes() {
        let t = triple("a", "p", "b", &["T"]);
        let limited = apply_limit("a", vec![t.clone(), t.clone(), t], 5);
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_population_triples_parse() {
        let triples = population_triples("dc/p/x", "d/d/dc/p/x", "age^Years85Onwards^gender^Male").unwrap();
        assert_eq!(triples.len(), 3);
        assert_eq!(triples[0].object_value, "2");
        assert_eq!(triples[2].predicate, "gender");
        assert_eq!(triples[2].object_id, "Male");

        let err = population_triples("dc/p/x", "d/d/dc/p/x", "age^Years85Onwards^gender").unwrap_err();
        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn test_every_id_present_and_branch_overrides() {
        let base = TriplesCache {
            triples: vec![triple("geoId/06", "name", "base", &[])],
        };
        let branch = TriplesCache {
            triples: vec![triple("geoId/06", "name", "branch", &[])],
        };
        let store = store_with(
            vec![("d/7/geoId/06", encoded(&base))],
            vec![("d/7/geoId/06", encoded(&branch))],
        );
        let request = TriplesRequest {
            ids: vec!["geoId/06".to_string(), "geoId/07".to_string()],
            ..Default::default()
        };
        let out = parse(&store.get_triples(&ReadContext::background(), &request).await.unwrap());
        assert_eq!(out.len(), 2);
        assert_eq!(out["geoId/06"][0].object_id, "branch");
        assert!(out["geoId/07"].is_empty());

        let base_only = TriplesRequest {
            option: CacheChoice::BaseCacheOnly,
            ..request
        };
        let out = parse(&store.get_triples(&ReadContext::background(), &base_only).await.unwrap());
        assert_eq!(out["geoId/06"][0].object_id, "base");
    }

    #[tokio::test]
    async fn test_observation_ancestors_with_names() {
        let name = PropValueCache {
            nodes: vec![tessera_core::Node {
                value: "California".to_string(),
                ..Default::default()
            }],
        };
        let store = store_with(
            vec![
                ("d/6/dc/o/1^0", encoded_text("geoId/06")),
                ("d/6/dc/o/1^1", encoded_text("country/USA")),
                ("d/m/geoId/06^name", encoded(&name)),
            ],
            vec![],
        );
        let request = TriplesRequest {
            ids: vec!["dc/o/1".to_string()],
            ..Default::default()
        };
        let out = parse(&store.get_triples(&ReadContext::background(), &request).await.unwrap());
        let triples = &out["dc/o/1"];
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[0].predicate, "observedNode");
        assert_eq!(triples[0].object_name, "California");
        assert_eq!(triples[1].predicate, "comparedNode");
        assert_eq!(triples[1].object_name, "country/USA");
    }

    #[tokio::test]
    async fn test_population_pvs_fall_back_to_branch() {
        let store = store_with(vec![], vec![("d/d/dc/p/1", encoded_text("gender^Female"))]);
        let request = TriplesRequest {
            ids: vec!["dc/p/1".to_string()],
            ..Default::default()
        };
        let out = parse(&store.get_triples(&ReadContext::background(), &request).await.unwrap());
        let predicates: Vec<&str> = out["dc/p/1"].iter().map(|t| t.predicate.as_str()).collect();
        assert_eq!(predicates, vec!["numConstraints", "gender"]);
    }

    #[tokio::test]
    async fn test_oversize_without_fallback_is_rejected() {
        let store = store_with(vec![], vec![]);
        let request = TriplesRequest {
            ids: vec!["geoId/06".to_string()],
            limit: 10_000,
            ..Default::default()
        };
        let err = store
            .get_triples(&ReadContext::background(), &request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            tessera_core::TesseraError::Validation(tessera_core::ValidationError::UnsupportedCombination { .. })
        ));
    }
}
