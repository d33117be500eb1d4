//! Property values and labels, served from cache or the oversize fallback.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use serde::Serialize;
use tessera_core::{
    CacheChoice, Direction, Node, PropLabelCache, PropValueCache, PropertyValuesRequest,
    TesseraResult, Triple,
};

use super::{decode_row, to_payload, Store};
use crate::backend::RowSet;
use crate::fallback::{collect_triples, FallbackRequest};
use crate::keys::{
    property_label_keys, property_values_keys, require_field, validate_ids, FIELD_SEP,
};
use crate::payload::decode_json;
use crate::reader::ReadContext;
use crate::resolver::TieredRow;

/// Neighbours of one id, split by edge direction. Only the requested
/// directions are serialized.
#[derive(Debug, Default, Serialize)]
struct DirectedNodes {
    #[serde(rename = "in", skip_serializing_if = "Option::is_none")]
    incoming: Option<Vec<Node>>,
    #[serde(rename = "out", skip_serializing_if = "Option::is_none")]
    outgoing: Option<Vec<Node>>,
}

impl DirectedNodes {
    fn set(&mut self, out: bool, nodes: Vec<Node>) {
        if out {
            self.outgoing = Some(nodes);
        } else {
            self.incoming = Some(nodes);
        }
    }
}

fn requested_directions(direction: Direction) -> Vec<bool> {
    let mut out = Vec::with_capacity(2);
    if direction.includes_in() {
        out.push(false);
    }
    if direction.includes_out() {
        out.push(true);
    }
    out
}

/// Keys of `rows` that belong to `prefix`: the prefix itself, or the prefix
/// followed by a field separator.
fn rows_under<'a>(
    rows: &'a BTreeMap<String, Vec<u8>>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Vec<u8>)> + 'a {
    rows.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(prefix))
        .filter(move |(key, _)| {
            key.len() == prefix.len() || key[prefix.len()..].starts_with(FIELD_SEP)
        })
}

/// The neighbour a fallback triple contributes, seen from `id`.
fn fallback_node(triple: Triple, out: bool) -> Node {
    let dcid = if out { triple.object_id } else { triple.subject_id };
    Node {
        dcid,
        provenance_id: triple.provenance_id,
        value: if out { triple.object_value } else { String::new() },
        ..Default::default()
    }
}

impl Store {
    /// `{id: {"in": [Node], "out": [Node]}}`.
    pub async fn get_property_values(
        &self,
        ctx: &ReadContext,
        request: &PropertyValuesRequest,
    ) -> TesseraResult<String> {
        validate_ids(&request.ids)?;
        require_field("property", &request.property)?;
        let limit = self.effective_limit(request.limit);

        let mut results: BTreeMap<String, DirectedNodes> = request
            .ids
            .iter()
            .map(|id| (id.clone(), DirectedNodes::default()))
            .collect();

        for out in requested_directions(request.direction) {
            let mut nodes = if self.exceeds_cache(limit) {
                self.property_values_from_fallback(request, out, limit).await?
            } else {
                self.property_values_from_cache(ctx, request, out).await?
            };
            for (id, entry) in results.iter_mut() {
                let mut list = nodes.remove(id).unwrap_or_default();
                list.truncate(limit);
                entry.set(out, list);
            }
        }

        to_payload(&results)
    }

    async fn property_values_from_cache(
        &self,
        ctx: &ReadContext,
        request: &PropertyValuesRequest,
        out: bool,
    ) -> TesseraResult<HashMap<String, Vec<Node>>> {
        let prefixes = property_values_keys(
            &request.ids,
            &request.property,
            request.value_type.as_deref(),
            out,
        );
        let base: BTreeMap<String, Vec<u8>> = self
            .resolver
            .read_base(ctx, RowSet::Prefixes(prefixes.clone()))
            .await?
            .into_iter()
            .collect();
        let branch = self.resolver.branch_generation(request.option);

        let mut nodes = HashMap::with_capacity(request.ids.len());
        for (id, prefix) in request.ids.iter().zip(&prefixes) {
            if let Some(raw) = branch.as_ref().and_then(|g| g.get(prefix)) {
                let cache: PropValueCache =
                    decode_row(prefix, &TieredRow::Branch(raw.to_vec())).unwrap_or_default();
                nodes.insert(id.clone(), cache.nodes);
                continue;
            }
            let mut list = Vec::new();
            for (key, raw) in rows_under(&base, prefix) {
                match decode_json::<PropValueCache>(key, raw) {
                    Ok(cache) => list.extend(cache.nodes),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Masking undecodable row");
                    }
                }
            }
            nodes.insert(id.clone(), list);
        }
        Ok(nodes)
    }

    async fn property_values_from_fallback(
        &self,
        request: &PropertyValuesRequest,
        out: bool,
        limit: usize,
    ) -> TesseraResult<HashMap<String, Vec<Node>>> {
        let rows = self
            .query_fallback(FallbackRequest::PropertyValues {
                ids: request.ids.clone(),
                property: request.property.clone(),
                value_type: request.value_type.clone(),
                direction: if out { Direction::Out } else { Direction::In },
                limit,
            })
            .await?;
        let mut nodes: HashMap<String, Vec<Node>> = HashMap::new();
        for triple in collect_triples(rows)? {
            let id = if out {
                triple.subject_id.clone()
            } else {
                triple.object_id.clone()
            };
            nodes.entry(id).or_default().push(fallback_node(triple, out));
        }
        Ok(nodes)
    }

    /// `{id: {inLabels, outLabels}}`; missing rows read as empty lists.
    pub async fn get_property_labels(
        &self,
        ctx: &ReadContext,
        ids: &[String],
    ) -> TesseraResult<String> {
        validate_ids(ids)?;
        let rows = self
            .resolver
            .resolve_override(ctx, &property_label_keys(ids), CacheChoice::Default)
            .await?;
        let labels: BTreeMap<&String, PropLabelCache> = ids
            .iter()
            .zip(rows)
            .map(|(id, (key, row))| (id, decode_row(&key, &row).unwrap_or_default()))
            .collect();
        to_payload(&labels)
    }
}
