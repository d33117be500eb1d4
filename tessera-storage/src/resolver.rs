//! Tiered resolver: combines the base row store with the branch tier.
//!
//! Two policies exist. Override-by-presence answers a key from the branch
//! whenever the branch has any entry for it. Structural merge decodes both
//! records and lets branch sub-entries replace base sub-entries that share a
//! sub-key.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_core::{CacheChoice, PopObsCollection, PopObsPlace, TesseraResult};

use crate::backend::RowSet;
use crate::branch::{BranchCache, Generation};
use crate::payload::{decode_json, empty_object_payload, encode_json};
use crate::reader::{BatchedReader, ReadContext};

// ============================================================================
// OVERRIDE-BY-PRESENCE
// ============================================================================

/// Where a resolved key's raw cell came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TieredRow {
    Branch(Vec<u8>),
    Base(Vec<u8>),
    Missing,
}

impl TieredRow {
    /// Encoded cell, if either tier had one.
    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            TieredRow::Branch(raw) | TieredRow::Base(raw) => Some(raw.as_slice()),
            TieredRow::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, TieredRow::Missing)
    }
}

// ============================================================================
// STRUCTURAL MERGE
// ============================================================================

/// Sub-key merge rule for one composite record kind.
pub trait MergePolicy {
    type Record: DeserializeOwned + Serialize;

    /// Short name for logs.
    const NAME: &'static str;

    /// Union `branch` into `base`; branch wins on shared sub-keys.
    fn merge(base: Self::Record, branch: Self::Record) -> Self::Record;
}

/// A place's populations, keyed by population id.
pub struct PopulationsMerge;

impl MergePolicy for PopulationsMerge {
    type Record = PopObsPlace;
    const NAME: &'static str = "populations";

    fn merge(mut base: PopObsPlace, branch: PopObsPlace) -> PopObsPlace {
        base.populations.extend(branch.populations);
        base
    }
}

/// Many places' records, keyed by place id.
///
/// Base order is kept; a branch record replaces the base record for the same
/// place in its position, and branch-only places follow in branch order.
pub struct PlacesMerge;

impl MergePolicy for PlacesMerge {
    type Record = PopObsCollection;
    const NAME: &'static str = "places";

    fn merge(mut base: PopObsCollection, branch: PopObsCollection) -> PopObsCollection {
        let mut position: HashMap<String, usize> = base
            .places
            .iter()
            .enumerate()
            .map(|(i, p)| (p.place.clone(), i))
            .collect();
        for place in branch.places {
            match position.get(&place.place) {
                Some(&i) => base.places[i] = place,
                None => {
                    position.insert(place.place.clone(), base.places.len());
                    base.places.push(place);
                }
            }
        }
        base
    }
}

/// Result of a structural-merge read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Neither tier had data: the encoded empty object.
    Empty(String),
    /// Exactly one usable tier; its raw cell unchanged.
    PassThrough(Vec<u8>),
    /// Both tiers merged and re-encoded.
    Merged(String),
    /// A merge was required and could not be produced.
    Absent(String),
}

impl MergeOutcome {
    /// Encoded payload to hand back, `None` when absent.
    pub fn payload(&self) -> Option<String> {
        match self {
            MergeOutcome::Empty(s) | MergeOutcome::Merged(s) => Some(s.clone()),
            MergeOutcome::PassThrough(raw) => Some(String::from_utf8_lossy(raw).into_owned()),
            MergeOutcome::Absent(_) => None,
        }
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Clone)]
pub struct TieredResolver {
    reader: BatchedReader,
    branch: Option<Arc<BranchCache>>,
}

impl TieredResolver {
    pub fn new(reader: BatchedReader, branch: Option<Arc<BranchCache>>) -> Self {
        Self { reader, branch }
    }

    pub fn reader(&self) -> &BatchedReader {
        &self.reader
    }

    pub fn branch(&self) -> Option<&Arc<BranchCache>> {
        self.branch.as_ref()
    }

    /// The branch generation a request should consult, if any. One handle is
    /// taken per request so every key of the request sees the same table.
    pub fn branch_generation(&self, choice: CacheChoice) -> Option<Arc<Generation>> {
        if !choice.uses_branch() {
            return None;
        }
        self.branch.as_ref().map(|cache| cache.snapshot())
    }

    /// Batch-read the base tier, keyed by full row key.
    pub async fn read_base(
        &self,
        ctx: &ReadContext,
        rows: RowSet,
    ) -> TesseraResult<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(rows.len());
        self.reader
            .read_rows(ctx, rows, |row| {
                found.insert(row.key, row.value);
                Ok(())
            })
            .await?;
        Ok(found)
    }

    /// Resolve every key with override-by-presence, in input order.
    pub async fn resolve_override(
        &self,
        ctx: &ReadContext,
        keys: &[String],
        choice: CacheChoice,
    ) -> TesseraResult<Vec<(String, TieredRow)>> {
        let mut base = self.read_base(ctx, RowSet::Keys(keys.to_vec())).await?;
        let branch = self.branch_generation(choice);

        Ok(keys
            .iter()
            .map(|key| {
                let row = match branch.as_ref().and_then(|g| g.get(key)) {
                    Some(raw) => TieredRow::Branch(raw.to_vec()),
                    None => match base.remove(key) {
                        Some(raw) => TieredRow::Base(raw),
                        None => TieredRow::Missing,
                    },
                };
                (key.clone(), row)
            })
            .collect())
    }

    pub async fn resolve_override_one(
        &self,
        ctx: &ReadContext,
        key: &str,
        choice: CacheChoice,
    ) -> TesseraResult<TieredRow> {
        let mut rows = self
            .resolve_override(ctx, &[key.to_string()], choice)
            .await?;
        Ok(rows.pop().map(|(_, row)| row).unwrap_or(TieredRow::Missing))
    }

    /// Resolve one composite record with the merge rule `P`.
    pub async fn resolve_merged<P: MergePolicy>(
        &self,
        ctx: &ReadContext,
        key: &str,
        choice: CacheChoice,
    ) -> TesseraResult<MergeOutcome> {
        let base = self
            .read_base(ctx, RowSet::Keys(vec![key.to_string()]))
            .await?
            .remove(key);
        let branch = self
            .branch_generation(choice)
            .and_then(|g| g.get(key).map(<[u8]>::to_vec));

        let (base_raw, branch_raw) = match (base, branch) {
            (None, None) => return Ok(MergeOutcome::Empty(empty_object_payload()?)),
            (Some(raw), None) | (None, Some(raw)) => return Ok(MergeOutcome::PassThrough(raw)),
            (Some(base_raw), Some(branch_raw)) => (base_raw, branch_raw),
        };

        let base_record = decode_json::<P::Record>(key, &base_raw);
        let branch_record = decode_json::<P::Record>(key, &branch_raw);
        match (base_record, branch_record) {
            (Ok(base_record), Ok(branch_record)) => {
                let merged = P::merge(base_record, branch_record);
                match encode_json(&merged) {
                    Ok(payload) => Ok(MergeOutcome::Merged(payload)),
                    Err(e) => {
                        tracing::warn!(key = %key, policy = P::NAME, error = %e, "Merged record could not be encoded");
                        Ok(MergeOutcome::Absent(e.to_string()))
                    }
                }
            }
            (Err(e), Ok(_)) => {
                tracing::warn!(key = %key, policy = P::NAME, tier = "base", error = %e, "Passing branch record through");
                Ok(MergeOutcome::PassThrough(branch_raw))
            }
            (Ok(_), Err(e)) => {
                tracing::warn!(key = %key, policy = P::NAME, tier = "branch", error = %e, "Passing base record through");
                Ok(MergeOutcome::PassThrough(base_raw))
            }
            (Err(base_err), Err(branch_err)) => {
                tracing::warn!(
                    key = %key,
                    policy = P::NAME,
                    base_error = %base_err,
                    branch_error = %branch_err,
                    "Neither tier decodes, marking absent"
                );
                Ok(MergeOutcome::Absent(format!(
                    "base: {}; branch: {}",
                    base_err, branch_err
                )))
            }
        }
    }
}
