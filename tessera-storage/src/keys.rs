//! Row key codec.
//!
//! Every storage row key is `<kind prefix><id>` followed by `^`-separated
//! scalar fields and, where the kind carries population constraints, a
//! canonical `^p^v` suffix sorted by property name. Two logically identical
//! constraint sets always produce the same key.
//!
//! Scalar positions are never dropped when empty, so fields can be read back
//! positionally from a returned row key.

use std::collections::BTreeMap;

use tessera_core::{
    DecodeError, PropertyValue, StatisticalVariable, TesseraResult, ValidationError,
};

/// Field separator inside a row key.
pub const FIELD_SEP: char = '^';

/// Stands in for the place id on place-type-wide rows.
pub const ALL_PLACES: &str = "*";

// ============================================================================
// KIND PREFIXES
// ============================================================================

/// Request kind, one row key prefix each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    PlaceStatVars,
    PopObs,
    PlaceObs,
    ObsAncestor,
    Triples,
    PropertyLabels,
    Populations,
    Observations,
    PlacesIn,
    PopulationPvs,
    ChartData,
    InterestingAspects,
    PlaceKml,
    InPropertyValues,
    OutPropertyValues,
    RelatedSameType,
    RelatedSameTypePerCapita,
    RelatedSameTypeAndAncestor,
    RelatedSameTypeAndAncestorPerCapita,
}

impl KeyKind {
    pub const ALL: [KeyKind; 19] = [
        KeyKind::PlaceStatVars,
        KeyKind::PopObs,
        KeyKind::PlaceObs,
        KeyKind::ObsAncestor,
        KeyKind::Triples,
        KeyKind::PropertyLabels,
        KeyKind::Populations,
        KeyKind::Observations,
        KeyKind::PlacesIn,
        KeyKind::PopulationPvs,
        KeyKind::ChartData,
        KeyKind::InterestingAspects,
        KeyKind::PlaceKml,
        KeyKind::InPropertyValues,
        KeyKind::OutPropertyValues,
        KeyKind::RelatedSameType,
        KeyKind::RelatedSameTypePerCapita,
        KeyKind::RelatedSameTypeAndAncestor,
        KeyKind::RelatedSameTypeAndAncestorPerCapita,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            KeyKind::PlaceStatVars => "d/0/",
            KeyKind::PopObs => "d/2/",
            KeyKind::PlaceObs => "d/3/",
            KeyKind::ObsAncestor => "d/6/",
            KeyKind::Triples => "d/7/",
            KeyKind::PropertyLabels => "d/9/",
            KeyKind::Populations => "d/a/",
            KeyKind::Observations => "d/b/",
            KeyKind::PlacesIn => "d/c/",
            KeyKind::PopulationPvs => "d/d/",
            KeyKind::ChartData => "d/f/",
            KeyKind::InterestingAspects => "d/i/",
            KeyKind::PlaceKml => "d/k/",
            KeyKind::InPropertyValues => "d/l/",
            KeyKind::OutPropertyValues => "d/m/",
            KeyKind::RelatedSameType => "d/o/",
            KeyKind::RelatedSameTypePerCapita => "d/o0/",
            KeyKind::RelatedSameTypeAndAncestor => "d/q/",
            KeyKind::RelatedSameTypeAndAncestorPerCapita => "d/q0/",
        }
    }

    /// Related-places prefix selected by (within an ancestor, per capita).
    pub fn related_places(same_ancestor: bool, per_capita: bool) -> Self {
        match (same_ancestor, per_capita) {
            (true, true) => KeyKind::RelatedSameTypeAndAncestorPerCapita,
            (true, false) => KeyKind::RelatedSameTypeAndAncestor,
            (false, true) => KeyKind::RelatedSameTypePerCapita,
            (false, false) => KeyKind::RelatedSameType,
        }
    }

    /// Property-value prefix for one edge direction.
    pub fn property_values(out: bool) -> Self {
        if out {
            KeyKind::OutPropertyValues
        } else {
            KeyKind::InPropertyValues
        }
    }
}

/// Which ancestor of an observation node an obs-ancestor row holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AncestorSlot {
    ObservedNode,
    ComparedNode,
}

impl AncestorSlot {
    pub fn code(self) -> &'static str {
        match self {
            AncestorSlot::ObservedNode => "0",
            AncestorSlot::ComparedNode => "1",
        }
    }

    pub fn predicate(self) -> &'static str {
        match self {
            AncestorSlot::ObservedNode => "observedNode",
            AncestorSlot::ComparedNode => "comparedNode",
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Reject an empty id list, and any id that is empty or holds a space or comma.
pub fn validate_ids(ids: &[String]) -> TesseraResult<()> {
    if ids.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "ids".to_string(),
        }
        .into());
    }
    let invalid: Vec<String> = ids
        .iter()
        .filter(|id| id.is_empty() || id.contains(' ') || id.contains(','))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(ValidationError::InvalidIds { ids: invalid }.into());
    }
    Ok(())
}

/// Reject an empty scalar parameter.
pub fn require_field(field: &str, value: &str) -> TesseraResult<()> {
    if value.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// BUILDERS
// ============================================================================

/// `^p^v` pairs sorted by property. A repeated property keeps its last value.
pub fn canonical_pv_suffix<'a, I>(pvs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> = pvs.into_iter().collect();
    let mut suffix = String::new();
    for (property, value) in sorted {
        suffix.push(FIELD_SEP);
        suffix.push_str(property);
        suffix.push(FIELD_SEP);
        suffix.push_str(value);
    }
    suffix
}

fn pv_pairs(pvs: &[PropertyValue]) -> impl Iterator<Item = (&str, &str)> {
    pvs.iter().map(|pv| (pv.property.as_str(), pv.value.as_str()))
}

fn join_fields(prefix: &str, id: &str, fields: &[&str]) -> String {
    let mut key = String::with_capacity(prefix.len() + id.len() + fields.len() * 8);
    key.push_str(prefix);
    key.push_str(id);
    for field in fields {
        key.push(FIELD_SEP);
        key.push_str(field);
    }
    key
}

fn simple_keys(kind: KeyKind, ids: &[String]) -> Vec<String> {
    ids.iter().map(|id| join_fields(kind.prefix(), id, &[])).collect()
}

pub fn triples_keys(ids: &[String]) -> Vec<String> {
    simple_keys(KeyKind::Triples, ids)
}

pub fn property_label_keys(ids: &[String]) -> Vec<String> {
    simple_keys(KeyKind::PropertyLabels, ids)
}

pub fn pop_pv_keys(ids: &[String]) -> Vec<String> {
    simple_keys(KeyKind::PopulationPvs, ids)
}

pub fn place_stat_vars_keys(ids: &[String]) -> Vec<String> {
    simple_keys(KeyKind::PlaceStatVars, ids)
}

pub fn interesting_aspects_keys(ids: &[String]) -> Vec<String> {
    simple_keys(KeyKind::InterestingAspects, ids)
}

pub fn pop_obs_key(id: &str) -> String {
    join_fields(KeyKind::PopObs.prefix(), id, &[])
}

pub fn place_kml_key(id: &str) -> String {
    join_fields(KeyKind::PlaceKml.prefix(), id, &[])
}

/// `d/{m|l}/{id}^{prop}`, with `^{valueType}` appended when given.
pub fn property_values_keys(
    ids: &[String],
    property: &str,
    value_type: Option<&str>,
    out: bool,
) -> Vec<String> {
    let prefix = KeyKind::property_values(out).prefix();
    ids.iter()
        .map(|id| match value_type {
            Some(vt) if !vt.is_empty() => join_fields(prefix, id, &[property, vt]),
            _ => join_fields(prefix, id, &[property]),
        })
        .collect()
}

pub fn populations_keys(ids: &[String], pop_type: &str, pvs: &[PropertyValue]) -> Vec<String> {
    let suffix = canonical_pv_suffix(pv_pairs(pvs));
    ids.iter()
        .map(|id| {
            let mut key = join_fields(KeyKind::Populations.prefix(), id, &[pop_type]);
            key.push_str(&suffix);
            key
        })
        .collect()
}

/// Observation keys. `stats_type` is given in snake case and stored camel case.
/// The trailing empty positions are part of the stored layout.
pub fn observations_keys(
    ids: &[String],
    measured_prop: &str,
    stats_type: &str,
    date: &str,
    period: &str,
    method: &str,
) -> Vec<String> {
    let stats = snake_to_camel(stats_type);
    ids.iter()
        .map(|id| {
            join_fields(
                KeyKind::Observations.prefix(),
                id,
                &[measured_prop, &stats, date, period, method, "", "", ""],
            )
        })
        .collect()
}

pub fn places_in_keys(ids: &[String], place_type: &str) -> Vec<String> {
    ids.iter()
        .map(|id| join_fields(KeyKind::PlacesIn.prefix(), id, &[place_type]))
        .collect()
}

pub fn place_obs_key(place_type: &str, date: &str, pop_type: &str, pvs: &[PropertyValue]) -> String {
    let mut key = join_fields(KeyKind::PlaceObs.prefix(), place_type, &[date, pop_type]);
    key.push_str(&canonical_pv_suffix(pv_pairs(pvs)));
    key
}

/// Chart-data key for one place and statistical variable signature.
pub fn chart_data_key(place: &str, sv: &StatisticalVariable) -> String {
    let mut key = join_fields(
        KeyKind::ChartData.prefix(),
        place,
        &[
            &sv.measured_prop,
            &sv.stat_type,
            &sv.measurement_denominator,
            &sv.measurement_qualifier,
            &sv.scaling_factor,
            &sv.pop_type,
        ],
    );
    key.push_str(&canonical_pv_suffix(
        sv.pvs.iter().map(|(p, v)| (p.as_str(), v.as_str())),
    ));
    key
}

pub fn chart_data_keys(places: &[String], sv: &StatisticalVariable) -> Vec<String> {
    places.iter().map(|place| chart_data_key(place, sv)).collect()
}

pub fn obs_ancestor_keys(ids: &[String], slot: AncestorSlot) -> Vec<String> {
    ids.iter()
        .map(|id| join_fields(KeyKind::ObsAncestor.prefix(), id, &[slot.code()]))
        .collect()
}

/// One key per stat var; the stat var is always the last key item.
pub fn related_places_keys(
    id: &str,
    within_place: Option<&str>,
    per_capita: bool,
    stat_vars: &[String],
) -> Vec<String> {
    let within = within_place.filter(|w| !w.is_empty());
    let prefix = KeyKind::related_places(within.is_some(), per_capita).prefix();
    stat_vars
        .iter()
        .map(|sv| match within {
            Some(w) => join_fields(prefix, id, &[w, sv]),
            None => join_fields(prefix, id, &[sv]),
        })
        .collect()
}

/// Place-type-wide ranking rows: `{prefix}*^{placeType}[^{within}]^{statVar}`.
pub fn locations_rankings_keys(
    place_type: &str,
    within_place: Option<&str>,
    per_capita: bool,
    stat_vars: &[String],
) -> Vec<String> {
    let within = within_place.filter(|w| !w.is_empty());
    let prefix = KeyKind::related_places(within.is_some(), per_capita).prefix();
    stat_vars
        .iter()
        .map(|sv| match within {
            Some(w) => join_fields(prefix, ALL_PLACES, &[place_type, w, sv]),
            None => join_fields(prefix, ALL_PLACES, &[place_type, sv]),
        })
        .collect()
}

// ============================================================================
// TOKEN EXTRACTION
// ============================================================================

/// Which part of a returned row key identifies the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowToken {
    Id,
    LastItem,
}

impl RowToken {
    pub fn extract(self, key: &str) -> TesseraResult<String> {
        match self {
            RowToken::Id => key_to_id(key),
            RowToken::LastItem => last_item(key),
        }
    }
}

/// Entity id embedded in a row key: everything after the kind prefix, up to the
/// first `^`.
pub fn key_to_id(key: &str) -> TesseraResult<String> {
    let head = key.split(FIELD_SEP).next().unwrap_or_default();
    match head.splitn(3, '/').nth(2) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(DecodeError::MalformedKey {
            key: key.to_string(),
        }
        .into()),
    }
}

/// Last `^` item of a row key.
pub fn last_item(key: &str) -> TesseraResult<String> {
    match key.rsplit_once(FIELD_SEP) {
        Some((_, item)) => Ok(item.to_string()),
        None => Err(DecodeError::MalformedKey {
            key: key.to_string(),
        }
        .into()),
    }
}

/// Everything after the kind prefix.
pub fn remove_kind_prefix(key: &str) -> TesseraResult<String> {
    match key.splitn(3, '/').nth(2) {
        Some(rest) if !rest.is_empty() => Ok(rest.to_string()),
        _ => Err(DecodeError::MalformedKey {
            key: key.to_string(),
        }
        .into()),
    }
}

/// `measured_value` -> `measuredValue`. Empty segments are dropped.
pub fn snake_to_camel(s: &str) -> String {
    if !s.contains('_') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    for part in s.split('_').filter(|p| !p.is_empty()) {
        if out.is_empty() {
            out.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::TesseraError;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prefixes_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for kind in KeyKind::ALL {
            assert!(seen.insert(kind.prefix()), "duplicate prefix {}", kind.prefix());
        }
    }

    #[test]
    fn test_locations_rankings_keys_use_wildcard_place() {
        let svs = ids(&["Count_Person", "Median_Age_Person"]);
        assert_eq!(
            locations_rankings_keys("County", None, false, &svs),
            vec!["d/o/*^County^Count_Person", "d/o/*^County^Median_Age_Person"]
        );
        assert_eq!(
            locations_rankings_keys("County", Some("geoId/06"), true, &svs[..1]),
            vec!["d/q0/*^County^geoId/06^Count_Person"]
        );
        // an empty ancestor is the same as none
        assert_eq!(
            locations_rankings_keys("County", Some(""), true, &svs[..1]),
            vec!["d/o0/*^County^Count_Person"]
        );
        let key = &locations_rankings_keys("County", None, false, &svs[..1])[0];
        assert_eq!(last_item(key).unwrap(), "Count_Person");
    }

    #[test]
    fn test_related_places_prefix_table() {
        assert_eq!(KeyKind::related_places(true, true).prefix(), "d/q0/");
        assert_eq!(KeyKind::related_places(true, false).prefix(), "d/q/");
        assert_eq!(KeyKind::related_places(false, true).prefix(), "d/o0/");
        assert_eq!(KeyKind::related_places(false, false).prefix(), "d/o/");
    }

    #[test]
    fn test_canonical_suffix_example() {
        let a = canonical_pv_suffix([("gender", "Male"), ("age", "Years85Onwards")]);
        let b = canonical_pv_suffix([("age", "Years85Onwards"), ("gender", "Male")]);
        assert_eq!(a, "^age^Years85Onwards^gender^Male");
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_suffix_repeated_property_last_wins() {
        let suffix = canonical_pv_suffix([("gender", "Male"), ("gender", "Female")]);
        assert_eq!(suffix, "^gender^Female");
    }

    #[test]
    fn test_simple_builders_keep_input_order() {
        let keys = triples_keys(&ids(&["geoId/06", "Count_Person"]));
        assert_eq!(keys, vec!["d/7/geoId/06", "d/7/Count_Person"]);
        assert_eq!(property_label_keys(&ids(&["x"])), vec!["d/9/x"]);
        assert_eq!(pop_pv_keys(&ids(&["dc/p/1"])), vec!["d/d/dc/p/1"]);
        assert_eq!(place_stat_vars_keys(&ids(&["geoId/06"])), vec!["d/0/geoId/06"]);
        assert_eq!(interesting_aspects_keys(&ids(&["geoId/06"])), vec!["d/i/geoId/06"]);
        assert_eq!(pop_obs_key("geoId/06"), "d/2/geoId/06");
        assert_eq!(place_kml_key("geoId/06"), "d/k/geoId/06");
    }

    #[test]
    fn test_property_values_keys() {
        let out = property_values_keys(&ids(&["geoId/06"]), "containedInPlace", None, true);
        assert_eq!(out, vec!["d/m/geoId/06^containedInPlace"]);
        let typed = property_values_keys(&ids(&["geoId/06"]), "containedInPlace", Some("County"), false);
        assert_eq!(typed, vec!["d/l/geoId/06^containedInPlace^County"]);
        let blank = property_values_keys(&ids(&["geoId/06"]), "name", Some(""), true);
        assert_eq!(blank, vec!["d/m/geoId/06^name"]);
    }

    #[test]
    fn test_populations_keys() {
        let pvs = vec![
            PropertyValue::new("gender", "Female"),
            PropertyValue::new("age", "Years5To17"),
        ];
        let keys = populations_keys(&ids(&["geoId/06"]), "Person", &pvs);
        assert_eq!(keys, vec!["d/a/geoId/06^Person^age^Years5To17^gender^Female"]);
    }

    #[test]
    fn test_observations_keys_keep_empty_positions() {
        let keys = observations_keys(
            &ids(&["dc/p/x"]),
            "count",
            "measured_value",
            "2017",
            "",
            "CensusACS5yrSurvey",
        );
        assert_eq!(keys, vec!["d/b/dc/p/x^count^measuredValue^2017^^CensusACS5yrSurvey^^^"]);
        assert_eq!(key_to_id(&keys[0]).unwrap(), "dc/p/x");
    }

    #[test]
    fn test_place_obs_key() {
        let key = place_obs_key("City", "2017", "Person", &[PropertyValue::new("gender", "Male")]);
        assert_eq!(key, "d/3/City^2017^Person^gender^Male");
    }

    #[test]
    fn test_chart_data_key() {
        let mut sv = StatisticalVariable {
            pop_type: "Person".to_string(),
            measured_prop: "count".to_string(),
            stat_type: "measured".to_string(),
            ..Default::default()
        };
        sv.pvs.insert("gender".to_string(), "Female".to_string());
        sv.pvs.insert("age".to_string(), "Years5To17".to_string());
        let key = chart_data_key("geoId/06", &sv);
        assert_eq!(
            key,
            "d/f/geoId/06^count^measured^^^^Person^age^Years5To17^gender^Female"
        );
        assert_eq!(key_to_id(&key).unwrap(), "geoId/06");
    }

    #[test]
    fn test_obs_ancestor_keys() {
        let keys = obs_ancestor_keys(&ids(&["dc/o/abc"]), AncestorSlot::ComparedNode);
        assert_eq!(keys, vec!["d/6/dc/o/abc^1"]);
        assert_eq!(AncestorSlot::ObservedNode.predicate(), "observedNode");
    }

    #[test]
    fn test_related_places_keys() {
        let svs = ids(&["Count_Person"]);
        let keys = related_places_keys("geoId/06085", Some("geoId/06"), true, &svs);
        assert_eq!(keys, vec!["d/q0/geoId/06085^geoId/06^Count_Person"]);
        let keys = related_places_keys("geoId/06085", None, false, &svs);
        assert_eq!(keys, vec!["d/o/geoId/06085^Count_Person"]);
        assert_eq!(last_item(&keys[0]).unwrap(), "Count_Person");
    }

    #[test]
    fn test_key_to_id_malformed() {
        let err = key_to_id("d/").unwrap_err();
        assert!(matches!(err, TesseraError::Decode(DecodeError::MalformedKey { .. })));
        assert!(last_item("d/7/geoId/06").is_err());
        assert_eq!(remove_kind_prefix("d/c/geoId/06^County").unwrap(), "geoId/06^County");
    }

    #[test]
    fn test_row_token_extract() {
        assert_eq!(RowToken::Id.extract("d/c/geoId/06^County").unwrap(), "geoId/06");
        assert_eq!(RowToken::LastItem.extract("d/c/geoId/06^County").unwrap(), "County");
    }

    #[test]
    fn test_validate_ids() {
        assert!(validate_ids(&ids(&["geoId/06"])).is_ok());
        match validate_ids(&[]) {
            Err(TesseraError::Validation(ValidationError::RequiredFieldMissing { field })) => {
                assert_eq!(field, "ids")
            }
            other => panic!("expected RequiredFieldMissing, got {:?}", other),
        }
        match validate_ids(&ids(&["geoId/06", "geo Id", "a,b", ""])) {
            Err(TesseraError::Validation(ValidationError::InvalidIds { ids })) => {
                assert_eq!(ids.len(), 3)
            }
            other => panic!("expected InvalidIds, got {:?}", other),
        }
    }

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("measured_value"), "measuredValue");
        assert_eq!(snake_to_camel("margin_of_error"), "marginOfError");
        assert_eq!(snake_to_camel("measuredValue"), "measuredValue");
        assert_eq!(snake_to_camel("_mean__value"), "meanValue");
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn token() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_]{1,12}"
    }

    fn id() -> impl Strategy<Value = String> {
        "[a-zA-Z]{2,6}/[A-Za-z0-9_]{1,10}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any permutation of the same constraint pairs yields the same key.
        #[test]
        fn prop_key_independent_of_pv_order(
            place in id(),
            pop_type in token(),
            pvs in prop::collection::btree_map(token(), token(), 0..6),
            seed in any::<u64>(),
        ) {
            let forward: Vec<PropertyValue> = pvs
                .iter()
                .map(|(p, v)| PropertyValue::new(p.clone(), v.clone()))
                .collect();
            let mut shuffled = forward.clone();
            // deterministic rotation plus reverse
            if !shuffled.is_empty() {
                let n = shuffled.len();
                shuffled.rotate_left((seed as usize) % n);
                if seed % 2 == 0 {
                    shuffled.reverse();
                }
            }
            let places = vec![place];
            prop_assert_eq!(
                populations_keys(&places, &pop_type, &forward),
                populations_keys(&places, &pop_type, &shuffled)
            );
        }

        /// The id always comes back out of a built key.
        #[test]
        fn prop_id_round_trips_through_key(
            place in id(),
            prop_name in token(),
            place_type in token(),
        ) {
            let places = vec![place.clone()];
            for key in triples_keys(&places)
                .into_iter()
                .chain(property_values_keys(&places, &prop_name, None, true))
                .chain(places_in_keys(&places, &place_type))
            {
                prop_assert_eq!(key_to_id(&key).unwrap(), place.clone());
            }
        }

        /// Builders return one key per id, in order.
        #[test]
        fn prop_one_key_per_id(list in prop::collection::vec(id(), 1..20)) {
            let keys = triples_keys(&list);
            prop_assert_eq!(keys.len(), list.len());
            for (key, id) in keys.iter().zip(list.iter()) {
                prop_assert_eq!(key_to_id(key).unwrap(), id.clone());
            }
        }
    }
}
