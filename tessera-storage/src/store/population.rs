//! Population and observation reads, including the structural merges.

use tessera_core::{
    ObservationsRequest, PlaceObsRequest, PlacePopInfo, PopObs, PopObsRequest,
    PopulationsRequest, TesseraResult,
};

use super::{decode_text, to_payload, Store};
use crate::keys::{
    observations_keys, place_obs_key, pop_obs_key, populations_keys, require_field, validate_ids,
};
use crate::reader::ReadContext;
use crate::resolver::{PlacesMerge, PopulationsMerge};

impl Store {
    /// Every population of a place and their observations, merged across
    /// tiers. Returns the encoded record, or `None` when no usable record
    /// could be produced.
    pub async fn get_pop_obs(
        &self,
        ctx: &ReadContext,
        request: &PopObsRequest,
    ) -> TesseraResult<Option<String>> {
        validate_ids(std::slice::from_ref(&request.id))?;
        let key = pop_obs_key(&request.id);
        let outcome = self
            .resolver
            .resolve_merged::<PopulationsMerge>(ctx, &key, request.option)
            .await?;
        Ok(outcome.payload())
    }

    /// Observations for every place of a type, merged across tiers.
    pub async fn get_place_obs(
        &self,
        ctx: &ReadContext,
        request: &PlaceObsRequest,
    ) -> TesseraResult<Option<String>> {
        require_field("place_type", &request.place_type)?;
        require_field("population_type", &request.population_type)?;
        require_field("observation_date", &request.observation_date)?;
        let key = place_obs_key(
            &request.place_type,
            &request.observation_date,
            &request.population_type,
            &request.pvs,
        );
        let outcome = self
            .resolver
            .resolve_merged::<PlacesMerge>(ctx, &key, request.option)
            .await?;
        Ok(outcome.payload())
    }

    /// `[{dcid, population}]` in request order.
    pub async fn get_populations(
        &self,
        ctx: &ReadContext,
        request: &PopulationsRequest,
    ) -> TesseraResult<String> {
        validate_ids(&request.ids)?;
        require_field("population_type", &request.population_type)?;
        let keys = populations_keys(&request.ids, &request.population_type, &request.pvs);
        let rows = self
            .resolver
            .resolve_override(ctx, &keys, request.option)
            .await?;
        let out: Vec<PlacePopInfo> = request
            .ids
            .iter()
            .zip(rows)
            .map(|(id, (key, row))| PlacePopInfo {
                dcid: id.clone(),
                population: decode_text(&key, &row).unwrap_or_default(),
            })
            .collect();
        to_payload(&out)
    }

    /// `[{dcid, observation}]` in request order.
    pub async fn get_observations(
        &self,
        ctx: &ReadContext,
        request: &ObservationsRequest,
    ) -> TesseraResult<String> {
        validate_ids(&request.ids)?;
        require_field("measured_property", &request.measured_property)?;
        require_field("stats_type", &request.stats_type)?;
        require_field("observation_date", &request.observation_date)?;
        let keys = observations_keys(
            &request.ids,
            &request.measured_property,
            &request.stats_type,
            &request.observation_date,
            &request.observation_period,
            &request.measurement_method,
        );
        let rows = self
            .resolver
            .resolve_override(ctx, &keys, request.option)
            .await?;
        let out: Vec<PopObs> = request
            .ids
            .iter()
            .zip(rows)
            .map(|(id, (key, row))| PopObs {
                dcid: id.clone(),
                observation: decode_text(&key, &row).unwrap_or_default(),
            })
            .collect();
        to_payload(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::unzip_and_decode;
    use crate::store::testing::{encoded, encoded_text, store_with};
    use tessera_core::{
        CacheChoice, PopObsCollection, PopObsPlace, PopObsPop, PropertyValue, TesseraError,
        ValidationError,
    };

    fn ctx() -> ReadContext {
        ReadContext::background()
    }

    fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> T {
        serde_json::from_slice(&unzip_and_decode(payload).unwrap()).unwrap()
    }

    fn pop(pop_type: &str) -> PopObsPop {
        PopObsPop {
            pop_type: pop_type.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pop_obs_merges_populations() {
        let mut base = PopObsPlace::default();
        base.populations.insert("dc/p/a".to_string(), pop("Person"));
        base.populations.insert("dc/p/b".to_string(), pop("Person"));
        let mut branch = PopObsPlace::default();
        branch.populations.insert("dc/p/b".to_string(), pop("Household"));
        branch.populations.insert("dc/p/c".to_string(), pop("Person"));

        let store = store_with(
            vec![("d/2/geoId/06", encoded(&base))],
            vec![("d/2/geoId/06", encoded(&branch))],
        );
        let request = PopObsRequest {
            id: "geoId/06".to_string(),
            option: CacheChoice::Default,
        };
        let payload = store.get_pop_obs(&ctx(), &request).await.unwrap().unwrap();
        let merged: PopObsPlace = decode(&payload);
        assert_eq!(merged.populations.len(), 3);
        assert_eq!(merged.populations["dc/p/b"].pop_type, "Household");
    }

    #[tokio::test]
    async fn test_pop_obs_missing_is_empty_object() {
        let store = store_with(vec![], vec![]);
        let request = PopObsRequest {
            id: "geoId/99".to_string(),
            ..Default::default()
        };
        let payload = store.get_pop_obs(&ctx(), &request).await.unwrap().unwrap();
        assert_eq!(unzip_and_decode(&payload).unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_place_obs_requires_scalars_and_merges() {
        let store = store_with(vec![], vec![]);
        let err = store
            .get_place_obs(&ctx(), &PlaceObsRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TesseraError::Validation(ValidationError::RequiredFieldMissing { .. })
        ));

        let key = "d/3/County^2019^Person^gender^Female";
        let place = |id: &str, name: &str| PopObsPlace {
            place: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        let base = PopObsCollection {
            places: vec![place("geoId/1", "one"), place("geoId/2", "two")],
        };
        let branch = PopObsCollection {
            places: vec![place("geoId/2", "TWO"), place("geoId/3", "three")],
        };
        let store = store_with(vec![(key, encoded(&base))], vec![(key, encoded(&branch))]);
        let request = PlaceObsRequest {
            place_type: "County".to_string(),
            observation_date: "2019".to_string(),
            population_type: "Person".to_string(),
            pvs: vec![PropertyValue::new("gender", "Female")],
            option: CacheChoice::Default,
        };
        let payload = store.get_place_obs(&ctx(), &request).await.unwrap().unwrap();
        let merged: PopObsCollection = decode(&payload);
        let names: Vec<&str> = merged.places.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["one", "TWO", "three"]);
    }

    #[tokio::test]
    async fn test_populations_keep_request_order() {
        let store = store_with(
            vec![("d/a/geoId/06^Person^gender^Female", encoded_text("dc/p/female"))],
            vec![("d/a/geoId/07^Person^gender^Female", encoded_text("dc/p/branch"))],
        );
        let request = PopulationsRequest {
            ids: vec!["geoId/07".to_string(), "geoId/06".to_string(), "geoId/08".to_string()],
            population_type: "Person".to_string(),
            pvs: vec![PropertyValue::new("gender", "Female")],
            ..Default::default()
        };
        let payload = store.get_populations(&ctx(), &request).await.unwrap();
        let out: Vec<PlacePopInfo> = serde_json::from_str(&payload).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].population, "dc/p/branch");
        assert_eq!(out[1].population, "dc/p/female");
        assert_eq!(out[2].dcid, "geoId/08");
        assert!(out[2].population.is_empty());
        assert!(payload.contains(r#"{"dcid":"geoId/08"}"#));
    }

    #[tokio::test]
    async fn test_observations_missing_ids_are_present() {
        let store = store_with(
            vec![(
                "d/b/dc/p/1^count^measuredValue^2019^^^^^",
                encoded_text("39512223"),
            )],
            vec![],
        );
        let request = ObservationsRequest {
            ids: vec!["dc/p/1".to_string(), "dc/p/2".to_string()],
            measured_property: "count".to_string(),
            stats_type: "measured_value".to_string(),
            observation_date: "2019".to_string(),
            ..Default::default()
        };
        let payload = store.get_observations(&ctx(), &request).await.unwrap();
        let out: Vec<PopObs> = serde_json::from_str(&payload).unwrap();
        assert_eq!(out[0].observation, "39512223");
        assert_eq!(out[1].dcid, "dc/p/2");
        assert!(out[1].observation.is_empty());
    }
}
