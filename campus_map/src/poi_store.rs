use std::{
    collections::HashMap,
    fs::File,
    io::{self, Read},
    path::Path,
};

use crate::models::{MarkerKey, Poi, PoiInstance};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read POI file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid POI definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("POI {0} has no locations")]
    NoLocations(String),
    #[error("POI id {0} appears more than once")]
    DuplicateId(String),
}

/// Read-only view over the static POI list, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct PoiStore {
    pois: Vec<Poi>,
    by_id: HashMap<String, usize>,
}

impl PoiStore {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, StoreError> {
        let pois: Vec<Poi> = serde_json::from_reader(reader)?;
        Self::from_pois(pois)
    }

    pub fn from_pois(pois: Vec<Poi>) -> Result<Self, StoreError> {
        let mut by_id = HashMap::with_capacity(pois.len());
        for (idx, poi) in pois.iter().enumerate() {
            if poi.locations.is_empty() {
                return Err(StoreError::NoLocations(poi.id.clone()));
            }
            if by_id.insert(poi.id.clone(), idx).is_some() {
                return Err(StoreError::DuplicateId(poi.id.clone()));
            }
        }
        tracing::debug!("POI store holds {} entries", pois.len());
        Ok(Self { pois, by_id })
    }

    pub fn list_all(&self) -> &[Poi] {
        &self.pois
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    /// `None` for unknown ids. A stale UI reference is expected during
    /// transitions, so callers treat this as "ignore".
    pub fn get_by_id(&self, id: &str) -> Option<&Poi> {
        self.by_id.get(id).map(|&idx| &self.pois[idx])
    }

    /// One instance per (POI, location), in POI order then location order.
    pub fn flatten_to_instances(&self) -> Vec<PoiInstance> {
        self.pois
            .iter()
            .flat_map(|poi| (0..poi.locations.len()).map(move |idx| make_instance(poi, idx)))
            .collect()
    }

    pub fn instance(&self, key: &MarkerKey) -> Option<PoiInstance> {
        let poi = self.get_by_id(&key.poi_id)?;
        (key.location_index < poi.locations.len()).then(|| make_instance(poi, key.location_index))
    }

    /// The first location of every POI, one entry per POI (list cards).
    pub fn representatives(&self) -> Vec<PoiInstance> {
        self.pois.iter().map(|poi| make_instance(poi, 0)).collect()
    }

    /// "position N of M", 1-based.
    pub fn location_label(&self, key: &MarkerKey) -> Option<String> {
        let poi = self.get_by_id(&key.poi_id)?;
        let total = poi.locations.len();
        (key.location_index < total)
            .then(|| format!("position {} of {}", key.location_index + 1, total))
    }
}

fn make_instance(poi: &Poi, location_index: usize) -> PoiInstance {
    let location = &poi.locations[location_index];
    PoiInstance {
        poi_id: poi.id.clone(),
        location_index,
        name: poi.name.clone(),
        latin_name: poi.latin_name.clone(),
        tag: poi.tag.clone(),
        description: poi.description.clone(),
        coords: location.coords,
        image: location.image.clone(),
    }
}

/// Marker caption: the bare name, or `name-N` when the POI grows in
/// several places.
pub fn display_name(name: &str, location_index: usize, location_count: usize) -> String {
    if location_count > 1 {
        format!("{name}-{}", location_index + 1)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinate, PoiLocation};

    const SAMPLE_POIS: &str = include_str!("../data/plants.json");

    fn poi(id: &str, coords: &[(f64, f64)]) -> Poi {
        Poi {
            id: id.into(),
            name: format!("{id} name"),
            latin_name: format!("{id} latin"),
            tag: "tag".into(),
            description: String::new(),
            locations: coords
                .iter()
                .enumerate()
                .map(|(idx, &(lat, lon))| PoiLocation {
                    coords: Coordinate::new(lat, lon),
                    image: format!("/plant-images/{id}-{idx}.jpg"),
                })
                .collect(),
        }
    }

    #[test]
    fn single_location_flattens_to_index_zero() {
        let store = PoiStore::from_pois(vec![poi("p1", &[(30.3095, 120.0817)])]).unwrap();
        let instances = store.flatten_to_instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].poi_id, "p1");
        assert_eq!(instances[0].location_index, 0);
        assert_eq!(instances[0].coords, Coordinate::new(30.3095, 120.0817));
    }

    #[test]
    fn flatten_keeps_poi_then_location_order() {
        let store = PoiStore::from_pois(vec![
            poi("b", &[(30.30, 120.08), (30.31, 120.09)]),
            poi("a", &[(30.32, 120.07)]),
        ])
        .unwrap();
        let keys: Vec<String> = store
            .flatten_to_instances()
            .iter()
            .map(|i| i.key().to_string())
            .collect();
        assert_eq!(keys, ["b-0", "b-1", "a-0"]);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = PoiStore::from_pois(vec![poi("p1", &[(30.3, 120.08)])]).unwrap();
        assert!(store.get_by_id("missing").is_none());
        assert!(store.instance(&MarkerKey::new("missing", 0)).is_none());
        assert!(store.instance(&MarkerKey::new("p1", 1)).is_none());
        assert!(store.location_label(&MarkerKey::new("p1", 4)).is_none());
    }

    #[test]
    fn rejects_empty_locations_and_duplicates() {
        let err = PoiStore::from_pois(vec![poi("p1", &[])]).unwrap_err();
        assert!(matches!(err, StoreError::NoLocations(id) if id == "p1"));

        let err = PoiStore::from_pois(vec![
            poi("p1", &[(30.3, 120.08)]),
            poi("p1", &[(30.31, 120.08)]),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == "p1"));
    }

    #[test]
    fn labels_and_display_names() {
        let store = PoiStore::from_pois(vec![poi("p2", &[(30.30, 120.08), (30.31, 120.09)])]).unwrap();
        assert_eq!(
            store.location_label(&MarkerKey::new("p2", 1)).as_deref(),
            Some("position 2 of 2")
        );
        assert_eq!(display_name("Maple", 1, 2), "Maple-2");
        assert_eq!(display_name("Maple", 0, 1), "Maple");
    }

    #[test]
    fn representatives_use_first_location() {
        let store = PoiStore::from_pois(vec![poi("p2", &[(30.30, 120.08), (30.31, 120.09)])]).unwrap();
        let reps = store.representatives();
        assert_eq!(reps.len(), 1);
        assert_eq!(reps[0].location_index, 0);
        assert_eq!(reps[0].image, "/plant-images/p2-0.jpg");
    }

    #[test]
    fn bundled_dataset_loads() {
        let store = PoiStore::from_reader(SAMPLE_POIS.as_bytes()).expect("sample POIs");
        assert!(!store.is_empty());
        assert!(store.get_by_id("p1").is_some());
        assert!(store.flatten_to_instances().len() >= store.len());
    }
}
