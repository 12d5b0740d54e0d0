use std::fmt;

use serde::{Deserialize, Serialize};

/// A WGS-84 coordinate. Every coordinate in the domain data uses this frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiLocation {
    pub coords: Coordinate,
    pub image: String,
}

/// A point of interest (a plant) with one or more physical locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub name: String,
    #[serde(rename = "latin")]
    pub latin_name: String,
    pub tag: String,
    pub description: String,
    pub locations: Vec<PoiLocation>,
}

/// Identifies one location of one POI, and therefore one marker on the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerKey {
    pub poi_id: String,
    pub location_index: usize,
}

impl MarkerKey {
    pub fn new(poi_id: impl Into<String>, location_index: usize) -> Self {
        Self {
            poi_id: poi_id.into(),
            location_index,
        }
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.poi_id, self.location_index)
    }
}

/// A POI flattened with one of its locations. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiInstance {
    pub poi_id: String,
    pub location_index: usize,
    pub name: String,
    #[serde(rename = "latin")]
    pub latin_name: String,
    pub tag: String,
    pub description: String,
    pub coords: Coordinate,
    pub image: String,
}

impl PoiInstance {
    pub fn key(&self) -> MarkerKey {
        MarkerKey::new(self.poi_id.clone(), self.location_index)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Walk,
    Bike,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    #[serde(default)]
    pub mode: TravelMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Route geometry in WGS-84.
    pub path: Vec<Coordinate>,
    /// The same geometry in the basemap's frame, ready to draw.
    pub display_path: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_min: u32,
    /// True when the numbers come from the straight-line estimate.
    pub estimated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}
