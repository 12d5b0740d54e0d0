use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::models::Coordinate;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

// Krasovsky 1940 ellipsoid, as used by the GCJ-02 offset.
const KRASOVSKY_A: f64 = 6_378_245.0;
const KRASOVSKY_EE: f64 = 0.006_693_421_622_965_943_23;

const CHINA_MIN_LON: f64 = 72.004;
const CHINA_MAX_LON: f64 = 137.8347;
const CHINA_MIN_LAT: f64 = 0.8293;
const CHINA_MAX_LAT: f64 = 55.8271;

const INVERSE_ITERATIONS: usize = 8;
const INVERSE_TOLERANCE_DEG: f64 = 1e-10;

/// A coordinate expressed in the active basemap's frame.
///
/// Only the map surface consumes these. Keeping them apart from [`Coordinate`]
/// means a point can be converted exactly once, on its way to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasemapPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Geodetic reference frame used by a basemap's tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateFrame {
    Wgs84,
    #[default]
    Gcj02,
}

impl CoordinateFrame {
    pub fn to_basemap(self, coord: Coordinate) -> BasemapPoint {
        let projected = match self {
            CoordinateFrame::Wgs84 => coord,
            CoordinateFrame::Gcj02 => wgs84_to_gcj02(coord),
        };
        BasemapPoint {
            lat: projected.lat,
            lon: projected.lon,
        }
    }

    pub fn from_basemap(self, point: BasemapPoint) -> Coordinate {
        let raw = Coordinate::new(point.lat, point.lon);
        match self {
            CoordinateFrame::Wgs84 => raw,
            CoordinateFrame::Gcj02 => gcj02_to_wgs84(raw),
        }
    }
}

/// True when the coordinate lies outside the mainland-China box where the
/// GCJ-02 offset applies.
pub fn out_of_china(coord: Coordinate) -> bool {
    !(CHINA_MIN_LON..=CHINA_MAX_LON).contains(&coord.lon)
        || !(CHINA_MIN_LAT..=CHINA_MAX_LAT).contains(&coord.lat)
}

/// Convert WGS-84 to GCJ-02 ("Mars coordinates").
///
/// Outside mainland China the input is returned unchanged: the offset
/// polynomial is only meaningful inside the box and produces large bogus
/// displacements elsewhere.
pub fn wgs84_to_gcj02(coord: Coordinate) -> Coordinate {
    if out_of_china(coord) {
        return coord;
    }
    let (dlat, dlon) = offset(coord);
    Coordinate::new(coord.lat + dlat, coord.lon + dlon)
}

/// Convert GCJ-02 back to WGS-84.
///
/// The forward transform has no closed-form inverse. This refines a guess
/// by fixed-point iteration until the forward image matches the input; the
/// residual is far below a centimetre after a handful of steps.
pub fn gcj02_to_wgs84(coord: Coordinate) -> Coordinate {
    if out_of_china(coord) {
        return coord;
    }
    let mut guess = coord;
    for _ in 0..INVERSE_ITERATIONS {
        let image = wgs84_to_gcj02(guess);
        let dlat = image.lat - coord.lat;
        let dlon = image.lon - coord.lon;
        guess = Coordinate::new(guess.lat - dlat, guess.lon - dlon);
        if dlat.abs() < INVERSE_TOLERANCE_DEG && dlon.abs() < INVERSE_TOLERANCE_DEG {
            break;
        }
    }
    guess
}

fn offset(coord: Coordinate) -> (f64, f64) {
    let x = coord.lon - 105.0;
    let y = coord.lat - 35.0;
    let mut dlat = transform_lat(x, y);
    let mut dlon = transform_lon(x, y);

    let rad_lat = coord.lat.to_radians();
    let magic = 1.0 - KRASOVSKY_EE * rad_lat.sin().powi(2);
    let sqrt_magic = magic.sqrt();

    dlat = (dlat * 180.0) / ((KRASOVSKY_A * (1.0 - KRASOVSKY_EE)) / (magic * sqrt_magic) * PI);
    dlon = (dlon * 180.0) / (KRASOVSKY_A / sqrt_magic * rad_lat.cos() * PI);
    (dlat, dlon)
}

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lon(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}

pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

pub fn path_length_m(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Zijingang campus box, WGS-84.
    const CAMPUS_SW: Coordinate = Coordinate::new(30.2950, 120.0700);
    const CAMPUS_NE: Coordinate = Coordinate::new(30.3200, 120.0950);

    #[test]
    fn identity_far_outside_china() {
        for coord in [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(51.5, -0.1),
            Coordinate::new(-33.86, 151.21),
            Coordinate::new(40.71, -74.0),
        ] {
            assert_eq!(wgs84_to_gcj02(coord), coord);
            assert_eq!(gcj02_to_wgs84(coord), coord);
        }
    }

    #[test]
    fn campus_offset_is_a_few_hundred_metres() {
        let wgs = Coordinate::new(30.3081, 120.0827);
        let gcj = wgs84_to_gcj02(wgs);
        let shift = haversine_m(wgs, gcj);
        assert!(shift > 100.0 && shift < 1_000.0, "unexpected shift {shift} m");
        // the Hangzhou offset points east
        assert!(gcj.lon > wgs.lon);
    }

    #[test]
    fn round_trip_on_campus_grid_stays_under_two_metres() {
        let steps = 10;
        for i in 0..=steps {
            for j in 0..=steps {
                let lat = CAMPUS_SW.lat + (CAMPUS_NE.lat - CAMPUS_SW.lat) * i as f64 / steps as f64;
                let lon = CAMPUS_SW.lon + (CAMPUS_NE.lon - CAMPUS_SW.lon) * j as f64 / steps as f64;
                let coord = Coordinate::new(lat, lon);
                let back = gcj02_to_wgs84(wgs84_to_gcj02(coord));
                assert!(haversine_m(coord, back) < 2.0);
            }
        }
    }

    #[test]
    fn frames_convert_only_once() {
        let wgs = Coordinate::new(30.309452, 120.078723);
        let native = CoordinateFrame::Gcj02.to_basemap(wgs);
        assert!(haversine_m(wgs, Coordinate::new(native.lat, native.lon)) > 100.0);
        let back = CoordinateFrame::Gcj02.from_basemap(native);
        assert!(haversine_m(wgs, back) < 0.01);

        let plain = CoordinateFrame::Wgs84.to_basemap(wgs);
        assert_eq!((plain.lat, plain.lon), (wgs.lat, wgs.lon));
    }

    #[test]
    fn haversine_same_point_is_zero() {
        let point = Coordinate::new(30.3, 120.08);
        assert_eq!(haversine_m(point, point), 0.0);
    }

    #[test]
    fn path_length_of_short_paths_is_zero() {
        assert_eq!(path_length_m(&[]), 0.0);
        assert_eq!(path_length_m(&[Coordinate::new(30.3, 120.08)]), 0.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn campus_coord() -> impl Strategy<Value = Coordinate> {
            (CAMPUS_SW.lat..=CAMPUS_NE.lat, CAMPUS_SW.lon..=CAMPUS_NE.lon)
                .prop_map(|(lat, lon)| Coordinate::new(lat, lon))
        }

        fn china_coord() -> impl Strategy<Value = Coordinate> {
            (18.0..=53.0, 74.0..=134.0).prop_map(|(lat, lon)| Coordinate::new(lat, lon))
        }

        proptest! {
            #[test]
            fn prop_round_trip_on_campus(coord in campus_coord()) {
                let back = gcj02_to_wgs84(wgs84_to_gcj02(coord));
                prop_assert!(haversine_m(coord, back) < 2.0);
            }

            #[test]
            fn prop_offset_bounded_inside_china(coord in china_coord()) {
                let shift = haversine_m(coord, wgs84_to_gcj02(coord));
                prop_assert!(shift < 1_500.0);
            }

            #[test]
            fn prop_identity_in_southern_hemisphere(
                lat in -89.0..-1.0f64,
                lon in -179.0..179.0f64,
            ) {
                let coord = Coordinate::new(lat, lon);
                prop_assert_eq!(wgs84_to_gcj02(coord), coord);
            }

            #[test]
            fn prop_haversine_symmetric(a in china_coord(), b in china_coord()) {
                prop_assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-6);
            }
        }
    }
}
