use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    geodesy::haversine_m,
    models::{Coordinate, TravelMode},
};

/// Speeds and calibrated detour factors for the straight-line estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelConfig {
    pub walk_speed_m_per_min: f64,
    pub bike_speed_m_per_min: f64,
    /// Multiplies the straight-line distance into an approximate network distance.
    pub walk_route_factor: f64,
    pub bike_route_factor: f64,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            walk_speed_m_per_min: 80.0,
            bike_speed_m_per_min: 250.0,
            walk_route_factor: 0.399_123_845_196_696_8,
            bike_route_factor: 1.247_262_016_239_677_5,
        }
    }
}

impl TravelConfig {
    pub fn speed_m_per_min(&self, mode: TravelMode) -> f64 {
        match mode {
            TravelMode::Walk => self.walk_speed_m_per_min,
            TravelMode::Bike => self.bike_speed_m_per_min,
        }
    }

    pub fn route_factor(&self, mode: TravelMode) -> f64 {
        match mode {
            TravelMode::Walk => self.walk_route_factor,
            TravelMode::Bike => self.bike_route_factor,
        }
    }

    /// Whole minutes needed to cover `distance_m`, never less than one.
    pub fn minutes_for(&self, distance_m: f64, mode: TravelMode) -> u32 {
        let speed = self.speed_m_per_min(mode);
        if speed <= 0.0 || !distance_m.is_finite() {
            return 1;
        }
        ((distance_m / speed).ceil() as u32).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TravelEstimate {
    pub distance_m: f64,
    pub duration_min: u32,
    /// Derived from the straight line rather than a routed path.
    pub estimated: bool,
}

impl TravelEstimate {
    pub fn routed(config: &TravelConfig, distance_m: f64, mode: TravelMode) -> Self {
        Self {
            distance_m,
            duration_min: config.minutes_for(distance_m, mode),
            estimated: false,
        }
    }

    pub fn straight_line(
        config: &TravelConfig,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Self {
        let distance_m = haversine_m(origin, destination) * config.route_factor(mode);
        Self {
            distance_m,
            duration_min: config.minutes_for(distance_m, mode),
            estimated: true,
        }
    }
}

impl fmt::Display for TravelEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.distance_m >= 1_000.0 {
            write!(f, "{:.1} km", self.distance_m / 1_000.0)?;
        } else {
            write!(f, "{:.0} m", self.distance_m)?;
        }
        write!(f, ", {} min", self.duration_min)?;
        if self.estimated {
            write!(f, " (estimated)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_round_up_and_never_hit_zero() {
        let config = TravelConfig::default();
        assert_eq!(config.minutes_for(0.0, TravelMode::Walk), 1);
        assert_eq!(config.minutes_for(80.0, TravelMode::Walk), 1);
        assert_eq!(config.minutes_for(81.0, TravelMode::Walk), 2);
        assert_eq!(config.minutes_for(1_000.0, TravelMode::Bike), 4);
    }

    #[test]
    fn straight_line_estimate_is_marked() {
        let config = TravelConfig::default();
        let origin = Coordinate::new(30.29517, 120.08215);
        let destination = Coordinate::new(30.3095, 120.0817);
        let estimate = TravelEstimate::straight_line(&config, origin, destination, TravelMode::Walk);
        assert!(estimate.estimated);
        let expected = haversine_m(origin, destination) * config.walk_route_factor;
        assert!((estimate.distance_m - expected).abs() < 1e-9);
        assert!(estimate.to_string().ends_with("(estimated)"));
    }

    #[test]
    fn routed_estimate_is_not_marked() {
        let estimate = TravelEstimate::routed(&TravelConfig::default(), 1_300.0, TravelMode::Walk);
        assert!(!estimate.estimated);
        assert_eq!(estimate.duration_min, 17);
        assert_eq!(estimate.to_string(), "1.3 km, 17 min");
    }

    #[test]
    fn bike_uses_its_own_factor() {
        let config = TravelConfig::default();
        let origin = Coordinate::new(30.29517, 120.08215);
        let destination = Coordinate::new(30.3095, 120.0817);
        let walk = TravelEstimate::straight_line(&config, origin, destination, TravelMode::Walk);
        let bike = TravelEstimate::straight_line(&config, origin, destination, TravelMode::Bike);
        assert!(bike.distance_m > walk.distance_m);
    }
}
