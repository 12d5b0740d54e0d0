use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    clustering::ClusterConfig,
    estimate::TravelConfig,
    models::Coordinate,
    surface::{BasemapLayer, BasemapProvider},
};

pub const CONFIG_ENV: &str = "CAMPUS_MAP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Runtime settings for the map core and the HTTP service. Every field has a
/// default, so a settings file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    pub center: Coordinate,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub provider: BasemapProvider,
    pub layer: BasemapLayer,
    pub cluster: ClusterConfig,
    pub travel: TravelConfig,
    /// Route origin when the device position cannot be obtained (south gate).
    pub fallback_origin: Coordinate,
    pub geolocation_timeout_ms: u64,
    pub route_timeout_ms: u64,
    pub resize_delay_ms: u64,
    pub status_ttl_ms: u64,
    pub fit_padding_px: f64,
    pub osrm_url: String,
    pub route_cache_size: usize,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            center: Coordinate::new(30.3081, 120.0827),
            zoom: 15.0,
            min_zoom: 10.0,
            max_zoom: 18.0,
            provider: BasemapProvider::Amap,
            layer: BasemapLayer::Light,
            cluster: ClusterConfig::default(),
            travel: TravelConfig::default(),
            fallback_origin: Coordinate::new(30.29517, 120.08215),
            geolocation_timeout_ms: 8_000,
            route_timeout_ms: 10_000,
            resize_delay_ms: 300,
            status_ttl_ms: 4_000,
            fit_padding_px: 100.0,
            osrm_url: "https://router.project-osrm.org".to_string(),
            route_cache_size: 64,
        }
    }
}

impl MapSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        tracing::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Settings from the explicit path, else from `CAMPUS_MAP_CONFIG`, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => {
                tracing::debug!("no settings file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid {
                field: "min_zoom",
                reason: format!("{} exceeds max_zoom {}", self.min_zoom, self.max_zoom),
            });
        }
        if self.cluster.radius_px <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "cluster.radius_px",
                reason: "must be positive".into(),
            });
        }
        if self.travel.walk_speed_m_per_min <= 0.0 || self.travel.bike_speed_m_per_min <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "travel",
                reason: "speeds must be positive".into(),
            });
        }
        if self.route_cache_size == 0 {
            return Err(ConfigError::Invalid {
                field: "route_cache_size",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation_timeout_ms)
    }

    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }

    pub fn resize_delay(&self) -> Duration {
        Duration::from_millis(self.resize_delay_ms)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_millis(self.status_ttl_ms)
    }
}
