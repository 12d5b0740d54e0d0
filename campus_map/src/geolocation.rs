use std::{future::Future, time::Duration};

use thiserror::Error;

use crate::models::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    Unavailable,
    #[error("location request timed out")]
    Timeout,
}

impl GeolocationError {
    /// Short, non-blocking notice shown while the fallback origin is used.
    pub fn user_message(self) -> &'static str {
        match self {
            GeolocationError::PermissionDenied => {
                "Location access was denied, routing from the campus gate"
            }
            GeolocationError::Unavailable => {
                "Your position is unavailable, routing from the campus gate"
            }
            GeolocationError::Timeout => "Locating took too long, routing from the campus gate",
        }
    }
}

/// Device positioning, e.g. the browser geolocation API.
pub trait LocationSource: Send + Sync {
    fn current_position(&self) -> impl Future<Output = Result<Coordinate, GeolocationError>> + Send;
}

/// A source with a fixed answer, for hosts without a positioning device.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Result<Coordinate, GeolocationError>);

impl LocationSource for FixedLocation {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginSource {
    Device,
    Fallback(GeolocationError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginFix {
    pub coords: Coordinate,
    pub source: OriginSource,
}

impl OriginFix {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, OriginSource::Fallback(_))
    }
}

/// Ask `source` for a position, giving up after `timeout`. Any failure
/// resolves to `fallback`; the cause is kept so callers can tell the user.
pub async fn resolve_origin<L: LocationSource>(
    source: &L,
    timeout: Duration,
    fallback: Coordinate,
) -> OriginFix {
    let outcome = match tokio::time::timeout(timeout, source.current_position()).await {
        Ok(result) => result,
        Err(_) => Err(GeolocationError::Timeout),
    };
    match outcome {
        Ok(coords) => OriginFix {
            coords,
            source: OriginSource::Device,
        },
        Err(err) => {
            tracing::warn!("geolocation failed ({err}), using fallback origin");
            OriginFix {
                coords: fallback,
                source: OriginSource::Fallback(err),
            }
        }
    }
}
