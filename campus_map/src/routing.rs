use std::{future::Future, time::Duration};

use serde::Deserialize;

use crate::{
    error::RoutingError,
    models::{Coordinate, TravelMode},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteQuery {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub mode: TravelMode,
}

/// Route geometry as returned by a provider, WGS-84.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeometry {
    pub path: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Anything that can turn two points into a path.
pub trait RouteProvider: Send + Sync {
    fn fetch_route(
        &self,
        query: RouteQuery,
    ) -> impl Future<Output = Result<RouteGeometry, RoutingError>> + Send;
}

/// Puts a deadline on any provider. An answer that does not arrive within
/// `timeout` is a `RoutingError::Timeout`.
#[derive(Debug)]
pub struct Deadline<'a, P> {
    provider: &'a P,
    timeout: Duration,
}

impl<'a, P: RouteProvider> Deadline<'a, P> {
    pub fn new(provider: &'a P, timeout: Duration) -> Self {
        Self { provider, timeout }
    }
}

impl<P: RouteProvider> RouteProvider for Deadline<'_, P> {
    async fn fetch_route(&self, query: RouteQuery) -> Result<RouteGeometry, RoutingError> {
        match tokio::time::timeout(self.timeout, self.provider.fetch_route(query)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("routing gave no answer within {:?}", self.timeout);
                Err(RoutingError::Timeout)
            }
        }
    }
}

/// Client for an OSRM `route` service.
#[derive(Debug, Clone)]
pub struct OsrmRouter {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmRouter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn route_url(&self, query: &RouteQuery) -> String {
        let profile = match query.mode {
            TravelMode::Walk => "foot",
            TravelMode::Bike => "bike",
        };
        format!(
            "{}/route/v1/{profile}/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url,
            query.origin.lon,
            query.origin.lat,
            query.destination.lon,
            query.destination.lat,
        )
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[lon, lat]`.
    coordinates: Vec<[f64; 2]>,
}

fn parse_osrm(body: OsrmResponse) -> Result<RouteGeometry, RoutingError> {
    match body.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(RoutingError::NoRoute),
        other => {
            return Err(RoutingError::InvalidResponse(
                body.message.unwrap_or_else(|| other.to_string()),
            ));
        }
    }
    let route = body.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;
    let path: Vec<Coordinate> = route
        .geometry
        .coordinates
        .into_iter()
        .map(|[lon, lat]| Coordinate::new(lat, lon))
        .collect();
    if path.len() < 2 {
        return Err(RoutingError::InvalidResponse(format!(
            "route geometry has {} vertices",
            path.len()
        )));
    }
    Ok(RouteGeometry {
        path,
        distance_m: route.distance,
        duration_s: route.duration,
    })
}

impl RouteProvider for OsrmRouter {
    async fn fetch_route(&self, query: RouteQuery) -> Result<RouteGeometry, RoutingError> {
        let url = self.route_url(&query);
        tracing::debug!("requesting route {url}");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(RoutingError::Network(format!("routing service returned {status}")));
        }
        // OSRM reports NoRoute with a 400 and a JSON body, so 4xx bodies are parsed too.
        let body: OsrmResponse = response.json().await?;
        parse_osrm(body)
    }
}
