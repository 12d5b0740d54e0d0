pub mod adapter;
pub mod clustering;
pub mod config;
pub mod error;
pub mod estimate;
pub mod geodesy;
pub mod geolocation;
pub mod markers;
pub mod models;
pub mod navigation;
pub mod poi_store;
pub mod route_overlay;
pub mod routing;
pub mod status;
pub mod surface;
pub mod viewport;

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::adapter::MapAdapter;
use crate::clustering::RenderPlan;
use crate::config::MapSettings;
use crate::estimate::TravelEstimate;
use crate::geodesy::CoordinateFrame;
use crate::models::{ApiError, Coordinate, Poi, PoiInstance, RouteRequest, RouteResponse, TravelMode};
use crate::poi_store::PoiStore;
use crate::routing::{Deadline, RouteProvider, RouteQuery};
use crate::surface::HeadlessSurface;
use crate::viewport::Viewport;

/// Routes are cached by endpoints rounded to about 10 cm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteCacheKey {
    origin: (i64, i64),
    destination: (i64, i64),
    mode: TravelMode,
}

impl RouteCacheKey {
    pub fn new(req: &RouteRequest) -> Self {
        let q = |c: Coordinate| ((c.lat * 1e6).round() as i64, (c.lon * 1e6).round() as i64);
        Self {
            origin: q(req.origin),
            destination: q(req.destination),
            mode: req.mode,
        }
    }
}

pub struct AppState<P> {
    pub store: Arc<PoiStore>,
    pub router: Arc<P>,
    pub settings: Arc<MapSettings>,
    pub route_cache: Arc<Mutex<LruCache<RouteCacheKey, RouteResponse>>>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            router: self.router.clone(),
            settings: self.settings.clone(),
            route_cache: self.route_cache.clone(),
        }
    }
}

impl<P> AppState<P> {
    pub fn new(store: PoiStore, router: P, settings: MapSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.route_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Arc::new(store),
            router: Arc::new(router),
            settings: Arc::new(settings),
            route_cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn frame(&self) -> CoordinateFrame {
        self.settings.provider.frame()
    }
}

pub fn create_router<P: RouteProvider + 'static>(state: AppState<P>) -> Router {
    Router::new()
        .route("/api/pois", get(list_pois::<P>))
        .route("/api/pois/:id", get(get_poi::<P>))
        .route("/api/instances", get(list_instances::<P>))
        .route("/api/cards", get(list_cards::<P>))
        .route("/api/clusters", get(clusters_handler::<P>))
        .route("/api/route", post(route_handler::<P>))
        .with_state(state)
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            message: message.into(),
        }),
    )
}

async fn list_pois<P>(State(state): State<AppState<P>>) -> Json<Vec<Poi>> {
    Json(state.store.list_all().to_vec())
}

async fn get_poi<P>(State(state): State<AppState<P>>, Path(id): Path<String>) -> ApiResult<Poi> {
    state
        .store
        .get_by_id(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown POI {id}")))
}

/// An instance with its "position N of M" caption.
#[derive(Debug, Clone, Serialize)]
pub struct LabelledInstance {
    #[serde(flatten)]
    pub instance: PoiInstance,
    pub label: String,
}

fn labelled(store: &PoiStore, instances: Vec<PoiInstance>) -> Vec<LabelledInstance> {
    instances
        .into_iter()
        .filter_map(|instance| {
            let label = store.location_label(&instance.key())?;
            Some(LabelledInstance { instance, label })
        })
        .collect()
}

async fn list_instances<P>(State(state): State<AppState<P>>) -> Json<Vec<LabelledInstance>> {
    Json(labelled(&state.store, state.store.flatten_to_instances()))
}

/// One entry per POI for the list view, at its first location.
async fn list_cards<P>(State(state): State<AppState<P>>) -> Json<Vec<LabelledInstance>> {
    Json(labelled(&state.store, state.store.representatives()))
}

#[derive(Debug, Deserialize)]
pub struct ClusterParams {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub zoom: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// Render plan for a camera, computed on a throwaway headless map.
async fn clusters_handler<P>(
    State(state): State<AppState<P>>,
    Query(params): Query<ClusterParams>,
) -> ApiResult<RenderPlan> {
    let settings = state.settings.as_ref();
    let center = Coordinate::new(
        params.lat.unwrap_or(settings.center.lat),
        params.lon.unwrap_or(settings.center.lon),
    );
    let zoom = params.zoom.unwrap_or(settings.zoom);
    let width = params.width.unwrap_or(800.0);
    let height = params.height.unwrap_or(600.0);

    let finite = [center.lat, center.lon, zoom, width, height]
        .iter()
        .all(|v| v.is_finite());
    if !finite || width <= 0.0 || height <= 0.0 {
        return Err(api_error(StatusCode::BAD_REQUEST, "invalid camera parameters"));
    }

    let viewport = Viewport::new(state.frame().to_basemap(center), zoom, width, height)
        .with_zoom_limits(settings.min_zoom, settings.max_zoom);
    let surface = HeadlessSurface::new(settings.provider, viewport);
    let (mut map, _events) = MapAdapter::new(surface, settings);
    map.begin_loading();
    map.mark_ready(&state.store);
    Ok(Json(map.render_plan().clone()))
}

/// Route between two points. Falls back to the straight-line estimate when
/// the routing service fails; only routed answers are cached.
async fn route_handler<P: RouteProvider>(
    State(state): State<AppState<P>>,
    Json(req): Json<RouteRequest>,
) -> ApiResult<RouteResponse> {
    let finite = [req.origin, req.destination]
        .iter()
        .all(|c| c.lat.is_finite() && c.lon.is_finite());
    if !finite {
        return Err(api_error(StatusCode::BAD_REQUEST, "coordinates must be finite"));
    }

    let key = RouteCacheKey::new(&req);
    if let Some(hit) = cache_lookup(&state, &key) {
        tracing::debug!("route cache hit");
        return Ok(Json(hit));
    }

    let frame = state.frame();
    let travel = &state.settings.travel;
    let query = RouteQuery {
        origin: req.origin,
        destination: req.destination,
        mode: req.mode,
    };
    let provider = Deadline::new(state.router.as_ref(), state.settings.route_timeout());
    let response = match provider.fetch_route(query).await {
        Ok(geometry) => {
            let estimate = TravelEstimate::routed(travel, geometry.distance_m, req.mode);
            let response = build_response(frame, geometry.path, estimate);
            cache_store(&state, key, response.clone());
            response
        }
        Err(err) => {
            tracing::warn!("routing failed ({err}), answering with straight-line estimate");
            let estimate =
                TravelEstimate::straight_line(travel, req.origin, req.destination, req.mode);
            build_response(frame, vec![req.origin, req.destination], estimate)
        }
    };
    Ok(Json(response))
}

fn build_response(frame: CoordinateFrame, path: Vec<Coordinate>, estimate: TravelEstimate) -> RouteResponse {
    let display_path = path
        .iter()
        .map(|&c| {
            let p = frame.to_basemap(c);
            Coordinate::new(p.lat, p.lon)
        })
        .collect();
    RouteResponse {
        path,
        display_path,
        distance_m: estimate.distance_m,
        duration_min: estimate.duration_min,
        estimated: estimate.estimated,
    }
}

fn cache_lookup<P>(state: &AppState<P>, key: &RouteCacheKey) -> Option<RouteResponse> {
    let mut cache = state.route_cache.lock().ok()?;
    cache.get(key).cloned()
}

fn cache_store<P>(state: &AppState<P>, key: RouteCacheKey, response: RouteResponse) {
    match state.route_cache.lock() {
        Ok(mut cache) => {
            cache.put(key, response);
        }
        Err(_) => tracing::warn!("route cache poisoned, skipping insert"),
    }
}
