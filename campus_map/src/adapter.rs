//! Rendering-agnostic map facade.
//!
//! [`MapAdapter`] is the only component that mutates a [`MapSurface`]. It owns
//! the marker registry and the last render plan, converts WGS-84 domain
//! coordinates into the surface's frame exactly once, and gates every
//! operation on the surface's readiness.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use geo_types::{Rect, coord};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    clustering::{self, ClusterConfig, ClusterInput, RenderPlan},
    config::MapSettings,
    geodesy::{BasemapPoint, CoordinateFrame},
    markers::{Marker, MarkerRegistry, SyncReport},
    models::{Coordinate, MarkerKey, PoiInstance},
    poi_store::{PoiStore, display_name},
    surface::{BasemapLayer, ClusterBadge, MapSurface},
};

pub const FOCUS_ZOOM: f64 = 17.0;
const CLICK_MIN_ZOOM: f64 = 15.0;
const CLICK_MAX_ZOOM: f64 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MapReadiness {
    Uninitialized,
    Loading,
    Ready,
}

/// Outward notifications, consumed by whatever hosts the map.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    MarkerClicked(MarkerKey),
    NavigateRequested {
        key: MarkerKey,
        destination: Coordinate,
        name: String,
    },
}

/// One row of an expanded cluster badge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterListItem {
    pub key: MarkerKey,
    pub label: String,
}

/// Zoom used when a marker is clicked: jump in to street level, then step
/// one level at a time up to a cap.
pub fn click_zoom(current: f64) -> f64 {
    if current < CLICK_MIN_ZOOM {
        CLICK_MIN_ZOOM
    } else {
        (current + 1.0).min(CLICK_MAX_ZOOM)
    }
}

pub struct MapAdapter<S: MapSurface> {
    surface: S,
    frame: CoordinateFrame,
    readiness: MapReadiness,
    registry: MarkerRegistry,
    cluster_config: ClusterConfig,
    layer: BasemapLayer,
    plan: RenderPlan,
    pending_view: Option<(Coordinate, f64)>,
    user_location: Option<Coordinate>,
    resize_delay: Duration,
    resize_requested_at: Option<Instant>,
    events: mpsc::UnboundedSender<MapEvent>,
}

impl<S: MapSurface> MapAdapter<S> {
    pub fn new(surface: S, settings: &MapSettings) -> (Self, mpsc::UnboundedReceiver<MapEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let frame = surface.frame();
        let adapter = Self {
            surface,
            frame,
            readiness: MapReadiness::Uninitialized,
            registry: MarkerRegistry::new(frame),
            cluster_config: settings.cluster,
            layer: settings.layer,
            plan: RenderPlan::default(),
            pending_view: None,
            user_location: None,
            resize_delay: settings.resize_delay(),
            resize_requested_at: None,
            events,
        };
        (adapter, rx)
    }

    pub fn readiness(&self) -> MapReadiness {
        self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == MapReadiness::Ready
    }

    pub fn frame(&self) -> CoordinateFrame {
        self.frame
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn render_plan(&self) -> &RenderPlan {
        &self.plan
    }

    pub fn user_location(&self) -> Option<Coordinate> {
        self.user_location
    }

    pub fn zoom(&self) -> f64 {
        self.surface.zoom()
    }

    /// Style and tiles requested.
    pub fn begin_loading(&mut self) {
        if self.readiness == MapReadiness::Uninitialized {
            self.readiness = MapReadiness::Loading;
            tracing::debug!("map loading");
        }
    }

    /// The surface finished loading. Runs once; later calls return false.
    pub fn mark_ready(&mut self, store: &PoiStore) -> bool {
        if self.readiness == MapReadiness::Ready {
            return false;
        }
        self.readiness = MapReadiness::Ready;
        self.surface.install_overlay_sources();
        self.surface.set_layer(self.layer);

        let instances = store.flatten_to_instances();
        self.apply_sync(&instances);

        if let Some((coords, zoom)) = self.pending_view.take() {
            self.surface.set_view(self.frame.to_basemap(coords), zoom);
        }
        if let Some(coords) = self.user_location {
            self.surface
                .set_user_location(Some(self.frame.to_basemap(coords)));
        }
        self.recluster();
        tracing::info!(
            "map ready with {} markers in {} groups",
            self.registry.len(),
            self.plan.clusters.len()
        );
        true
    }

    /// Remove every marker and overlay; the adapter can be loaded again.
    pub fn teardown(&mut self) {
        for id in self.registry.clear() {
            self.surface.remove_marker(id);
        }
        self.surface.show_badges(&[]);
        self.surface.set_route_line(&[]);
        self.surface.set_user_location(None);
        self.plan = RenderPlan::default();
        self.pending_view = None;
        self.resize_requested_at = None;
        self.readiness = MapReadiness::Uninitialized;
        tracing::info!("map torn down");
    }

    /// Move the camera. Before the map is ready the request is kept (latest
    /// wins) and applied on ready.
    pub fn set_view(&mut self, coords: Coordinate, zoom: f64) {
        if !self.is_ready() {
            tracing::debug!("map not ready, queueing view {coords:?} @ {zoom}");
            self.pending_view = Some((coords, zoom));
            return;
        }
        self.surface.fly_to(self.frame.to_basemap(coords), zoom);
        self.recluster();
    }

    /// Fit the camera to the box spanned by `a` and `b`, in any corner order.
    pub fn fit_bounds(&mut self, a: Coordinate, b: Coordinate, padding: f64) {
        if !self.is_ready() {
            tracing::debug!("map not ready, dropping fit_bounds");
            return;
        }
        let rect = Rect::new(coord! { x: a.lon, y: a.lat }, coord! { x: b.lon, y: b.lat });
        let sw = Coordinate::new(rect.min().y, rect.min().x);
        let ne = Coordinate::new(rect.max().y, rect.max().x);
        self.surface
            .fit_bounds(self.frame.to_basemap(sw), self.frame.to_basemap(ne), padding);
        self.recluster();
    }

    pub fn set_user_location(&mut self, coords: Coordinate) {
        self.user_location = Some(coords);
        if !self.is_ready() {
            tracing::debug!("map not ready, user location shown on ready");
            return;
        }
        self.surface
            .set_user_location(Some(self.frame.to_basemap(coords)));
    }

    /// Pan or zoom finished.
    pub fn on_view_changed(&mut self) {
        self.recluster();
    }

    /// The container changed size. Coalesced: the resize runs on the first
    /// `tick` at least `resize_delay` after the latest request.
    pub fn invalidate_size(&mut self, now: Instant) {
        if !self.is_ready() {
            tracing::debug!("map not ready, ignoring invalidate_size");
            return;
        }
        self.resize_requested_at = Some(now);
    }

    /// Drive time-based work: pending resize and marker animations.
    pub fn tick(&mut self, now: Instant) {
        if !self.is_ready() {
            return;
        }
        let resize_due = self
            .resize_requested_at
            .is_some_and(|requested| now.saturating_duration_since(requested) >= self.resize_delay);
        if resize_due {
            self.resize_requested_at = None;
            self.surface.resize();
            self.recluster();
        }
        self.apply_animations(now);
    }

    /// Reconcile markers with `instances` and recluster.
    pub fn sync_instances(&mut self, instances: &[PoiInstance]) -> Option<SyncReport> {
        if !self.is_ready() {
            tracing::debug!("map not ready, markers are created on ready");
            return None;
        }
        let report = self.apply_sync(instances);
        self.recluster();
        Some(report)
    }

    pub fn flash_marker(&mut self, key: &MarkerKey, now: Instant) -> bool {
        if !self.is_ready() {
            tracing::debug!("map not ready, ignoring flash for {key}");
            return false;
        }
        let started = self.registry.flash(key, now);
        if started {
            self.apply_animations(now);
        }
        started
    }

    /// A marker was clicked: single popup, zoom in, notify.
    pub fn click_marker(&mut self, key: &MarkerKey) -> bool {
        let Some(marker) = self.ready_marker(key) else {
            return false;
        };
        let position = marker.projected();
        self.open_popup(key);
        let zoom = click_zoom(self.surface.zoom());
        self.surface.fly_to(position, zoom);
        self.recluster();
        self.emit(MapEvent::MarkerClicked(key.clone()));
        true
    }

    /// "View location" from a list card: close zoom, popup and flash.
    pub fn focus_marker(&mut self, key: &MarkerKey, now: Instant) -> bool {
        let Some(marker) = self.ready_marker(key) else {
            return false;
        };
        let position = marker.projected();
        self.surface.set_view(position, FOCUS_ZOOM);
        self.recluster();
        self.open_popup(key);
        self.flash_marker(key, now)
    }

    /// Members of the aggregate cluster at `index` in the current plan.
    pub fn expand_cluster(&self, index: usize) -> Vec<ClusterListItem> {
        let Some(cluster) = self.plan.clusters.get(index).filter(|c| c.is_aggregate()) else {
            tracing::debug!("no cluster badge at index {index}");
            return Vec::new();
        };
        cluster
            .members
            .iter()
            .filter_map(|key| self.registry.get(key))
            .map(|marker| ClusterListItem {
                key: marker.key().clone(),
                label: marker.label().to_string(),
            })
            .collect()
    }

    /// Picking an entry of an expanded cluster behaves like clicking it.
    pub fn select_cluster_item(&mut self, key: &MarkerKey) -> bool {
        self.click_marker(key)
    }

    /// "Navigate" on a popup or card. The host runs the navigation flow.
    pub fn request_navigation(&self, key: &MarkerKey, store: &PoiStore) -> bool {
        let Some(instance) = store.instance(key) else {
            tracing::debug!("navigation requested for unknown marker {key}");
            return false;
        };
        let count = store
            .get_by_id(&key.poi_id)
            .map(|poi| poi.locations.len())
            .unwrap_or(1);
        self.emit(MapEvent::NavigateRequested {
            key: key.clone(),
            destination: instance.coords,
            name: display_name(&instance.name, key.location_index, count),
        });
        true
    }

    /// Draw a route line already expressed in this surface's frame.
    pub fn show_route(&mut self, line: &[BasemapPoint]) {
        if !self.is_ready() {
            tracing::debug!("map not ready, dropping route line");
            return;
        }
        self.surface.set_route_line(line);
    }

    pub fn clear_route(&mut self) {
        if self.is_ready() {
            self.surface.set_route_line(&[]);
        }
    }

    pub fn set_layer(&mut self, layer: BasemapLayer) {
        self.layer = layer;
        if self.is_ready() {
            self.surface.set_layer(layer);
        }
    }

    pub fn layer(&self) -> BasemapLayer {
        self.layer
    }

    fn ready_marker(&self, key: &MarkerKey) -> Option<&Marker> {
        if !self.is_ready() {
            tracing::debug!("map not ready, ignoring interaction with {key}");
            return None;
        }
        let marker = self.registry.get(key);
        if marker.is_none() {
            tracing::debug!("no marker for {key}");
        }
        marker
    }

    fn open_popup(&mut self, key: &MarkerKey) {
        if let Some(closed) = self.registry.open_popup(key) {
            self.surface.set_popup(closed, false);
        }
        if let Some(marker) = self.registry.get(key) {
            self.surface.set_popup(marker.id(), true);
        }
    }

    fn apply_sync(&mut self, instances: &[PoiInstance]) -> SyncReport {
        let report = self.registry.sync(instances);
        for (_, id) in &report.removed {
            self.surface.remove_marker(*id);
        }
        for key in &report.created {
            if let Some(marker) = self.registry.get(key) {
                self.surface
                    .add_marker(marker.id(), marker.projected(), marker.label());
            }
        }
        report
    }

    fn apply_animations(&mut self, now: Instant) {
        for (id, scale) in self.registry.advance_animations(now) {
            self.surface.set_marker_scale(id, scale);
        }
    }

    /// Full clustering pass at the current camera.
    fn recluster(&mut self) {
        if !self.is_ready() {
            return;
        }
        let surface = &self.surface;
        self.registry.project_all(|point| surface.project(point));

        let inputs: Vec<ClusterInput> = self
            .registry
            .iter()
            .filter_map(|marker| {
                marker.screen().map(|screen| ClusterInput {
                    key: marker.key().clone(),
                    coords: marker.coords(),
                    screen,
                })
            })
            .collect();
        let plan = clustering::plan(&self.cluster_config, self.surface.zoom(), &inputs);

        let absorbed: HashSet<&MarkerKey> = plan
            .aggregates()
            .flat_map(|(_, cluster)| cluster.members.iter())
            .collect();
        let updates: Vec<(MarkerKey, bool)> = self
            .registry
            .iter()
            .map(|marker| (marker.key().clone(), !absorbed.contains(marker.key())))
            .collect();
        for (key, visible) in updates {
            if !self.registry.set_visible(&key, visible) {
                continue;
            }
            if let Some(marker) = self.registry.get(&key) {
                self.surface.set_marker_visible(marker.id(), visible);
            }
        }

        let badges: Vec<ClusterBadge> = plan
            .aggregates()
            .map(|(index, cluster)| ClusterBadge {
                index,
                center: self.frame.to_basemap(cluster.center),
                count: cluster.len(),
            })
            .collect();
        self.surface.show_badges(&badges);
        self.plan = plan;
    }

    fn emit(&self, event: MapEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("map event dropped, no listener");
        }
    }
}
