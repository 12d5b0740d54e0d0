use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    geodesy::{BasemapPoint, CoordinateFrame},
    markers::MarkerId,
    viewport::{ScreenPoint, Viewport},
};

/// Tile provider behind the map. Only its coordinate frame matters here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasemapProvider {
    /// AutoNavi tiles, GCJ-02.
    #[default]
    Amap,
    /// OpenStreetMap tiles, WGS-84.
    Osm,
}

impl BasemapProvider {
    pub fn frame(self) -> CoordinateFrame {
        match self {
            BasemapProvider::Amap => CoordinateFrame::Gcj02,
            BasemapProvider::Osm => CoordinateFrame::Wgs84,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasemapLayer {
    #[default]
    Light,
    Satellite,
}

/// A numbered cluster badge. `index` refers to the cluster in the current plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterBadge {
    pub index: usize,
    pub center: BasemapPoint,
    pub count: usize,
}

/// The rendering engine seam. Everything that crosses it is already in the
/// basemap frame; implementations never reproject.
pub trait MapSurface {
    fn frame(&self) -> CoordinateFrame;

    /// Route line and user-location sources, created once the style is loaded.
    fn install_overlay_sources(&mut self);

    fn add_marker(&mut self, id: MarkerId, position: BasemapPoint, label: &str);
    fn remove_marker(&mut self, id: MarkerId);
    fn set_marker_visible(&mut self, id: MarkerId, visible: bool);
    fn set_marker_scale(&mut self, id: MarkerId, scale: f64);
    fn set_popup(&mut self, id: MarkerId, open: bool);

    /// Replace every cluster badge.
    fn show_badges(&mut self, badges: &[ClusterBadge]);

    fn set_view(&mut self, center: BasemapPoint, zoom: f64);

    /// Animated variant of `set_view`; surfaces without animation jump.
    fn fly_to(&mut self, center: BasemapPoint, zoom: f64) {
        self.set_view(center, zoom);
    }

    fn fit_bounds(&mut self, sw: BasemapPoint, ne: BasemapPoint, padding: f64);

    /// Replace the route line; an empty slice clears it.
    fn set_route_line(&mut self, line: &[BasemapPoint]);

    fn set_user_location(&mut self, position: Option<BasemapPoint>);
    fn set_layer(&mut self, layer: BasemapLayer);

    /// Re-read the container size.
    fn resize(&mut self);

    fn zoom(&self) -> f64;
    fn center(&self) -> BasemapPoint;
    fn project(&self, point: BasemapPoint) -> ScreenPoint;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMarker {
    pub position: BasemapPoint,
    pub label: String,
    pub visible: bool,
    pub scale: f64,
    pub popup_open: bool,
}

/// In-memory surface over a Mercator [`Viewport`]. Used by the HTTP service
/// to compute render plans and by tests to observe what the adapter draws.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    provider: BasemapProvider,
    viewport: Viewport,
    container: (f64, f64),
    markers: HashMap<MarkerId, SurfaceMarker>,
    badges: Vec<ClusterBadge>,
    route_line: Vec<BasemapPoint>,
    user_location: Option<BasemapPoint>,
    layer: BasemapLayer,
    overlay_sources: bool,
    resizes: usize,
}

impl HeadlessSurface {
    pub fn new(provider: BasemapProvider, viewport: Viewport) -> Self {
        Self {
            provider,
            container: (viewport.width, viewport.height),
            viewport,
            markers: HashMap::new(),
            badges: Vec::new(),
            route_line: Vec::new(),
            user_location: None,
            layer: BasemapLayer::default(),
            overlay_sources: false,
            resizes: 0,
        }
    }

    /// Change the container size. Takes effect on the next `resize`.
    pub fn set_container_size(&mut self, width: f64, height: f64) {
        self.container = (width, height);
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn marker(&self, id: MarkerId) -> Option<&SurfaceMarker> {
        self.markers.get(&id)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn visible_marker_count(&self) -> usize {
        self.markers.values().filter(|m| m.visible).count()
    }

    pub fn badges(&self) -> &[ClusterBadge] {
        &self.badges
    }

    pub fn route_line(&self) -> &[BasemapPoint] {
        &self.route_line
    }

    pub fn user_location(&self) -> Option<BasemapPoint> {
        self.user_location
    }

    pub fn layer(&self) -> BasemapLayer {
        self.layer
    }

    pub fn has_overlay_sources(&self) -> bool {
        self.overlay_sources
    }

    pub fn resize_count(&self) -> usize {
        self.resizes
    }
}

impl MapSurface for HeadlessSurface {
    fn frame(&self) -> CoordinateFrame {
        self.provider.frame()
    }

    fn install_overlay_sources(&mut self) {
        self.overlay_sources = true;
    }

    fn add_marker(&mut self, id: MarkerId, position: BasemapPoint, label: &str) {
        self.markers.insert(
            id,
            SurfaceMarker {
                position,
                label: label.to_string(),
                visible: true,
                scale: 1.0,
                popup_open: false,
            },
        );
    }

    fn remove_marker(&mut self, id: MarkerId) {
        self.markers.remove(&id);
    }

    fn set_marker_visible(&mut self, id: MarkerId, visible: bool) {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.visible = visible;
        }
    }

    fn set_marker_scale(&mut self, id: MarkerId, scale: f64) {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.scale = scale;
        }
    }

    fn set_popup(&mut self, id: MarkerId, open: bool) {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.popup_open = open;
        }
    }

    fn show_badges(&mut self, badges: &[ClusterBadge]) {
        self.badges = badges.to_vec();
    }

    fn set_view(&mut self, center: BasemapPoint, zoom: f64) {
        self.viewport.set_view(center, zoom);
    }

    fn fit_bounds(&mut self, sw: BasemapPoint, ne: BasemapPoint, padding: f64) {
        self.viewport.fit_bounds(sw, ne, padding);
    }

    fn set_route_line(&mut self, line: &[BasemapPoint]) {
        self.route_line = line.to_vec();
    }

    fn set_user_location(&mut self, position: Option<BasemapPoint>) {
        self.user_location = position;
    }

    fn set_layer(&mut self, layer: BasemapLayer) {
        self.layer = layer;
    }

    fn resize(&mut self) {
        let (width, height) = self.container;
        self.viewport.resize(width, height);
        self.resizes += 1;
    }

    fn zoom(&self) -> f64 {
        self.viewport.zoom
    }

    fn center(&self) -> BasemapPoint {
        self.viewport.center
    }

    fn project(&self, point: BasemapPoint) -> ScreenPoint {
        self.viewport.project(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> HeadlessSurface {
        let center = BasemapPoint {
            lat: 30.3081,
            lon: 120.0827,
        };
        HeadlessSurface::new(BasemapProvider::Amap, Viewport::new(center, 15.0, 800.0, 600.0))
    }

    #[test]
    fn provider_decides_frame() {
        assert_eq!(BasemapProvider::Amap.frame(), CoordinateFrame::Gcj02);
        assert_eq!(BasemapProvider::Osm.frame(), CoordinateFrame::Wgs84);
        assert_eq!(surface().frame(), CoordinateFrame::Gcj02);
    }

    #[test]
    fn container_size_applies_on_resize_only() {
        let mut surface = surface();
        surface.set_container_size(400.0, 300.0);
        assert_eq!(surface.viewport().width, 800.0);
        surface.resize();
        assert_eq!(surface.viewport().width, 400.0);
        assert_eq!(surface.resize_count(), 1);
    }

    #[test]
    fn marker_updates_for_unknown_ids_are_ignored() {
        let mut surface = surface();
        surface.set_marker_visible(MarkerId(9), false);
        surface.set_popup(MarkerId(9), true);
        assert_eq!(surface.marker_count(), 0);
    }

    #[test]
    fn empty_route_line_clears() {
        let mut surface = surface();
        let point = surface.center();
        surface.set_route_line(&[point, point]);
        assert_eq!(surface.route_line().len(), 2);
        surface.set_route_line(&[]);
        assert!(surface.route_line().is_empty());
    }
}
