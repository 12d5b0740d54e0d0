use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geodesy::BasemapPoint;

const TILE_SIZE_PX: f64 = 256.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_8;

/// Pixel position inside the map container, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Spherical-Mercator camera over a fixed-size container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: BasemapPoint,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Viewport {
    pub fn new(center: BasemapPoint, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
            min_zoom: 0.0,
            max_zoom: 22.0,
        }
    }

    pub fn with_zoom_limits(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self.zoom = self.zoom.clamp(min_zoom, max_zoom);
        self
    }

    pub fn set_view(&mut self, center: BasemapPoint, zoom: f64) {
        self.center = center;
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    fn world_size(&self) -> f64 {
        TILE_SIZE_PX * 2_f64.powf(self.zoom)
    }

    pub fn project(&self, point: BasemapPoint) -> ScreenPoint {
        let (px, py) = to_unit_world(point);
        let (cx, cy) = to_unit_world(self.center);
        let scale = self.world_size();
        ScreenPoint::new(
            (px - cx) * scale + self.width / 2.0,
            (py - cy) * scale + self.height / 2.0,
        )
    }

    pub fn unproject(&self, screen: ScreenPoint) -> BasemapPoint {
        let (cx, cy) = to_unit_world(self.center);
        let scale = self.world_size();
        from_unit_world(
            cx + (screen.x - self.width / 2.0) / scale,
            cy + (screen.y - self.height / 2.0) / scale,
        )
    }

    /// Centre and zoom so that both corners fit inside the container minus
    /// `padding` pixels on every side.
    pub fn fit_bounds(&mut self, sw: BasemapPoint, ne: BasemapPoint, padding: f64) {
        let (x0, y0) = to_unit_world(sw);
        let (x1, y1) = to_unit_world(ne);
        let span_x = (x1 - x0).abs().max(f64::EPSILON);
        let span_y = (y1 - y0).abs().max(f64::EPSILON);

        let avail_w = (self.width - 2.0 * padding).max(1.0);
        let avail_h = (self.height - 2.0 * padding).max(1.0);
        let scale = (avail_w / span_x).min(avail_h / span_y);
        let zoom = (scale / TILE_SIZE_PX).log2();

        let center = from_unit_world((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        self.set_view(center, zoom);
    }
}

fn to_unit_world(point: BasemapPoint) -> (f64, f64) {
    let lat = point.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let sin_lat = lat.to_radians().sin();
    let x = (point.lon + 180.0) / 360.0;
    let y = 0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI);
    (x, y)
}

fn from_unit_world(x: f64, y: f64) -> BasemapPoint {
    let lon = x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    BasemapPoint { lat, lon }
}
