use std::{
    collections::{BTreeMap, HashMap},
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::{
    geodesy::{BasemapPoint, CoordinateFrame},
    models::{Coordinate, MarkerKey, PoiInstance},
    poi_store::display_name,
    viewport::ScreenPoint,
};

pub const FLASH_PULSES: u32 = 2;
pub const FLASH_EXPAND: Duration = Duration::from_millis(250);
pub const FLASH_SETTLE: Duration = Duration::from_millis(200);
pub const FLASH_SCALE: f64 = 1.6;

/// Identity of a live marker. Survives `sync` for as long as the key does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    Idle,
    /// Scaled up, 1-based pulse number.
    Expanded(u32),
    /// Back to rest size, waiting before the next pulse.
    Settling(u32),
}

impl FlashPhase {
    pub fn scale(self) -> f64 {
        match self {
            FlashPhase::Expanded(_) => FLASH_SCALE,
            FlashPhase::Idle | FlashPhase::Settling(_) => 1.0,
        }
    }
}

/// Two-pulse attention animation. Self-terminating: idle after
/// `FLASH_PULSES * (FLASH_EXPAND + FLASH_SETTLE)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashAnimation {
    started_at: Instant,
}

impl FlashAnimation {
    pub fn start(now: Instant) -> Self {
        Self { started_at: now }
    }

    pub fn total_duration() -> Duration {
        (FLASH_EXPAND + FLASH_SETTLE) * FLASH_PULSES
    }

    pub fn phase_at(&self, now: Instant) -> FlashPhase {
        let elapsed = now.saturating_duration_since(self.started_at);
        let period = FLASH_EXPAND + FLASH_SETTLE;
        let pulse = (elapsed.as_nanos() / period.as_nanos()) as u32;
        if pulse >= FLASH_PULSES {
            return FlashPhase::Idle;
        }
        let within = elapsed - period * pulse;
        if within < FLASH_EXPAND {
            FlashPhase::Expanded(pulse + 1)
        } else {
            FlashPhase::Settling(pulse + 1)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Marker {
    id: MarkerId,
    key: MarkerKey,
    label: String,
    coords: Coordinate,
    projected: BasemapPoint,
    screen: Option<ScreenPoint>,
    visible: bool,
    popup_open: bool,
    flash: Option<FlashAnimation>,
    applied_scale: f64,
}

impl Marker {
    pub fn id(&self) -> MarkerId {
        self.id
    }

    pub fn key(&self) -> &MarkerKey {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Geographic position, WGS-84.
    pub fn coords(&self) -> Coordinate {
        self.coords
    }

    /// Position in the basemap's frame.
    pub fn projected(&self) -> BasemapPoint {
        self.projected
    }

    pub fn screen(&self) -> Option<ScreenPoint> {
        self.screen
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_popup_open(&self) -> bool {
        self.popup_open
    }

    pub fn flash_phase(&self, now: Instant) -> FlashPhase {
        self.flash
            .map(|flash| flash.phase_at(now))
            .unwrap_or(FlashPhase::Idle)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<MarkerKey>,
    pub removed: Vec<(MarkerKey, MarkerId)>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty()
    }
}

/// Authoritative set of on-map markers, keyed by `(poi_id, location_index)`.
///
/// The registry only does bookkeeping; the map adapter turns its reports
/// into surface mutations.
#[derive(Debug)]
pub struct MarkerRegistry {
    frame: CoordinateFrame,
    markers: BTreeMap<MarkerKey, Marker>,
    next_id: u64,
}

impl MarkerRegistry {
    pub fn new(frame: CoordinateFrame) -> Self {
        Self {
            frame,
            markers: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn frame(&self) -> CoordinateFrame {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    pub fn get(&self, key: &MarkerKey) -> Option<&Marker> {
        self.markers.get(key)
    }

    /// Reconcile with `instances`: create missing keys, drop absent ones,
    /// leave the rest untouched so popups and animations survive.
    pub fn sync(&mut self, instances: &[PoiInstance]) -> SyncReport {
        let mut location_counts: HashMap<&str, usize> = HashMap::new();
        for instance in instances {
            *location_counts.entry(instance.poi_id.as_str()).or_default() += 1;
        }

        let mut wanted: BTreeMap<MarkerKey, &PoiInstance> = BTreeMap::new();
        for instance in instances {
            wanted.entry(instance.key()).or_insert(instance);
        }

        let mut report = SyncReport::default();

        let stale: Vec<MarkerKey> = self
            .markers
            .keys()
            .filter(|key| !wanted.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(marker) = self.markers.remove(&key) {
                report.removed.push((key, marker.id));
            }
        }

        for (key, instance) in wanted {
            if self.markers.contains_key(&key) {
                continue;
            }
            let count = location_counts
                .get(instance.poi_id.as_str())
                .copied()
                .unwrap_or(1);
            let marker = Marker {
                id: MarkerId(self.next_id),
                key: key.clone(),
                label: display_name(&instance.name, instance.location_index, count),
                coords: instance.coords,
                projected: self.frame.to_basemap(instance.coords),
                screen: None,
                visible: true,
                popup_open: false,
                flash: None,
                applied_scale: 1.0,
            };
            self.next_id += 1;
            self.markers.insert(key.clone(), marker);
            report.created.push(key);
        }

        if !report.is_empty() {
            tracing::debug!(
                "marker sync: {} created, {} removed, {} total",
                report.created.len(),
                report.removed.len(),
                self.markers.len()
            );
        }
        report
    }

    /// Returns true when the flag actually changed.
    pub fn set_visible(&mut self, key: &MarkerKey, visible: bool) -> bool {
        match self.markers.get_mut(key) {
            Some(marker) if marker.visible != visible => {
                marker.visible = visible;
                true
            }
            _ => false,
        }
    }

    /// Start (or restart) the flash animation. Unknown keys are ignored.
    pub fn flash(&mut self, key: &MarkerKey, now: Instant) -> bool {
        match self.markers.get_mut(key) {
            Some(marker) => {
                marker.flash = Some(FlashAnimation::start(now));
                true
            }
            None => {
                tracing::debug!("flash ignored for unknown marker {key}");
                false
            }
        }
    }

    /// Step every running animation to `now` and report the markers whose
    /// scale must change on screen.
    pub fn advance_animations(&mut self, now: Instant) -> Vec<(MarkerId, f64)> {
        let mut changes = Vec::new();
        for marker in self.markers.values_mut() {
            let Some(flash) = marker.flash else {
                continue;
            };
            let phase = flash.phase_at(now);
            if phase == FlashPhase::Idle {
                marker.flash = None;
            }
            let scale = phase.scale();
            if scale != marker.applied_scale {
                marker.applied_scale = scale;
                changes.push((marker.id, scale));
            }
        }
        changes
    }

    pub fn project<F>(&mut self, key: &MarkerKey, to_screen: F) -> Option<ScreenPoint>
    where
        F: Fn(BasemapPoint) -> ScreenPoint,
    {
        let marker = self.markers.get_mut(key)?;
        let screen = to_screen(marker.projected);
        marker.screen = Some(screen);
        Some(screen)
    }

    pub fn project_all<F>(&mut self, to_screen: F)
    where
        F: Fn(BasemapPoint) -> ScreenPoint,
    {
        for marker in self.markers.values_mut() {
            marker.screen = Some(to_screen(marker.projected));
        }
    }

    /// Open the popup on `key`, closing whichever other popup was open.
    /// Returns the marker whose popup got closed.
    pub fn open_popup(&mut self, key: &MarkerKey) -> Option<MarkerId> {
        if !self.markers.contains_key(key) {
            return None;
        }
        let mut closed = None;
        for marker in self.markers.values_mut() {
            let should_open = &marker.key == key;
            if marker.popup_open && !should_open {
                closed = Some(marker.id);
            }
            marker.popup_open = should_open;
        }
        closed
    }

    pub fn close_popups(&mut self) -> Vec<MarkerId> {
        self.markers
            .values_mut()
            .filter(|marker| marker.popup_open)
            .map(|marker| {
                marker.popup_open = false;
                marker.id
            })
            .collect()
    }

    /// Drop every marker (map teardown).
    pub fn clear(&mut self) -> Vec<MarkerId> {
        let ids = self.markers.values().map(|marker| marker.id).collect();
        self.markers.clear();
        ids
    }
}
