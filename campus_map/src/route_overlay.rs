use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    error::RouteError,
    geodesy::{BasemapPoint, CoordinateFrame},
    models::{Coordinate, TravelMode},
    routing::{RouteGeometry, RouteProvider, RouteQuery},
};

/// The route currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedRoute {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub mode: TravelMode,
    pub geometry: RouteGeometry,
    /// Every vertex of `geometry.path`, reprojected into the basemap frame.
    pub line: Vec<BasemapPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteUpdate {
    Displayed(DisplayedRoute),
    /// A newer request was issued while this one was in flight.
    Superseded,
}

/// Keeps at most one route line and makes sure only the latest request can
/// replace it.
///
/// Requests may overlap; each is tagged with a sequence number and a result
/// is applied only if no newer request was started meanwhile.
#[derive(Debug)]
pub struct RouteOverlay {
    frame: CoordinateFrame,
    latest: AtomicU64,
    current: Mutex<Option<DisplayedRoute>>,
}

impl RouteOverlay {
    pub fn new(frame: CoordinateFrame) -> Self {
        Self {
            frame,
            latest: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    pub fn frame(&self) -> CoordinateFrame {
        self.frame
    }

    /// Route between the first and last waypoint. Intermediate waypoints are
    /// not forwarded to the provider.
    pub async fn set_waypoints<P: RouteProvider>(
        &self,
        provider: &P,
        waypoints: &[Coordinate],
        mode: TravelMode,
    ) -> Result<RouteUpdate, RouteError> {
        let (origin, destination) = match waypoints {
            [first, .., last] => (*first, *last),
            _ => return Err(RouteError::NotEnoughWaypoints(waypoints.len())),
        };

        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let result = provider
            .fetch_route(RouteQuery {
                origin,
                destination,
                mode,
            })
            .await;

        if self.latest.load(Ordering::SeqCst) != seq {
            tracing::debug!("discarding route response #{seq}, superseded");
            return Ok(RouteUpdate::Superseded);
        }

        let geometry = result.inspect_err(|err| {
            tracing::warn!("route request #{seq} failed, keeping previous line: {err}");
        })?;
        let line = geometry
            .path
            .iter()
            .map(|&vertex| self.frame.to_basemap(vertex))
            .collect();
        let route = DisplayedRoute {
            origin,
            destination,
            mode,
            geometry,
            line,
        };

        let mut current = self.lock();
        // A clear() may have landed between the check above and this lock.
        if self.latest.load(Ordering::SeqCst) != seq {
            return Ok(RouteUpdate::Superseded);
        }
        *current = Some(route.clone());
        tracing::info!(
            "route #{seq} displayed: {} vertices, {:.0} m",
            route.line.len(),
            route.geometry.distance_m
        );
        Ok(RouteUpdate::Displayed(route))
    }

    /// Remove the line and invalidate every request still in flight.
    pub fn clear(&self) {
        let mut current = self.lock();
        self.latest.fetch_add(1, Ordering::SeqCst);
        *current = None;
    }

    pub fn displayed(&self) -> Option<DisplayedRoute> {
        self.lock().clone()
    }

    pub fn line(&self) -> Vec<BasemapPoint> {
        self.lock()
            .as_ref()
            .map(|route| route.line.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<DisplayedRoute>> {
        // The guarded value is replaced wholesale, so a poisoned lock still
        // holds a consistent route.
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::Notify;

    use super::*;
    use crate::error::RoutingError;

    const ORIGIN: Coordinate = Coordinate::new(30.29517, 120.08215);
    const P1: Coordinate = Coordinate::new(30.3095, 120.0817);

    struct Straight;

    impl RouteProvider for Straight {
        async fn fetch_route(&self, query: RouteQuery) -> Result<RouteGeometry, RoutingError> {
            Ok(RouteGeometry {
                path: vec![
                    query.origin,
                    query.origin.interpolate(query.destination, 0.5),
                    query.destination,
                ],
                distance_m: 1_600.0,
                duration_s: 1_200.0,
            })
        }
    }

    struct Failing;

    impl RouteProvider for Failing {
        async fn fetch_route(&self, _query: RouteQuery) -> Result<RouteGeometry, RoutingError> {
            Err(RoutingError::Timeout)
        }
    }

    /// Waits for `release` before answering, to model a slow response.
    struct Gated {
        release: Arc<Notify>,
    }

    impl RouteProvider for Gated {
        async fn fetch_route(&self, query: RouteQuery) -> Result<RouteGeometry, RoutingError> {
            self.release.notified().await;
            Straight.fetch_route(query).await
        }
    }

    #[tokio::test]
    async fn every_vertex_is_reprojected() {
        let overlay = RouteOverlay::new(CoordinateFrame::Gcj02);
        let update = overlay
            .set_waypoints(&Straight, &[ORIGIN, P1], TravelMode::Walk)
            .await
            .unwrap();
        let RouteUpdate::Displayed(route) = update else {
            panic!("expected a displayed route");
        };
        assert_eq!(route.line.len(), route.geometry.path.len());
        for (vertex, drawn) in route.geometry.path.iter().zip(&route.line) {
            assert_eq!(*drawn, CoordinateFrame::Gcj02.to_basemap(*vertex));
        }
        assert_eq!(overlay.line(), route.line);
    }

    #[tokio::test]
    async fn failure_keeps_previous_route() {
        let overlay = RouteOverlay::new(CoordinateFrame::Gcj02);
        overlay
            .set_waypoints(&Straight, &[ORIGIN, P1], TravelMode::Walk)
            .await
            .unwrap();
        let before = overlay.displayed();
        assert!(before.is_some());

        let err = overlay
            .set_waypoints(&Failing, &[ORIGIN, P1], TravelMode::Bike)
            .await
            .unwrap_err();
        assert_eq!(err, RouteError::Routing(RoutingError::Timeout));
        assert_eq!(overlay.displayed(), before);
    }

    #[tokio::test]
    async fn too_few_waypoints_is_an_error() {
        let overlay = RouteOverlay::new(CoordinateFrame::Wgs84);
        let err = overlay
            .set_waypoints(&Straight, &[ORIGIN], TravelMode::Walk)
            .await
            .unwrap_err();
        assert_eq!(err, RouteError::NotEnoughWaypoints(1));
        assert!(overlay.displayed().is_none());
    }

    #[tokio::test]
    async fn stale_response_is_discarded() {
        let overlay = Arc::new(RouteOverlay::new(CoordinateFrame::Gcj02));
        let release = Arc::new(Notify::new());
        let slow = Gated {
            release: release.clone(),
        };

        let first = {
            let overlay = overlay.clone();
            tokio::spawn(async move {
                overlay
                    .set_waypoints(&slow, &[ORIGIN, P1], TravelMode::Walk)
                    .await
            })
        };
        // let the first request register its sequence number
        tokio::time::sleep(Duration::from_millis(20)).await;

        let destination = Coordinate::new(30.3020, 120.0900);
        let second = overlay
            .set_waypoints(&Straight, &[ORIGIN, destination], TravelMode::Walk)
            .await
            .unwrap();
        assert!(matches!(second, RouteUpdate::Displayed(_)));

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, RouteUpdate::Superseded);
        assert_eq!(overlay.displayed().unwrap().destination, destination);
    }

    #[tokio::test]
    async fn clear_invalidates_in_flight_requests() {
        let overlay = Arc::new(RouteOverlay::new(CoordinateFrame::Gcj02));
        let release = Arc::new(Notify::new());
        let slow = Gated {
            release: release.clone(),
        };
        let pending = {
            let overlay = overlay.clone();
            tokio::spawn(async move {
                overlay
                    .set_waypoints(&slow, &[ORIGIN, P1], TravelMode::Walk)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        overlay.clear();
        release.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), RouteUpdate::Superseded);
        assert!(overlay.line().is_empty());
    }
}
