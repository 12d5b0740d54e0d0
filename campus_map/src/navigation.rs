use crate::{
    adapter::MapAdapter,
    config::MapSettings,
    error::RouteError,
    estimate::TravelEstimate,
    geolocation::{LocationSource, OriginFix, OriginSource, resolve_origin},
    models::{Coordinate, TravelMode},
    route_overlay::{DisplayedRoute, RouteOverlay, RouteUpdate},
    routing::{Deadline, RouteProvider},
    status::StatusChannel,
    surface::MapSurface,
};

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    /// The provider answered; `apply` draws its line.
    Routed {
        origin: OriginFix,
        route: DisplayedRoute,
        estimate: TravelEstimate,
    },
    /// The provider failed; the previous line (if any) stays and the
    /// numbers are a straight-line estimate.
    Estimated {
        origin: OriginFix,
        destination: Coordinate,
        estimate: TravelEstimate,
        error: RouteError,
    },
    /// A newer navigation started before this one finished.
    Superseded,
}

impl NavigationOutcome {
    pub fn estimate(&self) -> Option<&TravelEstimate> {
        match self {
            NavigationOutcome::Routed { estimate, .. } | NavigationOutcome::Estimated { estimate, .. } => {
                Some(estimate)
            }
            NavigationOutcome::Superseded => None,
        }
    }
}

/// Collaborators of one navigation run.
///
/// A run has two halves. [`Navigator::plan`] does the waiting (location,
/// routing) without touching the map, so the map owner keeps ticking and
/// handling input, and may start a newer run that supersedes this one.
/// [`Navigator::apply`] then puts the result on the map in one step.
pub struct Navigator<'a, P, L> {
    pub overlay: &'a RouteOverlay,
    pub provider: &'a P,
    pub location: &'a L,
    pub status: &'a StatusChannel,
    pub settings: &'a MapSettings,
}

impl<P: RouteProvider, L: LocationSource> Navigator<'_, P, L> {
    /// Locate the user and route to `destination`. Never fails: every error
    /// degrades to a fallback.
    pub async fn plan(&self, destination: Coordinate, mode: TravelMode) -> NavigationOutcome {
        self.status.publish("Locating...");
        let origin = resolve_origin(
            self.location,
            self.settings.geolocation_timeout(),
            self.settings.fallback_origin,
        )
        .await;
        match origin.source {
            OriginSource::Device => self.status.publish("Planning route..."),
            OriginSource::Fallback(err) => self
                .status
                .publish_for(err.user_message(), self.settings.status_ttl()),
        }

        let provider = Deadline::new(self.provider, self.settings.route_timeout());
        let outcome = match self
            .overlay
            .set_waypoints(&provider, &[origin.coords, destination], mode)
            .await
        {
            Ok(RouteUpdate::Displayed(route)) => {
                let estimate =
                    TravelEstimate::routed(&self.settings.travel, route.geometry.distance_m, mode);
                NavigationOutcome::Routed {
                    origin,
                    route,
                    estimate,
                }
            }
            Ok(RouteUpdate::Superseded) => return NavigationOutcome::Superseded,
            Err(error) => {
                let estimate = TravelEstimate::straight_line(
                    &self.settings.travel,
                    origin.coords,
                    destination,
                    mode,
                );
                tracing::warn!("routing failed ({error}), showing {estimate}");
                NavigationOutcome::Estimated {
                    origin,
                    destination,
                    estimate,
                    error,
                }
            }
        };

        if !origin.is_fallback() {
            self.status.clear();
        }
        outcome
    }

    /// Show a planned outcome: user marker, route line, both ends in view.
    /// Returns `false` for a superseded outcome, or a routed one whose line
    /// has since been replaced or dismissed; the map is left as it is.
    pub fn apply<S: MapSurface>(
        &self,
        adapter: &mut MapAdapter<S>,
        outcome: &NavigationOutcome,
    ) -> bool {
        let (origin, destination) = match outcome {
            NavigationOutcome::Routed { origin, route, .. } => {
                if self.overlay.displayed().as_ref() != Some(route) {
                    tracing::debug!("route to {:?} was replaced, not applying", route.destination);
                    return false;
                }
                adapter.show_route(&route.line);
                (origin.coords, route.destination)
            }
            NavigationOutcome::Estimated {
                origin, destination, ..
            } => (origin.coords, *destination),
            NavigationOutcome::Superseded => return false,
        };
        adapter.set_user_location(origin);
        adapter.fit_bounds(origin, destination, self.settings.fit_padding_px);
        true
    }

    /// Navigation dismissed: drop the line and anything still in flight.
    pub fn dismiss<S: MapSurface>(&self, adapter: &mut MapAdapter<S>) {
        self.overlay.clear();
        adapter.clear_route();
        self.status.clear();
    }
}
