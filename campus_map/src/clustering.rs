use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    models::{Coordinate, MarkerKey},
    viewport::ScreenPoint,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Screen distance (px) under which a marker joins a cluster.
    pub radius_px: f64,
    /// Above this zoom every marker is shown on its own.
    pub max_cluster_zoom: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            radius_px: 40.0,
            max_cluster_zoom: 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterInput {
    pub key: MarkerKey,
    pub coords: Coordinate,
    pub screen: ScreenPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Mean of member coordinates, WGS-84.
    pub center: Coordinate,
    pub members: Vec<MarkerKey>,
    #[serde(skip)]
    pub screen_centroid: ScreenPoint,
}

impl Cluster {
    fn seed(input: &ClusterInput) -> Self {
        Self {
            center: input.coords,
            members: vec![input.key.clone()],
            screen_centroid: input.screen,
        }
    }

    fn absorb(&mut self, input: &ClusterInput) {
        let n = self.members.len() as f64;
        let next = n + 1.0;
        self.screen_centroid = ScreenPoint::new(
            (self.screen_centroid.x * n + input.screen.x) / next,
            (self.screen_centroid.y * n + input.screen.y) / next,
        );
        self.center = Coordinate::new(
            (self.center.lat * n + input.coords.lat) / next,
            (self.center.lon * n + input.coords.lon) / next,
        );
        self.members.push(input.key.clone());
    }

    /// A badge rather than a plain marker.
    pub fn is_aggregate(&self) -> bool {
        self.members.len() > 1
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of one clustering pass: every marker appears in exactly one cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderPlan {
    pub zoom: f64,
    pub clusters: Vec<Cluster>,
}

impl RenderPlan {
    pub fn singles(&self) -> impl Iterator<Item = &MarkerKey> {
        self.clusters
            .iter()
            .filter(|c| !c.is_aggregate())
            .flat_map(|c| c.members.iter())
    }

    pub fn aggregates(&self) -> impl Iterator<Item = (usize, &Cluster)> {
        self.clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_aggregate())
    }

    /// Whether the marker is drawn on its own under this plan.
    pub fn is_individually_visible(&self, key: &MarkerKey) -> bool {
        self.cluster_of(key)
            .map(|idx| !self.clusters[idx].is_aggregate())
            .unwrap_or(false)
    }

    pub fn cluster_of(&self, key: &MarkerKey) -> Option<usize> {
        self.clusters
            .iter()
            .position(|c| c.members.iter().any(|m| m == key))
    }
}

/// North first, then west to east; ties broken by key so the pass is
/// deterministic regardless of input order.
fn canonical_order(a: &ClusterInput, b: &ClusterInput) -> Ordering {
    b.coords
        .lat
        .total_cmp(&a.coords.lat)
        .then(a.coords.lon.total_cmp(&b.coords.lon))
        .then_with(|| a.key.cmp(&b.key))
}

/// Greedy single-pass clustering.
///
/// Each marker joins the first existing cluster whose running centroid is
/// strictly closer than `radius_px`, otherwise it seeds a new one. This is an
/// approximation: the outcome depends on visiting order, which is fixed by
/// [`canonical_order`].
pub fn plan(config: &ClusterConfig, zoom: f64, inputs: &[ClusterInput]) -> RenderPlan {
    let mut ordered: Vec<&ClusterInput> = inputs.iter().collect();
    ordered.sort_by(|a, b| canonical_order(a, b));

    if zoom > config.max_cluster_zoom {
        return RenderPlan {
            zoom,
            clusters: ordered.into_iter().map(Cluster::seed).collect(),
        };
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    for input in ordered {
        match clusters
            .iter_mut()
            .find(|c| c.screen_centroid.distance_to(input.screen) < config.radius_px)
        {
            Some(cluster) => cluster.absorb(input),
            None => clusters.push(Cluster::seed(input)),
        }
    }

    tracing::debug!(
        "clustered {} markers into {} groups at zoom {zoom:.2}",
        inputs.len(),
        clusters.len()
    );
    RenderPlan { zoom, clusters }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str, lat: f64, lon: f64, x: f64, y: f64) -> ClusterInput {
        ClusterInput {
            key: MarkerKey::new(id, 0),
            coords: Coordinate::new(lat, lon),
            screen: ScreenPoint::new(x, y),
        }
    }

    #[test]
    fn single_marker_is_one_singleton() {
        let plan = plan(&ClusterConfig::default(), 14.0, &[input("p1", 30.3, 120.08, 10.0, 10.0)]);
        assert_eq!(plan.clusters.len(), 1);
        assert!(!plan.clusters[0].is_aggregate());
        assert!(plan.is_individually_visible(&MarkerKey::new("p1", 0)));
    }

    #[test]
    fn empty_input_gives_empty_plan() {
        let plan = plan(&ClusterConfig::default(), 14.0, &[]);
        assert!(plan.clusters.is_empty());
    }

    #[test]
    fn merge_threshold_is_strict() {
        let config = ClusterConfig::default();
        let near = [
            input("a", 30.30, 120.08, 100.0, 100.0),
            input("b", 30.29, 120.08, 100.0, 100.0 + config.radius_px - 1.0),
        ];
        assert_eq!(plan(&config, 14.0, &near).clusters.len(), 1);

        let far = [
            input("a", 30.30, 120.08, 100.0, 100.0),
            input("b", 30.29, 120.08, 100.0, 100.0 + config.radius_px + 1.0),
        ];
        assert_eq!(plan(&config, 14.0, &far).clusters.len(), 2);

        let exact = [
            input("a", 30.30, 120.08, 100.0, 100.0),
            input("b", 30.29, 120.08, 100.0, 100.0 + config.radius_px),
        ];
        assert_eq!(plan(&config, 14.0, &exact).clusters.len(), 2);
    }

    #[test]
    fn above_max_zoom_everything_is_single() {
        let config = ClusterConfig::default();
        let stacked = [
            input("a", 30.30, 120.08, 50.0, 50.0),
            input("b", 30.30, 120.08, 50.0, 50.0),
            input("c", 30.30, 120.08, 51.0, 50.0),
        ];
        let plan = plan(&config, config.max_cluster_zoom + 1.0, &stacked);
        assert_eq!(plan.clusters.len(), 3);
        assert_eq!(plan.aggregates().count(), 0);
        assert_eq!(plan.singles().count(), 3);
    }

    #[test]
    fn at_max_zoom_clustering_still_applies() {
        let config = ClusterConfig::default();
        let stacked = [
            input("a", 30.30, 120.08, 50.0, 50.0),
            input("b", 30.30, 120.08, 52.0, 50.0),
        ];
        assert_eq!(plan(&config, config.max_cluster_zoom, &stacked).clusters.len(), 1);
    }

    #[test]
    fn every_marker_lands_in_exactly_one_cluster() {
        let inputs: Vec<ClusterInput> = (0..30)
            .map(|i| {
                let f = i as f64;
                input(&format!("p{i}"), 30.30 + f * 0.001, 120.08, (f * 17.0) % 300.0, (f * 29.0) % 200.0)
            })
            .collect();
        let plan = plan(&ClusterConfig::default(), 15.0, &inputs);
        let total: usize = plan.clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, inputs.len());
        for item in &inputs {
            let owners = plan
                .clusters
                .iter()
                .filter(|c| c.members.contains(&item.key))
                .count();
            assert_eq!(owners, 1, "{} owned {owners} times", item.key);
        }
    }

    #[test]
    fn order_is_north_first_regardless_of_input_order() {
        let south = input("south", 30.29, 120.08, 0.0, 300.0);
        let north = input("north", 30.32, 120.08, 0.0, 0.0);
        let a = plan(&ClusterConfig::default(), 14.0, &[south.clone(), north.clone()]);
        let b = plan(&ClusterConfig::default(), 14.0, &[north, south]);
        assert_eq!(a, b);
        assert_eq!(a.clusters[0].members[0], MarkerKey::new("north", 0));
    }

    #[test]
    fn centroid_drifts_as_members_join() {
        // b joins a (30 px), c is 35 px from the a+b centroid but 50 px from a.
        let inputs = [
            input("a", 30.303, 120.08, 0.0, 0.0),
            input("b", 30.302, 120.08, 30.0, 0.0),
            input("c", 30.301, 120.08, 50.0, 0.0),
        ];
        let plan = plan(&ClusterConfig::default(), 14.0, &inputs);
        assert_eq!(plan.clusters.len(), 1);
        assert_eq!(plan.clusters[0].len(), 3);
        assert!((plan.clusters[0].center.lat - 30.302).abs() < 1e-9);
    }

    #[test]
    fn cluster_lookup() {
        let inputs = [
            input("a", 30.303, 120.08, 0.0, 0.0),
            input("b", 30.302, 120.08, 5.0, 0.0),
            input("c", 30.301, 120.08, 400.0, 0.0),
        ];
        let plan = plan(&ClusterConfig::default(), 14.0, &inputs);
        assert_eq!(plan.cluster_of(&MarkerKey::new("a", 0)), plan.cluster_of(&MarkerKey::new("b", 0)));
        assert!(!plan.is_individually_visible(&MarkerKey::new("a", 0)));
        assert!(plan.is_individually_visible(&MarkerKey::new("c", 0)));
        assert_eq!(plan.cluster_of(&MarkerKey::new("zz", 0)), None);
    }
}
