//! Geodesic DBSCAN.

use std::collections::{BTreeMap, VecDeque};

use geo_distance::Coordinate;
use tracing::debug;

use crate::config::ClusteringConfig;
use crate::grid::neighbor_lists;
use crate::{ClusterId, ClusterPoint, Clustering, ClusteringError};

/// Per-point label during expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Member(u32),
}

/// Density-based clustering over haversine distance.
///
/// Points are processed in ascending `point_id` order, so cluster membership
/// depends only on the input set: a border point reachable from two clusters
/// belongs to whichever cluster that order discovers first.
#[derive(Debug, Clone)]
pub struct DbscanClustering {
    config: ClusteringConfig,
}

impl DbscanClustering {
    /// Create a clusterer, rejecting unusable parameters
    pub fn new(config: ClusteringConfig) -> Result<Self, ClusteringError> {
        if !config.eps_m.is_finite() || config.eps_m <= 0.0 {
            return Err(ClusteringError::InvalidConfig(format!(
                "eps_m must be a positive number of meters, got {}",
                config.eps_m
            )));
        }
        if config.min_points == 0 {
            return Err(ClusteringError::InvalidConfig(
                "min_points must be at least 1".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Partition `points` into dense clusters and a noise set
    pub fn cluster<T: ClusterPoint>(&self, mut points: Vec<T>) -> Clustering<T> {
        // Canonical order; coordinates break ties between duplicate ids
        points.sort_by(|a, b| {
            a.point_id()
                .cmp(&b.point_id())
                .then_with(|| a.coordinate().lat().total_cmp(&b.coordinate().lat()))
                .then_with(|| a.coordinate().lon().total_cmp(&b.coordinate().lon()))
        });

        let coords: Vec<Coordinate> = points.iter().map(ClusterPoint::coordinate).collect();
        let labels = self.assign_labels(&coords);

        let mut clusters: BTreeMap<ClusterId, Vec<T>> = BTreeMap::new();
        let mut noise = Vec::new();
        for (point, label) in points.into_iter().zip(labels) {
            match label {
                Some(id) => clusters.entry(id).or_default().push(point),
                None => noise.push(point),
            }
        }

        debug!(
            "DBSCAN produced {} clusters and {} noise points (eps={}m, min_points={})",
            clusters.len(),
            noise.len(),
            self.config.eps_m,
            self.config.min_points
        );

        Clustering { clusters, noise }
    }

    /// Label already-ordered coordinates; `None` marks noise
    fn assign_labels(&self, coords: &[Coordinate]) -> Vec<Option<ClusterId>> {
        let n = coords.len();
        if n == 0 {
            return Vec::new();
        }

        let neighbors = neighbor_lists(coords, self.config.eps_m, self.config.search);
        let min_points = self.config.min_points;

        let mut labels = vec![Label::Unvisited; n];
        let mut next_cluster = 0u32;
        let mut seeds = VecDeque::new();

        for i in 0..n {
            if labels[i] != Label::Unvisited {
                continue;
            }
            if neighbors[i].len() < min_points {
                labels[i] = Label::Noise;
                continue;
            }

            let cluster = next_cluster;
            next_cluster += 1;
            labels[i] = Label::Member(cluster);

            seeds.clear();
            seeds.extend(neighbors[i].iter().copied());

            while let Some(j) = seeds.pop_front() {
                match labels[j] {
                    Label::Noise => {
                        // Previously rejected as a seed; it is a border point of this cluster
                        labels[j] = Label::Member(cluster);
                    }
                    Label::Unvisited => {
                        labels[j] = Label::Member(cluster);
                        if neighbors[j].len() >= min_points {
                            seeds.extend(neighbors[j].iter().copied());
                        }
                    }
                    Label::Member(_) => {}
                }
            }
        }

        // Groups left smaller than min_points (their border points were claimed
        // earlier) are demoted to noise; survivors are renumbered densely.
        let mut sizes = vec![0usize; next_cluster as usize];
        for label in &labels {
            if let Label::Member(c) = label {
                sizes[*c as usize] += 1;
            }
        }
        let mut remap = vec![None; next_cluster as usize];
        let mut kept = 0u32;
        for (old, &size) in sizes.iter().enumerate() {
            if size >= min_points {
                remap[old] = Some(ClusterId(kept));
                kept += 1;
            }
        }

        labels
            .into_iter()
            .map(|label| match label {
                Label::Member(c) => remap[c as usize],
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeighborSearch;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// Meters per degree of longitude on the equator
    const M_PER_DEG: f64 = 111_194.926_644_558_73;

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        id: u64,
        at: Coordinate,
    }

    impl ClusterPoint for Point {
        fn point_id(&self) -> u64 {
            self.id
        }

        fn coordinate(&self) -> Coordinate {
            self.at
        }
    }

    fn point(id: u64, lat: f64, lon: f64) -> Point {
        Point {
            id,
            at: Coordinate::new(lat, lon).unwrap(),
        }
    }

    /// A point `x` meters east of (0, 0)
    fn on_equator(id: u64, x: f64) -> Point {
        point(id, 0.0, x / M_PER_DEG)
    }

    fn clusterer(eps_m: f64, min_points: usize) -> DbscanClustering {
        DbscanClustering::new(ClusteringConfig {
            eps_m,
            min_points,
            search: NeighborSearch::Grid,
        })
        .unwrap()
    }

    fn membership(clustering: &Clustering<Point>) -> BTreeSet<BTreeSet<u64>> {
        clustering
            .clusters
            .values()
            .map(|members| members.iter().map(|p| p.id).collect())
            .collect()
    }

    #[test]
    fn test_three_close_detections_form_one_cluster() {
        let points = vec![
            point(1, 37.7749, -122.4194),
            point(2, 37.77491, -122.41941),
            point(3, 37.77489, -122.41938),
        ];
        let result = clusterer(15.0, 3).cluster(points);

        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[&ClusterId(0)].len(), 3);
        assert!(result.noise.is_empty());
    }

    #[test]
    fn test_sparse_points_are_noise() {
        let points = vec![on_equator(1, 0.0), on_equator(2, 100.0), on_equator(3, 200.0)];
        let result = clusterer(15.0, 3).cluster(points);

        assert!(result.clusters.is_empty());
        assert_eq!(result.noise.len(), 3);
    }

    #[test]
    fn test_two_separate_clusters_and_noise() {
        let points = vec![
            on_equator(1, 0.0),
            on_equator(2, 3.0),
            on_equator(3, 6.0),
            on_equator(4, 500.0),
            on_equator(5, 503.0),
            on_equator(6, 506.0),
            on_equator(7, 250.0),
        ];
        let result = clusterer(15.0, 3).cluster(points);

        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.noise.iter().map(|p| p.id).collect::<Vec<_>>(), vec![7]);
        let groups = membership(&result);
        assert!(groups.contains(&BTreeSet::from([1, 2, 3])));
        assert!(groups.contains(&BTreeSet::from([4, 5, 6])));
    }

    #[test]
    fn test_chain_grows_transitively() {
        // Each point is 10 m from the next: the ends are 40 m apart but density-connected
        let points: Vec<_> = (0..5).map(|i| on_equator(i + 1, i as f64 * 10.0)).collect();
        let result = clusterer(15.0, 2).cluster(points);

        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[&ClusterId(0)].len(), 5);
    }

    #[test]
    fn test_border_point_goes_to_first_discovered_cluster() {
        // Border point id 7 sits 9.5 m from the nearest member of both groups
        // but has only 3 neighbors itself, so it is not core.
        let left = [-9.5, -10.5, -11.5, -12.5];
        let right = [9.5, 10.5, 11.5, 12.5];

        let mut points: Vec<Point> = Vec::new();
        for (i, x) in right.iter().enumerate() {
            points.push(on_equator(1 + i as u64, *x));
        }
        for (i, x) in left.iter().enumerate() {
            points.push(on_equator(10 + i as u64, *x));
        }
        points.push(on_equator(7, 0.0));

        let forward = clusterer(10.0, 4).cluster(points.clone());
        points.reverse();
        let backward = clusterer(10.0, 4).cluster(points);

        for result in [&forward, &backward] {
            assert_eq!(result.clusters.len(), 2);
            let owner = result
                .clusters
                .values()
                .find(|members| members.iter().any(|p| p.id == 7))
                .expect("border point is clustered");
            assert!(owner.iter().any(|p| p.id == 1), "border joins the id-1 cluster");
            assert_eq!(owner.len(), 5);
        }
        assert_eq!(membership(&forward), membership(&backward));
    }

    #[test]
    fn test_undersized_group_is_demoted() {
        // Border point 4 is reachable from core points 1 and 5. Cluster {1,2,3,4}
        // claims it first, leaving {5,6,7} one short of min_points.
        let points = vec![
            on_equator(1, -9.0),
            on_equator(2, -18.0),
            on_equator(3, -17.0),
            on_equator(4, 0.0),
            on_equator(5, 9.0),
            on_equator(6, 18.0),
            on_equator(7, 17.0),
        ];
        let result = clusterer(10.0, 4).cluster(points);

        assert_eq!(result.clusters.len(), 1);
        assert_eq!(membership(&result), BTreeSet::from([BTreeSet::from([1, 2, 3, 4])]));
        assert_eq!(result.noise.iter().map(|p| p.id).collect::<Vec<_>>(), vec![5, 6, 7]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad_eps = ClusteringConfig {
            eps_m: 0.0,
            ..Default::default()
        };
        assert!(DbscanClustering::new(bad_eps).is_err());

        let bad_nan = ClusteringConfig {
            eps_m: f64::NAN,
            ..Default::default()
        };
        assert!(DbscanClustering::new(bad_nan).is_err());

        let bad_min = ClusteringConfig {
            min_points: 0,
            ..Default::default()
        };
        assert!(DbscanClustering::new(bad_min).is_err());
    }

    #[test]
    fn test_empty_input() {
        let result = clusterer(15.0, 3).cluster(Vec::<Point>::new());
        assert!(result.clusters.is_empty());
        assert!(result.noise.is_empty());
    }

    fn street_points() -> impl Strategy<Value = Vec<Point>> {
        prop::collection::vec((0.0f64..150.0, -6.0f64..6.0), 0..60).prop_map(|offsets| {
            offsets
                .into_iter()
                .enumerate()
                .map(|(i, (x, y))| point(i as u64 + 1, y / M_PER_DEG, x / M_PER_DEG))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_clusters_respect_min_points_and_reachability(
            points in street_points(),
            min_points in 1usize..5,
        ) {
            let eps = 15.0;
            let result = clusterer(eps, min_points).cluster(points);
            for members in result.clusters.values() {
                prop_assert!(members.len() >= min_points);
                if members.len() > 1 {
                    for p in members {
                        let close = members.iter().any(|q| {
                            q.id != p.id && geo_distance::distance(p.at, q.at) <= eps
                        });
                        prop_assert!(close, "member {} is isolated", p.id);
                    }
                }
            }
        }

        #[test]
        fn prop_shuffling_does_not_change_membership(
            points in street_points(),
            seed in any::<u64>(),
        ) {
            let mut shuffled = points.clone();
            // Deterministic Fisher-Yates driven by the generated seed
            let mut state = seed | 1;
            for i in (1..shuffled.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let j = (state % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }

            let a = clusterer(15.0, 3).cluster(points);
            let b = clusterer(15.0, 3).cluster(shuffled);
            prop_assert_eq!(membership(&a), membership(&b));
            prop_assert_eq!(a.noise, b.noise);
        }

        #[test]
        fn prop_grid_and_brute_force_agree(points in street_points(), min_points in 1usize..5) {
            let grid = clusterer(15.0, min_points).cluster(points.clone());
            let brute = DbscanClustering::new(ClusteringConfig {
                eps_m: 15.0,
                min_points,
                search: NeighborSearch::BruteForce,
            })
            .unwrap()
            .cluster(points);
            prop_assert_eq!(grid.clusters, brute.clusters);
            prop_assert_eq!(grid.noise, brute.noise);
        }
    }
}
