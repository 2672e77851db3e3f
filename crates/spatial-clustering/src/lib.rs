//! Spatial Clustering Engine
//!
//! Groups raw detections into dense clusters plus a noise set using DBSCAN
//! with geodesic (haversine) neighborhoods. Pure computation, no I/O.

mod config;
mod dbscan;
mod grid;

pub use config::{ClusteringConfig, NeighborSearch};
pub use dbscan::DbscanClustering;

use std::collections::BTreeMap;
use std::fmt;

use geo_distance::Coordinate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Clustering errors
#[derive(Debug, Clone, Error)]
pub enum ClusteringError {
    #[error("Invalid clustering configuration: {0}")]
    InvalidConfig(String),
}

/// Anything with a stable id and a validated position can be clustered.
///
/// `point_id` defines the canonical processing order used for tie-breaking.
pub trait ClusterPoint {
    fn point_id(&self) -> u64;
    fn coordinate(&self) -> Coordinate;
}

/// Cluster identifier, dense and assigned in discovery order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster-{}", self.0)
    }
}

/// Result of one clustering pass
#[derive(Debug, Clone)]
pub struct Clustering<T> {
    /// Members per cluster, ascending by point id
    pub clusters: BTreeMap<ClusterId, Vec<T>>,
    /// Points reachable from no core point, ascending by point id
    pub noise: Vec<T>,
}

impl<T> Clustering<T> {
    /// Number of clusters found
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// True when no cluster was formed
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
