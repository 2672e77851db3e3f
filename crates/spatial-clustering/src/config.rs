//! Clustering configuration

use serde::{Deserialize, Serialize};

/// Neighborhood search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborSearch {
    /// Pairwise haversine over every point
    BruteForce,
    /// Lat/lon cell grid as a broad phase, exact haversine as the narrow phase
    Grid,
}

/// DBSCAN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Neighborhood radius in meters (default: 15.0)
    pub eps_m: f64,
    /// Points (self included) within `eps_m` needed for a core point (default: 3)
    pub min_points: usize,
    /// Neighborhood search strategy (default: grid)
    pub search: NeighborSearch,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps_m: 15.0,
            min_points: 3,
            search: NeighborSearch::Grid,
        }
    }
}
