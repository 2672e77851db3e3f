//! Aggregation configuration

use serde::{Deserialize, Serialize};

/// Aggregation job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Radius within which a cluster strengthens an existing hazard (meters, default: 15.0)
    pub merge_radius_m: f64,
    /// Detections less accurate than this are left out of clustering (meters, default: 10.0)
    pub max_gps_accuracy_m: f64,
    /// How long to wait for the aggregation lock before skipping (default: 250ms)
    pub lock_timeout_ms: u64,
    /// Re-read-and-retry attempts after a concurrent hazard modification (default: 3)
    pub max_merge_retries: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            merge_radius_m: 15.0,
            max_gps_accuracy_m: 10.0,
            lock_timeout_ms: 250,
            max_merge_retries: 3,
        }
    }
}

/// Configuration for the periodic aggregation scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between aggregation runs (default: 300)
    pub interval_secs: u64,
    /// Run the decay sweep every N cycles; 0 disables it (default: 12)
    pub sweep_every_cycles: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            sweep_every_cycles: 12, // hourly at the default interval
        }
    }
}
