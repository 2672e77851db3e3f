//! Hazard Aggregation
//!
//! Turns clustered detections into hazard records. The pure merge rules live
//! in [`merge`]; [`AggregationJob`] drives them against the stores under a
//! global lock, and [`AggregationScheduler`] runs the job periodically.

mod config;
pub mod merge;
mod job;
mod scheduler;

pub use config::{AggregationConfig, SchedulerConfig};
pub use job::{AggregationJob, AggregationSummary, SweepSummary};
pub use merge::{plan_merge, ClusterSummary, HazardAggregator, MergeDecision};
pub use scheduler::AggregationScheduler;

use spatial_clustering::ClusteringError;
use storage::{HazardId, StorageError};
use thiserror::Error;

/// Aggregation errors
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Aggregation lock not acquired within {timeout_ms}ms")]
    LockContention { timeout_ms: u64 },
    #[error("Store error: {0}")]
    Store(#[from] StorageError),
    #[error("Clustering error: {0}")]
    Clustering(#[from] ClusteringError),
    #[error("Hazard {hazard_id} kept changing underneath us after {attempts} attempts")]
    MergeConflict { hazard_id: HazardId, attempts: u32 },
}
