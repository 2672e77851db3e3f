//! Aggregation Job
//!
//! One pass: fetch unconsumed detections, cluster them, fold each cluster into
//! the hazard store, then mark its detections consumed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hazard_scoring::ScoringConfig;
use serde::Serialize;
use spatial_clustering::{ClusteringConfig, DbscanClustering};
use storage::{
    Detection, DetectionId, DetectionSource, Hazard, HazardId, HazardStore, StorageError, UserId,
    Verification, VerificationSource,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::AggregationConfig;
use crate::merge::{plan_merge, ClusterSummary, HazardAggregator, MergeDecision};
use crate::AggregationError;

/// Result of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationSummary {
    pub detections_considered: usize,
    /// Left out for poor GPS accuracy
    pub detections_filtered: usize,
    pub clusters_found: usize,
    pub hazards_created: usize,
    pub hazards_updated: usize,
    pub detections_consumed: usize,
    pub noise: usize,
    /// Clusters skipped after exhausting merge retries; retried next run
    pub merge_conflicts: usize,
    /// Clusters a hazard had already absorbed in an interrupted pass; only
    /// their consumption marks were written
    pub clusters_reconciled: usize,
}

/// Result of one decay sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub hazards_rescored: usize,
    pub hazards_deactivated: usize,
}

enum MergeOutcome {
    Created(Hazard),
    Strengthened(Hazard),
    /// Every member is already part of this hazard
    AlreadyAbsorbed(HazardId),
}

/// Drives clustering and merging against the stores
pub struct AggregationJob {
    detections: Arc<dyn DetectionSource>,
    hazards: Arc<dyn HazardStore>,
    verifications: Arc<dyn VerificationSource>,
    clustering: DbscanClustering,
    aggregator: HazardAggregator,
    config: AggregationConfig,
    /// At most one pass (or sweep) at a time
    lock: Arc<Mutex<()>>,
}

impl AggregationJob {
    /// Create a job with its own aggregation lock
    pub fn new(
        detections: Arc<dyn DetectionSource>,
        hazards: Arc<dyn HazardStore>,
        verifications: Arc<dyn VerificationSource>,
        clustering: ClusteringConfig,
        scoring: ScoringConfig,
        config: AggregationConfig,
    ) -> Result<Self, AggregationError> {
        Ok(Self {
            detections,
            hazards,
            verifications,
            clustering: DbscanClustering::new(clustering)?,
            aggregator: HazardAggregator::new(scoring),
            config,
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Share an aggregation lock with other jobs over the same stores
    pub fn with_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.lock = lock;
        self
    }

    /// Handle to this job's aggregation lock
    pub fn lock_handle(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.lock)
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Run one pass stamped with the current time
    pub async fn run(&self) -> Result<AggregationSummary, AggregationError> {
        self.run_at(Utc::now()).await
    }

    /// Run one pass as of `now`.
    ///
    /// Fails with [`AggregationError::LockContention`] when another pass holds
    /// the lock past the timeout. A store failure aborts the pass; clusters
    /// written before it keep their consumption marks. Hazards remember the
    /// detections they absorbed, so a cluster whose hazard write landed but
    /// whose consumption mark did not is not counted twice on the next pass.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<AggregationSummary, AggregationError> {
        let _guard = self.acquire().await?;
        metrics::counter!("aggregation_runs_total").increment(1);

        let fetched = self.detections.fetch_unconsumed_detections(None).await?;
        let mut summary = AggregationSummary {
            detections_considered: fetched.len(),
            ..AggregationSummary::default()
        };

        let max_accuracy = self.config.max_gps_accuracy_m;
        let (usable, filtered): (Vec<_>, Vec<_>) =
            fetched.into_iter().partition(|d| d.accuracy_m <= max_accuracy);
        summary.detections_filtered = filtered.len();

        let clustering = self.clustering.cluster(usable);
        summary.clusters_found = clustering.cluster_count();
        summary.noise = clustering.noise.len();

        if clustering.is_empty() {
            debug!(
                considered = summary.detections_considered,
                noise = summary.noise,
                "No clusters formed"
            );
            return Ok(summary);
        }

        for (cluster_id, members) in &clustering.clusters {
            let Some(cluster) = ClusterSummary::from_members(members) else {
                continue;
            };

            match self.merge_cluster(members, &cluster, now).await {
                Ok(MergeOutcome::Created(hazard)) => {
                    summary.hazards_created += 1;
                    metrics::counter!("hazards_created_total").increment(1);
                    debug!("{} created hazard {}", cluster_id, hazard.id);
                }
                Ok(MergeOutcome::Strengthened(hazard)) => {
                    summary.hazards_updated += 1;
                    metrics::counter!("hazards_updated_total").increment(1);
                    debug!(
                        "{} strengthened hazard {} (version {})",
                        cluster_id, hazard.id, hazard.version
                    );
                }
                Ok(MergeOutcome::AlreadyAbsorbed(hazard_id)) => {
                    summary.clusters_reconciled += 1;
                    debug!(
                        "{} already absorbed by hazard {}, marking consumed",
                        cluster_id, hazard_id
                    );
                }
                Err(AggregationError::MergeConflict { hazard_id, attempts }) => {
                    summary.merge_conflicts += 1;
                    warn!(
                        "{} skipped: hazard {} still conflicting after {} attempts",
                        cluster_id, hazard_id, attempts
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }

            self.detections.mark_consumed(&cluster.detection_ids).await?;
            summary.detections_consumed += cluster.detection_ids.len();
        }

        info!(
            considered = summary.detections_considered,
            filtered = summary.detections_filtered,
            clusters = summary.clusters_found,
            created = summary.hazards_created,
            updated = summary.hazards_updated,
            consumed = summary.detections_consumed,
            noise = summary.noise,
            conflicts = summary.merge_conflicts,
            reconciled = summary.clusters_reconciled,
            "Aggregation pass complete"
        );

        Ok(summary)
    }

    /// Recompute every active hazard's confidence for its age as of `now` and
    /// retire the ones that have decayed away. Shares the aggregation lock.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepSummary, AggregationError> {
        let _guard = self.acquire().await?;
        let mut summary = SweepSummary::default();

        for hazard in self.hazards.list_active().await? {
            let tally = self.verifications.get_verification_tally(hazard.id).await?;
            let mut rescored = self.aggregator.rescore(&hazard, tally, now);
            let deactivate = self.aggregator.should_deactivate(&rescored, now);
            if deactivate {
                rescored.active = false;
            }
            if !deactivate && rescored == hazard {
                continue;
            }

            match self.hazards.update(rescored).await {
                Ok(updated) => {
                    summary.hazards_rescored += 1;
                    if !updated.active {
                        summary.hazards_deactivated += 1;
                        info!(
                            "Deactivated hazard {} (confidence {:.2})",
                            updated.id, updated.confidence
                        );
                    }
                }
                Err(StorageError::VersionConflict { id, .. }) => {
                    debug!("Hazard {} changed during sweep, leaving it for next time", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            rescored = summary.hazards_rescored,
            deactivated = summary.hazards_deactivated,
            "Decay sweep complete"
        );
        Ok(summary)
    }

    /// Store a user's verification vote and fold the new tally into the
    /// hazard's confidence. Does not take the aggregation lock.
    pub async fn record_verification(
        &self,
        hazard_id: HazardId,
        user_id: UserId,
        agrees: bool,
        now: DateTime<Utc>,
    ) -> Result<Hazard, AggregationError> {
        let mut tally = self
            .verifications
            .record_verification(Verification {
                hazard_id,
                user_id,
                agrees,
                recorded_at: now,
            })
            .await?;

        let attempts = self.config.max_merge_retries + 1;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tally = self.verifications.get_verification_tally(hazard_id).await?;
            }
            let current = self
                .hazards
                .get(hazard_id)
                .await?
                .ok_or(StorageError::NotFound)?;

            let rescored = self.aggregator.rescore(&current, tally, now);
            match self.hazards.update(rescored).await {
                Ok(updated) => {
                    debug!(
                        "Hazard {} verified ({}/{} agree), confidence {:.2}",
                        hazard_id, tally.positive, tally.total, updated.confidence
                    );
                    return Ok(updated);
                }
                Err(StorageError::VersionConflict { .. }) => {
                    debug!(
                        "Verification rescore of hazard {} conflicted (attempt {})",
                        hazard_id, attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AggregationError::MergeConflict { hazard_id, attempts })
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ()>, AggregationError> {
        let timeout_ms = self.config.lock_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.lock.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::counter!("aggregation_lock_contention_total").increment(1);
                warn!("Aggregation lock busy for {}ms, skipping", timeout_ms);
                Err(AggregationError::LockContention { timeout_ms })
            }
        }
    }

    /// Create or strengthen one hazard, re-reading candidates after each
    /// version conflict. Members a nearby hazard already absorbed are left out.
    async fn merge_cluster(
        &self,
        members: &[Detection],
        cluster: &ClusterSummary,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, AggregationError> {
        let attempts = self.config.max_merge_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let candidates = self
                .hazards
                .find_active_near(cluster.centroid, self.config.merge_radius_m)
                .await?;

            let absorbed: BTreeSet<DetectionId> = candidates
                .iter()
                .flat_map(|h| h.absorbed_detections.iter().copied())
                .filter(|id| cluster.detection_ids.binary_search(id).is_ok())
                .collect();
            let remaining;
            let pending = if absorbed.is_empty() {
                cluster
            } else {
                match ClusterSummary::from_members_excluding(members, &absorbed) {
                    Some(rest) => {
                        remaining = rest;
                        &remaining
                    }
                    None => {
                        let owner = candidates
                            .iter()
                            .find(|h| absorbed.iter().any(|id| h.absorbed_detections.contains(id)))
                            .map(|h| h.id)
                            .ok_or(StorageError::NotFound)?;
                        return Ok(MergeOutcome::AlreadyAbsorbed(owner));
                    }
                }
            };

            let hazard_id = match plan_merge(pending, &candidates, self.config.merge_radius_m) {
                MergeDecision::Create => {
                    let created = self.hazards.insert(self.aggregator.create(pending, now)).await?;
                    return Ok(MergeOutcome::Created(created));
                }
                MergeDecision::Strengthen(id) => id,
            };

            let current = candidates
                .iter()
                .find(|h| h.id == hazard_id)
                .ok_or(StorageError::NotFound)?;
            let tally = self.verifications.get_verification_tally(hazard_id).await?;
            let merged = self.aggregator.strengthen(current, pending, tally, now);

            match self.hazards.update(merged).await {
                Ok(updated) => return Ok(MergeOutcome::Strengthened(updated)),
                Err(StorageError::VersionConflict { expected, actual, .. }) => {
                    debug!(
                        "Hazard {} moved from version {} to {} (attempt {})",
                        hazard_id, expected, actual, attempt
                    );
                    if attempt >= attempts {
                        return Err(AggregationError::MergeConflict { hazard_id, attempts });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
