//! Merge decisions between clusters and existing hazards.
//!
//! Everything here is pure: the job driver feeds in what it read from the
//! stores and writes back what these functions return.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use geo_distance::{centroid, distance, weighted_midpoint, Coordinate};
use hazard_scoring::{
    age_days, ConfidenceInputs, ConfidenceScorer, HazardType, MagnitudeSummary, ScoringConfig,
};
use storage::{Detection, DetectionId, Hazard, HazardId, NewHazard, UserId, VerificationTally};

/// What a cluster contributes to a hazard
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    /// Equal-weight mean of member coordinates
    pub centroid: Coordinate,
    /// Members that had not been consumed yet, ascending
    pub detection_ids: Vec<DetectionId>,
    pub users: BTreeSet<UserId>,
    pub magnitudes: MagnitudeSummary,
    /// Newest capture timestamp among the members
    pub newest_capture: DateTime<Utc>,
}

impl ClusterSummary {
    /// Summarize the not-yet-consumed members; `None` if there are none
    pub fn from_members(members: &[Detection]) -> Option<Self> {
        Self::from_members_excluding(members, &BTreeSet::new())
    }

    /// Like [`ClusterSummary::from_members`], also leaving out members a hazard
    /// has already absorbed
    pub fn from_members_excluding(
        members: &[Detection],
        absorbed: &BTreeSet<DetectionId>,
    ) -> Option<Self> {
        let fresh: Vec<&Detection> = members
            .iter()
            .filter(|d| !d.consumed && !absorbed.contains(&d.id))
            .collect();
        let newest_capture = fresh.iter().map(|d| d.captured_at).max()?;

        let coords: Vec<Coordinate> = fresh.iter().map(|d| d.coordinate).collect();
        let magnitudes: Vec<f64> = fresh.iter().map(|d| d.magnitude_g).collect();
        let mut detection_ids: Vec<DetectionId> = fresh.iter().map(|d| d.id).collect();
        detection_ids.sort_unstable();

        Some(Self {
            centroid: centroid(&coords)?,
            detection_ids,
            users: fresh.iter().map(|d| d.user_id).collect(),
            magnitudes: MagnitudeSummary::from_magnitudes(&magnitudes),
            newest_capture,
        })
    }

    /// Number of new detections this cluster contributes
    pub fn count(&self) -> u64 {
        self.detection_ids.len() as u64
    }
}

/// Outcome of matching a cluster against nearby hazards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No active hazard nearby: create one
    Create,
    /// Fold the cluster into this hazard
    Strengthen(HazardId),
}

/// Pick the nearest active hazard within `merge_radius_m` of the cluster centroid.
///
/// Equal distances resolve to the lower hazard id.
pub fn plan_merge(
    summary: &ClusterSummary,
    candidates: &[Hazard],
    merge_radius_m: f64,
) -> MergeDecision {
    candidates
        .iter()
        .filter(|h| h.active)
        .map(|h| (distance(summary.centroid, h.centroid), h.id))
        .filter(|(d, _)| *d <= merge_radius_m)
        .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map_or(MergeDecision::Create, |(_, id)| MergeDecision::Strengthen(id))
}

/// Computes hazard fields from cluster summaries and verification tallies
#[derive(Debug, Clone, Default)]
pub struct HazardAggregator {
    scorer: ConfidenceScorer,
}

impl HazardAggregator {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            scorer: ConfidenceScorer::new(config),
        }
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    /// A brand-new hazard for a cluster with no active hazard nearby
    pub fn create(&self, summary: &ClusterSummary, now: DateTime<Utc>) -> NewHazard {
        let tally = VerificationTally::default();
        let confidence = self.confidence(
            summary.count(),
            summary.users.len() as u64,
            summary.newest_capture,
            tally,
            now,
        );

        NewHazard {
            centroid: summary.centroid,
            hazard_type: HazardType::classify(&summary.magnitudes),
            severity: self.severity(&summary.magnitudes),
            confidence,
            detection_count: summary.count(),
            contributing_users: summary.users.clone(),
            absorbed_detections: summary.detection_ids.iter().copied().collect(),
            magnitudes: summary.magnitudes,
            first_seen: now,
            last_seen: now,
            last_detection_at: summary.newest_capture,
            positive_verifications: tally.positive,
            verification_count: tally.total,
        }
    }

    /// Fold a cluster into an existing hazard. Id, version, first-seen and the
    /// active flag carry over; the store bumps the version on write.
    ///
    /// The summary must not contain detections the hazard already absorbed.
    pub fn strengthen(
        &self,
        hazard: &Hazard,
        summary: &ClusterSummary,
        tally: VerificationTally,
        now: DateTime<Utc>,
    ) -> Hazard {
        let mut merged = hazard.clone();

        merged.centroid = weighted_midpoint(
            hazard.centroid,
            hazard.detection_count as f64,
            summary.centroid,
            summary.count() as f64,
        );
        merged.detection_count = hazard.detection_count + summary.count();
        merged.contributing_users.extend(summary.users.iter().copied());
        merged
            .absorbed_detections
            .extend(summary.detection_ids.iter().copied());
        merged.magnitudes = hazard.magnitudes.merge(&summary.magnitudes);
        merged.severity = self.severity(&merged.magnitudes);
        merged.hazard_type = HazardType::classify(&merged.magnitudes);
        merged.last_seen = now;
        merged.last_detection_at = hazard.last_detection_at.max(summary.newest_capture);

        self.apply_confidence(&mut merged, tally, now);
        merged
    }

    /// Recompute confidence for the hazard's current age and tally
    pub fn rescore(&self, hazard: &Hazard, tally: VerificationTally, now: DateTime<Utc>) -> Hazard {
        let mut rescored = hazard.clone();
        self.apply_confidence(&mut rescored, tally, now);
        rescored
    }

    /// Whether the hazard has decayed far enough to be retired
    pub fn should_deactivate(&self, hazard: &Hazard, now: DateTime<Utc>) -> bool {
        self.scorer
            .should_deactivate(age_days(hazard.last_detection_at, now), hazard.confidence)
    }

    fn apply_confidence(&self, hazard: &mut Hazard, tally: VerificationTally, now: DateTime<Utc>) {
        hazard.confidence = self.confidence(
            hazard.detection_count,
            hazard.unique_user_count(),
            hazard.last_detection_at,
            tally,
            now,
        );
        hazard.positive_verifications = tally.positive;
        hazard.verification_count = tally.total;
    }

    fn confidence(
        &self,
        detection_count: u64,
        unique_user_count: u64,
        last_detection_at: DateTime<Utc>,
        tally: VerificationTally,
        now: DateTime<Utc>,
    ) -> f64 {
        self.scorer.score(&ConfidenceInputs {
            detection_count,
            unique_user_count,
            days_since_last_detection: age_days(last_detection_at, now),
            positive_verifications: tally.positive,
            total_verifications: tally.total,
        })
    }

    fn severity(&self, magnitudes: &MagnitudeSummary) -> f64 {
        magnitudes.severity(self.scorer.config().max_magnitude_g)
    }
}
