//! Domain Records

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use geo_distance::Coordinate;
use hazard_scoring::{HazardType, MagnitudeSummary, MAX_SEVERITY};
use serde::{Deserialize, Serialize};
use spatial_clustering::ClusterPoint;
use uuid::Uuid;

use crate::StorageError;

/// Store-assigned detection id; ascending order is the canonical processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionId(pub u64);

/// Store-assigned hazard id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HazardId(pub u64);

/// Reporting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl fmt::Display for DetectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for HazardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A detection as submitted by a client, before the store assigns an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDetection {
    pub coordinate: Coordinate,
    /// Horizontal GPS accuracy (meters)
    pub accuracy_m: f64,
    /// Signed magnitude of the triggering motion event (g)
    pub magnitude_g: f64,
    pub captured_at: DateTime<Utc>,
    pub user_id: UserId,
}

impl NewDetection {
    /// Check record invariants; coordinates are validated by their type
    pub fn validate(&self) -> Result<(), StorageError> {
        if !self.accuracy_m.is_finite() || self.accuracy_m < 0.0 {
            return Err(StorageError::InvalidRecord(format!(
                "accuracy must be a non-negative number of meters, got {}",
                self.accuracy_m
            )));
        }
        if !self.magnitude_g.is_finite() {
            return Err(StorageError::InvalidRecord(format!(
                "magnitude must be finite, got {}",
                self.magnitude_g
            )));
        }
        Ok(())
    }
}

/// A stored detection. Immutable apart from the consumed flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: DetectionId,
    pub coordinate: Coordinate,
    pub accuracy_m: f64,
    pub magnitude_g: f64,
    pub captured_at: DateTime<Utc>,
    pub user_id: UserId,
    /// Whether it has already contributed to a hazard
    pub consumed: bool,
}

impl ClusterPoint for Detection {
    fn point_id(&self) -> u64 {
        self.id.0
    }

    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }
}

/// Hazard fields computed by the aggregator, before the store assigns id and version
#[derive(Debug, Clone, PartialEq)]
pub struct NewHazard {
    pub centroid: Coordinate,
    pub hazard_type: HazardType,
    pub severity: f64,
    pub confidence: f64,
    pub detection_count: u64,
    pub contributing_users: BTreeSet<UserId>,
    pub absorbed_detections: BTreeSet<DetectionId>,
    pub magnitudes: MagnitudeSummary,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_detection_at: DateTime<Utc>,
    pub positive_verifications: u64,
    pub verification_count: u64,
}

/// Aggregated hazard record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hazard {
    pub id: HazardId,
    /// Bumped by the store on every successful update
    pub version: u64,
    pub centroid: Coordinate,
    pub hazard_type: HazardType,
    /// 0-10
    pub severity: f64,
    /// 0-1
    pub confidence: f64,
    pub detection_count: u64,
    /// Used for scoring only; never serialized
    #[serde(skip)]
    pub contributing_users: BTreeSet<UserId>,
    /// Detections already folded into this hazard; a replayed cluster skips them
    #[serde(skip)]
    pub absorbed_detections: BTreeSet<DetectionId>,
    pub magnitudes: MagnitudeSummary,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Newest capture time among contributing detections
    pub last_detection_at: DateTime<Utc>,
    pub positive_verifications: u64,
    pub verification_count: u64,
    pub active: bool,
}

impl Hazard {
    /// Build the stored form of a new hazard
    pub fn from_new(id: HazardId, new: NewHazard) -> Self {
        Self {
            id,
            version: 0,
            centroid: new.centroid,
            hazard_type: new.hazard_type,
            severity: new.severity,
            confidence: new.confidence,
            detection_count: new.detection_count,
            contributing_users: new.contributing_users,
            absorbed_detections: new.absorbed_detections,
            magnitudes: new.magnitudes,
            first_seen: new.first_seen,
            last_seen: new.last_seen,
            last_detection_at: new.last_detection_at,
            positive_verifications: new.positive_verifications,
            verification_count: new.verification_count,
            active: true,
        }
    }

    /// Number of distinct reporting users
    pub fn unique_user_count(&self) -> u64 {
        self.contributing_users.len() as u64
    }

    /// Check score ranges before the record is written
    pub fn validate(&self) -> Result<(), StorageError> {
        validate_scores(self.severity, self.confidence)
    }
}

impl NewHazard {
    /// Check score ranges before the record is written
    pub fn validate(&self) -> Result<(), StorageError> {
        validate_scores(self.severity, self.confidence)
    }
}

fn validate_scores(severity: f64, confidence: f64) -> Result<(), StorageError> {
    if !(0.0..=MAX_SEVERITY).contains(&severity) {
        return Err(StorageError::InvalidRecord(format!(
            "severity {} outside [0, {}]",
            severity, MAX_SEVERITY
        )));
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(StorageError::InvalidRecord(format!(
            "confidence {} outside [0, 1]",
            confidence
        )));
    }
    Ok(())
}

/// A user's agree/disagree vote on a hazard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub hazard_id: HazardId,
    pub user_id: UserId,
    pub agrees: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Verification counts for one hazard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationTally {
    pub positive: u64,
    pub total: u64,
}

/// Circular area used to scope detection fetches
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub center: Coordinate,
    pub radius_m: f64,
}

/// Store-wide counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreStats {
    pub detections_total: usize,
    pub detections_unconsumed: usize,
    pub hazards_total: usize,
    pub hazards_active: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_detection(accuracy_m: f64, magnitude_g: f64) -> NewDetection {
        NewDetection {
            coordinate: Coordinate::new(37.7749, -122.4194).unwrap(),
            accuracy_m,
            magnitude_g,
            captured_at: Utc::now(),
            user_id: UserId(Uuid::new_v4()),
        }
    }

    #[test]
    fn test_detection_validation() {
        assert!(new_detection(4.0, -2.5).validate().is_ok());
        assert!(new_detection(0.0, 0.0).validate().is_ok());
        assert!(new_detection(-1.0, 1.0).validate().is_err());
        assert!(new_detection(f64::NAN, 1.0).validate().is_err());
        assert!(new_detection(3.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_score_validation() {
        assert!(validate_scores(0.0, 0.0).is_ok());
        assert!(validate_scores(10.0, 1.0).is_ok());
        assert!(validate_scores(10.5, 0.5).is_err());
        assert!(validate_scores(5.0, 1.01).is_err());
        assert!(validate_scores(f64::NAN, 0.5).is_err());
    }
}
