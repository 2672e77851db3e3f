//! Store Contracts
//!
//! The engine only talks to persistence through these traits, so services are
//! constructed with whatever implementation the deployment provides.

use async_trait::async_trait;
use geo_distance::Coordinate;

use crate::records::{
    Detection, DetectionId, Hazard, HazardId, NewDetection, NewHazard, Region, Verification,
    VerificationTally,
};
use crate::StorageError;

/// Source of raw detections
#[async_trait]
pub trait DetectionSource: Send + Sync {
    /// Persist a validated detection and return it with its id
    async fn insert_detection(&self, detection: NewDetection) -> Result<Detection, StorageError>;

    /// Detections that have not contributed to a hazard yet, ascending by id
    async fn fetch_unconsumed_detections(
        &self,
        region: Option<Region>,
    ) -> Result<Vec<Detection>, StorageError>;

    /// Flag detections as consumed; all or nothing
    async fn mark_consumed(&self, ids: &[DetectionId]) -> Result<(), StorageError>;
}

/// Point store for hazards
#[async_trait]
pub trait HazardStore: Send + Sync {
    /// Active hazards within `radius_m` of `center`, nearest first
    async fn find_active_near(
        &self,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<Vec<Hazard>, StorageError>;

    async fn get(&self, id: HazardId) -> Result<Option<Hazard>, StorageError>;

    /// Insert half of the upsert contract: assigns id and initial version
    async fn insert(&self, hazard: NewHazard) -> Result<Hazard, StorageError>;

    /// Update half of the upsert contract.
    ///
    /// Succeeds only when `hazard.version` matches the stored version, otherwise
    /// fails with [`StorageError::VersionConflict`]. Returns the stored record
    /// with its new version.
    async fn update(&self, hazard: Hazard) -> Result<Hazard, StorageError>;

    /// Every active hazard, ascending by id
    async fn list_active(&self) -> Result<Vec<Hazard>, StorageError>;
}

/// Source of user verifications
#[async_trait]
pub trait VerificationSource: Send + Sync {
    async fn get_verification_tally(&self, id: HazardId) -> Result<VerificationTally, StorageError>;

    /// Record a vote and return the updated tally. A user's later vote on the
    /// same hazard replaces their earlier one.
    async fn record_verification(
        &self,
        verification: Verification,
    ) -> Result<VerificationTally, StorageError>;
}
