//! Storage Layer
//!
//! Detection, hazard, and verification records, the store contracts the
//! engine is written against, and an in-memory repository implementing them.

mod records;
mod repository;
mod store;

pub use records::{
    Detection, DetectionId, Hazard, HazardId, NewDetection, NewHazard, Region, StoreStats,
    UserId, Verification, VerificationTally,
};
pub use repository::Repository;
pub use store::{DetectionSource, HazardStore, VerificationSource};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Record not found")]
    NotFound,
    #[error("Hazard {id} was modified concurrently: expected version {expected}, found {actual}")]
    VersionConflict { id: u64, expected: u64, actual: u64 },
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
