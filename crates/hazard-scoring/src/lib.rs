//! Confidence & Temporal-Decay Scorer
//!
//! Pure scoring functions used by the hazard aggregator:
//! - Confidence from detection count, unique users, recency, and verifications
//! - Severity from the distribution of triggering magnitudes
//! - Hazard type classification and the deactivation rule

mod confidence;
mod config;
mod severity;

pub use confidence::{age_days, ConfidenceBreakdown, ConfidenceInputs, ConfidenceScorer};
pub use config::ScoringConfig;
pub use severity::{HazardType, MagnitudeSummary, MAX_SEVERITY};
