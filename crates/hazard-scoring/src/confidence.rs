//! Confidence Scoring with Temporal Decay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;

/// Budget of each confidence component
const DETECTION_WEIGHT: f64 = 0.4;
const USER_WEIGHT: f64 = 0.3;
const RECENCY_WEIGHT: f64 = 0.2;
const VERIFICATION_WEIGHT: f64 = 0.1;

/// Recency weight floor for fully decayed hazards
const RECENCY_FLOOR: f64 = 0.1;

/// Summary statistics a confidence score is computed from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInputs {
    pub detection_count: u64,
    pub unique_user_count: u64,
    /// Days since the most recent detection; fractional
    pub days_since_last_detection: f64,
    pub positive_verifications: u64,
    pub total_verifications: u64,
}

/// Individual terms of a confidence score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub detection: f64,
    pub users: f64,
    pub recency: f64,
    pub verification: f64,
    /// Sum of the terms, clamped to [0, 1]
    pub total: f64,
}

/// Converts a hazard's detection history into a bounded confidence value
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    /// Create a scorer
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Confidence in [0, 1]
    pub fn score(&self, inputs: &ConfidenceInputs) -> f64 {
        self.breakdown(inputs).total
    }

    /// Confidence with each term exposed
    pub fn breakdown(&self, inputs: &ConfidenceInputs) -> ConfidenceBreakdown {
        let detection = DETECTION_WEIGHT.min(
            inputs.detection_count as f64 / self.config.detection_saturation * DETECTION_WEIGHT,
        );
        let users = USER_WEIGHT
            .min(inputs.unique_user_count as f64 / self.config.user_saturation * USER_WEIGHT);
        let recency = self.recency_weight(inputs.days_since_last_detection) * RECENCY_WEIGHT;
        let verification = if inputs.total_verifications > 0 {
            let ratio = inputs.positive_verifications.min(inputs.total_verifications) as f64
                / inputs.total_verifications as f64;
            ratio * VERIFICATION_WEIGHT
        } else {
            0.0
        };

        let total = (detection + users + recency + verification).clamp(0.0, 1.0);

        ConfidenceBreakdown {
            detection,
            users,
            recency,
            verification,
            total,
        }
    }

    /// Piecewise-linear recency weight: 1.0 while fresh, linear decay, then a 0.1 floor
    pub fn recency_weight(&self, days: f64) -> f64 {
        let fresh = self.config.temporal_weight_days;
        let stale = self.config.confidence_decay_days;
        // Clock skew can produce negative ages; treat them as brand new
        let days = if days.is_nan() { stale } else { days.max(0.0) };

        if days <= fresh {
            1.0
        } else if days >= stale {
            RECENCY_FLOOR
        } else {
            1.0 - (1.0 - RECENCY_FLOOR) * ((days - fresh) / (stale - fresh))
        }
    }

    /// Whether a hazard is old and weak enough to be considered repaired
    pub fn should_deactivate(&self, days_since_last_detection: f64, confidence: f64) -> bool {
        days_since_last_detection > self.config.confidence_decay_days
            && confidence < self.config.deactivation_confidence
    }
}

/// Fractional days from `earlier` to `later`
pub fn age_days(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 86_400_000.0
}
