//! Scoring configuration

use serde::{Deserialize, Serialize};

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Age (days) up to which a hazard keeps full recency weight (default: 30)
    pub temporal_weight_days: f64,
    /// Age (days) at which recency weight bottoms out (default: 90)
    pub confidence_decay_days: f64,
    /// Detection count at which the detection term saturates (default: 10)
    pub detection_saturation: f64,
    /// Unique user count at which the user term saturates (default: 5)
    pub user_saturation: f64,
    /// Weighted magnitude (g) that maps to the top of the severity scale (default: 5.0)
    pub max_magnitude_g: f64,
    /// Confidence below which a fully decayed hazard is deactivated (default: 0.3)
    pub deactivation_confidence: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            temporal_weight_days: 30.0,
            confidence_decay_days: 90.0,
            detection_saturation: 10.0,
            user_saturation: 5.0,
            max_magnitude_g: 5.0,
            deactivation_confidence: 0.3,
        }
    }
}
