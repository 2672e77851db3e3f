//! Alerting configuration

use serde::{Deserialize, Serialize};

/// Alert engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertEngineConfig {
    /// Warning lead time for the most severe hazards (seconds, default: 20)
    pub base_lead_seconds: f64,
    /// Lead distance floor (meters, default: 50)
    pub min_alert_distance_m: f64,
    /// Lead distance ceiling, also the store search radius (meters, default: 1000)
    pub max_alert_distance_m: f64,
    /// At most one alert per this radius (meters, default: 500)
    pub suppression_radius_m: f64,
    /// Maximum alerts returned per query (default: 5)
    pub max_alerts: usize,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            base_lead_seconds: 20.0,
            min_alert_distance_m: 50.0,
            max_alert_distance_m: 1000.0,
            suppression_radius_m: 500.0,
            max_alerts: 5,
        }
    }
}

/// Caller-side cooldown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Do not re-surface the same hazard within this period (seconds, default: 300)
    pub cooldown_seconds: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
        }
    }
}
