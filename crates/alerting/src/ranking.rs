//! Lead distance, priority, and suppression rules.
//!
//! Pure functions over hazards already fetched from the store.

use geo_distance::{distance, Coordinate};
use hazard_scoring::MAX_SEVERITY;
use storage::Hazard;

use crate::config::AlertEngineConfig;

/// Maps severity 0-10 onto 0.5-1.0: the worst hazards get the full lead time
pub fn severity_factor(severity: f64) -> f64 {
    0.5 + severity.clamp(0.0, MAX_SEVERITY) / MAX_SEVERITY * 0.5
}

/// Distance covered during the hazard's lead time, before clamping
pub fn raw_alert_distance(speed_mps: f64, severity: f64, config: &AlertEngineConfig) -> f64 {
    speed_mps * config.base_lead_seconds * severity_factor(severity)
}

/// Per-hazard warning distance, clamped to the configured bounds
pub fn lead_distance(speed_mps: f64, severity: f64, config: &AlertEngineConfig) -> f64 {
    raw_alert_distance(speed_mps, severity, config)
        .clamp(config.min_alert_distance_m, config.max_alert_distance_m)
}

/// Nearer, more severe, more trusted hazards rank higher
pub fn priority(severity: f64, confidence: f64, distance_m: f64, lead_distance_m: f64) -> f64 {
    if lead_distance_m <= 0.0 {
        return 0.0;
    }
    severity * confidence * (1.0 - distance_m / lead_distance_m)
}

/// A hazard inside its own lead distance
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub hazard: Hazard,
    pub distance_m: f64,
    pub lead_distance_m: f64,
    pub priority: f64,
}

/// Score one hazard against the driver's position; `None` if it is inactive
/// or still beyond its lead distance
pub fn evaluate(
    hazard: Hazard,
    position: Coordinate,
    speed_mps: f64,
    config: &AlertEngineConfig,
) -> Option<Candidate> {
    if !hazard.active {
        return None;
    }
    let distance_m = distance(position, hazard.centroid);
    let lead_distance_m = lead_distance(speed_mps, hazard.severity, config);
    if distance_m > lead_distance_m {
        return None;
    }

    let priority = priority(hazard.severity, hazard.confidence, distance_m, lead_distance_m);
    Some(Candidate {
        hazard,
        distance_m,
        lead_distance_m,
        priority,
    })
}

/// Sort by priority (ties: nearer first, then lower hazard id), then keep a
/// hazard only if it is at least `suppression_radius_m` from every hazard
/// already kept. Stops after `max_alerts`.
pub fn rank_and_suppress(
    mut candidates: Vec<Candidate>,
    suppression_radius_m: f64,
    max_alerts: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| a.distance_m.total_cmp(&b.distance_m))
            .then_with(|| a.hazard.id.cmp(&b.hazard.id))
    });

    let mut accepted: Vec<Candidate> = Vec::with_capacity(max_alerts.min(candidates.len()));
    for candidate in candidates {
        if accepted.len() >= max_alerts {
            break;
        }
        let suppressed = accepted.iter().any(|kept| {
            distance(kept.hazard.centroid, candidate.hazard.centroid) < suppression_radius_m
        });
        if !suppressed {
            accepted.push(candidate);
        }
    }
    accepted
}
