//! Caller-side alert cooldown
//!
//! The engine is stateless; a driver session keeps one of these to avoid
//! re-announcing the same hazard every few seconds.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use storage::HazardId;
use tracing::debug;

use crate::config::CooldownConfig;
use crate::engine::Alert;

/// Surfacing history of one hazard
#[derive(Debug, Clone)]
pub struct CooldownState {
    /// Last time this hazard was shown
    pub last_surfaced: Instant,
    /// Number of times shown
    pub surface_count: usize,
}

/// Per-session record of which hazards were recently shown
#[derive(Debug, Clone)]
pub struct AlertCooldown {
    config: CooldownConfig,
    states: HashMap<HazardId, CooldownState>,
}

impl AlertCooldown {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.config.cooldown_seconds)
    }

    /// Whether `hazard_id` may be shown at `now`
    pub fn should_surface_at(&self, hazard_id: HazardId, now: Instant) -> bool {
        match self.states.get(&hazard_id) {
            Some(state) => now.saturating_duration_since(state.last_surfaced) >= self.cooldown(),
            None => true,
        }
    }

    /// Record that `hazard_id` was shown at `now`
    pub fn record_at(&mut self, hazard_id: HazardId, now: Instant) {
        let state = self.states.entry(hazard_id).or_insert(CooldownState {
            last_surfaced: now,
            surface_count: 0,
        });
        state.last_surfaced = now;
        state.surface_count += 1;
    }

    /// Drop alerts still cooling down and record the rest as shown
    pub fn filter_at(&mut self, alerts: Vec<Alert>, now: Instant) -> Vec<Alert> {
        let before = alerts.len();
        let fresh: Vec<Alert> = alerts
            .into_iter()
            .filter(|alert| self.should_surface_at(alert.hazard_id, now))
            .collect();
        for alert in &fresh {
            self.record_at(alert.hazard_id, now);
        }
        if fresh.len() < before {
            debug!("Cooldown held back {} alerts", before - fresh.len());
        }
        fresh
    }

    /// Forget hazards whose cooldown has run out
    pub fn prune_at(&mut self, now: Instant) {
        let cooldown = self.cooldown();
        self.states
            .retain(|_, state| now.saturating_duration_since(state.last_surfaced) < cooldown);
    }

    pub fn state(&self, hazard_id: HazardId) -> Option<&CooldownState> {
        self.states.get(&hazard_id)
    }

    /// Number of hazards currently tracked
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for AlertCooldown {
    fn default() -> Self {
        Self::new(CooldownConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazard_scoring::HazardType;

    fn alert(id: u64) -> Alert {
        Alert {
            hazard_id: HazardId(id),
            hazard_type: HazardType::Pothole,
            latitude: 0.0,
            longitude: 0.0,
            distance_m: 100.0,
            lead_distance_m: 300.0,
            severity: 6.0,
            confidence: 0.7,
            priority: 2.8,
            message: "Moderate pothole ahead in 100m".into(),
        }
    }

    #[test]
    fn test_repeat_suppressed_within_cooldown() {
        let mut cooldown = AlertCooldown::default();
        let start = Instant::now();

        assert_eq!(cooldown.filter_at(vec![alert(1), alert(2)], start).len(), 2);

        let soon = start + Duration::from_secs(60);
        let shown = cooldown.filter_at(vec![alert(1), alert(3)], soon);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].hazard_id, HazardId(3));
    }

    #[test]
    fn test_resurfaces_after_cooldown() {
        let mut cooldown = AlertCooldown::new(CooldownConfig {
            cooldown_seconds: 30,
        });
        let start = Instant::now();
        cooldown.record_at(HazardId(7), start);

        assert!(!cooldown.should_surface_at(HazardId(7), start + Duration::from_secs(29)));
        assert!(cooldown.should_surface_at(HazardId(7), start + Duration::from_secs(30)));

        cooldown.record_at(HazardId(7), start + Duration::from_secs(30));
        assert_eq!(cooldown.state(HazardId(7)).unwrap().surface_count, 2);
    }

    #[test]
    fn test_prune_forgets_expired_entries() {
        let mut cooldown = AlertCooldown::default();
        let start = Instant::now();
        cooldown.record_at(HazardId(1), start);
        cooldown.record_at(HazardId(2), start + Duration::from_secs(200));

        cooldown.prune_at(start + Duration::from_secs(400));
        assert_eq!(cooldown.len(), 1);
        assert!(cooldown.state(HazardId(2)).is_some());

        cooldown.prune_at(start + Duration::from_secs(600));
        assert!(cooldown.is_empty());
    }
}
