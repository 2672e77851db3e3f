//! Alert Routes

use alerting::{Alert, AlertCooldown};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::{ApiResult, AppState};

/// Query parameters for alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub lat: f64,
    pub lon: f64,
    /// Missing means stationary
    pub speed_mps: Option<f64>,
    /// Opaque driver session; enables repeat suppression
    pub session: Option<String>,
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub alerts: Vec<Alert>,
    pub count: usize,
}

/// Get ranked alerts for a position
pub async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQuery>,
) -> ApiResult<Json<AlertResponse>> {
    let mut alerts = state
        .alerts
        .get_alerts(params.lat, params.lon, params.speed_mps)
        .await?;

    if let Some(session) = params.session {
        let now = Instant::now();
        let mut cooldowns = state.cooldowns.lock().await;
        evict_idle_sessions(&mut cooldowns, now);

        let mut cooldown = cooldowns
            .remove(&session)
            .unwrap_or_else(|| AlertCooldown::new(state.cooldown_config.clone()));
        alerts = cooldown.filter_at(alerts, now);
        if !cooldown.is_empty() {
            cooldowns.insert(session, cooldown);
        }
    }

    Ok(Json(AlertResponse {
        count: alerts.len(),
        alerts,
    }))
}

/// Expire cooldown entries in every session and forget sessions left with none
pub(crate) fn evict_idle_sessions(cooldowns: &mut HashMap<String, AlertCooldown>, now: Instant) {
    cooldowns.retain(|_, cooldown| {
        cooldown.prune_at(now);
        !cooldown.is_empty()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::CooldownConfig;
    use std::time::Duration;
    use storage::HazardId;

    #[test]
    fn test_idle_sessions_are_evicted() {
        let start = Instant::now();
        let config = CooldownConfig {
            cooldown_seconds: 300,
        };
        let mut cooldowns = HashMap::new();

        let mut active = AlertCooldown::new(config.clone());
        active.record_at(HazardId(1), start);
        cooldowns.insert("car-1".to_string(), active);
        cooldowns.insert("car-2".to_string(), AlertCooldown::new(config));

        evict_idle_sessions(&mut cooldowns, start + Duration::from_secs(10));
        assert_eq!(cooldowns.len(), 1);
        assert!(cooldowns.contains_key("car-1"));

        evict_idle_sessions(&mut cooldowns, start + Duration::from_secs(301));
        assert!(cooldowns.is_empty());
    }
}
