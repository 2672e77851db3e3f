//! Alert Engine
//!
//! Stateless per call: reads active hazards near the driver and ranks them.

use std::sync::Arc;
use std::time::Instant;

use geo_distance::Coordinate;
use hazard_scoring::HazardType;
use serde::Serialize;
use storage::{HazardId, HazardStore};
use tracing::{debug, warn};

use crate::config::AlertEngineConfig;
use crate::ranking::{evaluate, rank_and_suppress, Candidate};
use crate::AlertError;

/// One upcoming-hazard warning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub hazard_id: HazardId,
    pub hazard_type: HazardType,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters from the query position
    pub distance_m: f64,
    /// Warning distance this hazard earned at the query speed
    pub lead_distance_m: f64,
    pub severity: f64,
    pub confidence: f64,
    pub priority: f64,
    /// e.g. "Severe pothole ahead in 300m"
    pub message: String,
}

impl From<Candidate> for Alert {
    fn from(candidate: Candidate) -> Self {
        let hazard = candidate.hazard;
        Self {
            hazard_id: hazard.id,
            hazard_type: hazard.hazard_type,
            latitude: hazard.centroid.lat(),
            longitude: hazard.centroid.lon(),
            distance_m: candidate.distance_m,
            lead_distance_m: candidate.lead_distance_m,
            severity: hazard.severity,
            confidence: hazard.confidence,
            priority: candidate.priority,
            message: alert_message(hazard.hazard_type, candidate.distance_m, hazard.severity),
        }
    }
}

/// "300m" below a kilometer, "1.2km" from there on
pub fn format_distance(distance_m: f64) -> String {
    if distance_m < 1000.0 {
        format!("{}m", distance_m.max(0.0) as u64)
    } else {
        format!("{:.1}km", distance_m / 1000.0)
    }
}

/// Severity word shown to the driver
pub fn severity_label(severity: f64) -> &'static str {
    if severity >= 7.0 {
        "Severe"
    } else if severity >= 4.0 {
        "Moderate"
    } else {
        "Minor"
    }
}

pub fn alert_message(hazard_type: HazardType, distance_m: f64, severity: f64) -> String {
    format!(
        "{} {} ahead in {}",
        severity_label(severity),
        hazard_type.description(),
        format_distance(distance_m)
    )
}

/// Ranks active hazards around a driver
pub struct AlertEngine {
    hazards: Arc<dyn HazardStore>,
    config: AlertEngineConfig,
}

impl AlertEngine {
    /// Create an engine, rejecting distances and lead times that cannot rank
    pub fn new(
        hazards: Arc<dyn HazardStore>,
        config: AlertEngineConfig,
    ) -> Result<Self, AlertError> {
        if !config.base_lead_seconds.is_finite() || config.base_lead_seconds <= 0.0 {
            return Err(AlertError::InvalidConfig(format!(
                "base_lead_seconds must be positive, got {}",
                config.base_lead_seconds
            )));
        }
        let (min, max) = (config.min_alert_distance_m, config.max_alert_distance_m);
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return Err(AlertError::InvalidConfig(format!(
                "alert distance bounds must satisfy 0 <= min <= max, got min={} max={}",
                min, max
            )));
        }
        if !config.suppression_radius_m.is_finite() || config.suppression_radius_m < 0.0 {
            return Err(AlertError::InvalidConfig(format!(
                "suppression_radius_m must be non-negative, got {}",
                config.suppression_radius_m
            )));
        }
        Ok(Self { hazards, config })
    }

    pub fn config(&self) -> &AlertEngineConfig {
        &self.config
    }

    /// Alerts for a driver at (`lat`, `lon`) moving at `speed_mps` (missing
    /// speed counts as stationary), highest priority first.
    ///
    /// No hazards nearby is an empty list; a store failure fails the query.
    pub async fn get_alerts(
        &self,
        lat: f64,
        lon: f64,
        speed_mps: Option<f64>,
    ) -> Result<Vec<Alert>, AlertError> {
        let started = Instant::now();
        metrics::counter!("alert_queries_total").increment(1);

        let position =
            Coordinate::new(lat, lon).map_err(|_| AlertError::InvalidCoordinate { lat, lon })?;
        let speed = match speed_mps {
            None => 0.0,
            Some(s) if s.is_finite() && s >= 0.0 => s,
            Some(s) => return Err(AlertError::InvalidSpeed(s)),
        };

        let nearby = self
            .hazards
            .find_active_near(position, self.config.max_alert_distance_m)
            .await
            .map_err(|e| {
                warn!("Alert query at ({}, {}) failed: {}", lat, lon, e);
                e
            })?;
        let considered = nearby.len();

        let candidates = nearby
            .into_iter()
            .filter_map(|hazard| evaluate(hazard, position, speed, &self.config))
            .collect();
        let alerts: Vec<Alert> = rank_and_suppress(
            candidates,
            self.config.suppression_radius_m,
            self.config.max_alerts,
        )
        .into_iter()
        .map(Alert::from)
        .collect();

        let elapsed = started.elapsed();
        metrics::histogram!("alert_query_duration_seconds").record(elapsed.as_secs_f64());
        debug!(
            considered,
            returned = alerts.len(),
            speed_mps = speed,
            elapsed_us = elapsed.as_micros() as u64,
            "Alert query"
        );

        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use geo_distance::distance;
    use hazard_scoring::MagnitudeSummary;
    use std::collections::BTreeSet;
    use storage::{Hazard, NewHazard, Repository, StorageError};

    fn new_hazard(lat: f64, lon: f64, severity: f64, confidence: f64) -> NewHazard {
        let now = Utc::now();
        NewHazard {
            centroid: Coordinate::new(lat, lon).unwrap(),
            hazard_type: HazardType::Pothole,
            severity,
            confidence,
            detection_count: 5,
            contributing_users: BTreeSet::new(),
            absorbed_detections: BTreeSet::new(),
            magnitudes: MagnitudeSummary::from_magnitudes(&[3.0, 4.0]),
            first_seen: now,
            last_seen: now,
            last_detection_at: now,
            positive_verifications: 0,
            verification_count: 0,
        }
    }

    fn engine(repo: &Arc<Repository>) -> AlertEngine {
        AlertEngine::new(repo.clone(), AlertEngineConfig::default()).unwrap()
    }

    #[test]
    fn test_message_formatting() {
        assert_eq!(format_distance(300.7), "300m");
        assert_eq!(format_distance(1234.0), "1.2km");
        assert_eq!(
            alert_message(HazardType::Pothole, 300.0, 8.0),
            "Severe pothole ahead in 300m"
        );
        assert_eq!(
            alert_message(HazardType::SpeedBump, 80.0, 4.0),
            "Moderate speed bump ahead in 80m"
        );
        assert_eq!(
            alert_message(HazardType::Unknown, 1500.0, 1.0),
            "Minor road hazard ahead in 1.5km"
        );
    }

    #[tokio::test]
    async fn test_worked_example_through_store() {
        let repo = Arc::new(Repository::new());
        // 0.0027 degrees of latitude is ~300 m
        repo.insert(new_hazard(0.0027, 0.0, 8.0, 0.9)).await.unwrap();

        let alerts = engine(&repo).get_alerts(0.0, 0.0, Some(20.0)).await.unwrap();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert!((alert.lead_distance_m - 360.0).abs() < 1e-9);
        assert!((alert.distance_m - 300.2).abs() < 0.5);
        assert!((alert.priority - 1.2).abs() < 0.01);
        assert!(alert.message.starts_with("Severe pothole ahead in 300m"));
    }

    #[tokio::test]
    async fn test_stationary_driver_sees_only_close_hazards() {
        let repo = Arc::new(Repository::new());
        repo.insert(new_hazard(0.0003, 0.0, 5.0, 0.8)).await.unwrap(); // ~33 m
        repo.insert(new_hazard(0.0009, 0.0, 5.0, 0.8)).await.unwrap(); // ~100 m

        let alerts = engine(&repo).get_alerts(0.0, 0.0, None).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].distance_m < 50.0);
    }

    #[tokio::test]
    async fn test_nearby_duplicates_suppressed() {
        let repo = Arc::new(Repository::new());
        repo.insert(new_hazard(0.0018, 0.0, 9.0, 0.9)).await.unwrap(); // ~200 m
        repo.insert(new_hazard(0.0020, 0.0, 4.0, 0.5)).await.unwrap(); // ~22 m beyond it
        repo.insert(new_hazard(-0.0036, 0.0, 6.0, 0.9)).await.unwrap(); // ~400 m behind

        let alerts = engine(&repo).get_alerts(0.0, 0.0, Some(30.0)).await.unwrap();
        assert_eq!(alerts.len(), 2);
        for pair in alerts.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
            let a = Coordinate::new(pair[0].latitude, pair[0].longitude).unwrap();
            let b = Coordinate::new(pair[1].latitude, pair[1].longitude).unwrap();
            assert!(distance(a, b) >= 500.0);
        }
        assert_eq!(alerts[0].severity, 9.0);
    }

    #[test]
    fn test_rejects_unusable_config() {
        let repo: Arc<dyn HazardStore> = Arc::new(Repository::new());
        let invalid = [
            AlertEngineConfig {
                max_alert_distance_m: 30.0,
                ..AlertEngineConfig::default()
            },
            AlertEngineConfig {
                min_alert_distance_m: f64::NAN,
                ..AlertEngineConfig::default()
            },
            AlertEngineConfig {
                max_alert_distance_m: f64::INFINITY,
                ..AlertEngineConfig::default()
            },
            AlertEngineConfig {
                min_alert_distance_m: -1.0,
                ..AlertEngineConfig::default()
            },
            AlertEngineConfig {
                base_lead_seconds: 0.0,
                ..AlertEngineConfig::default()
            },
            AlertEngineConfig {
                suppression_radius_m: -5.0,
                ..AlertEngineConfig::default()
            },
        ];
        for config in invalid {
            assert!(matches!(
                AlertEngine::new(repo.clone(), config),
                Err(AlertError::InvalidConfig(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_equal_distance_bounds_rank_without_panicking() {
        let repo = Arc::new(Repository::new());
        repo.insert(new_hazard(0.0001, 0.0, 6.0, 0.9)).await.unwrap(); // ~11 m

        let config = AlertEngineConfig {
            min_alert_distance_m: 30.0,
            max_alert_distance_m: 30.0,
            ..AlertEngineConfig::default()
        };
        let engine = AlertEngine::new(repo.clone(), config).unwrap();
        let alerts = engine.get_alerts(0.0, 0.0, Some(10.0)).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!((alerts[0].lead_distance_m - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_hazards_is_empty_list() {
        let repo = Arc::new(Repository::new());
        let alerts = engine(&repo).get_alerts(45.0, 9.0, Some(25.0)).await.unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_queries_are_identical() {
        let repo = Arc::new(Repository::new());
        repo.insert(new_hazard(0.001, 0.0, 7.0, 0.7)).await.unwrap();
        repo.insert(new_hazard(0.0, 0.006, 3.0, 0.9)).await.unwrap();
        let engine = engine(&repo);

        let first = engine.get_alerts(0.0, 0.0, Some(25.0)).await.unwrap();
        let second = engine.get_alerts(0.0, 0.0, Some(25.0)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let repo = Arc::new(Repository::new());
        let engine = engine(&repo);

        assert!(matches!(
            engine.get_alerts(91.0, 0.0, None).await,
            Err(AlertError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            engine.get_alerts(0.0, f64::NAN, None).await,
            Err(AlertError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            engine.get_alerts(0.0, 0.0, Some(-1.0)).await,
            Err(AlertError::InvalidSpeed(_))
        ));
        assert!(matches!(
            engine.get_alerts(0.0, 0.0, Some(f64::INFINITY)).await,
            Err(AlertError::InvalidSpeed(_))
        ));
    }

    /// Store that is always down
    struct DownStore;

    #[async_trait]
    impl HazardStore for DownStore {
        async fn find_active_near(
            &self,
            _center: Coordinate,
            _radius_m: f64,
        ) -> Result<Vec<Hazard>, StorageError> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn get(&self, _id: HazardId) -> Result<Option<Hazard>, StorageError> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn insert(&self, _hazard: NewHazard) -> Result<Hazard, StorageError> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn update(&self, _hazard: Hazard) -> Result<Hazard, StorageError> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn list_active(&self) -> Result<Vec<Hazard>, StorageError> {
            Err(StorageError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_query() {
        let engine = AlertEngine::new(Arc::new(DownStore), AlertEngineConfig::default()).unwrap();
        assert!(matches!(
            engine.get_alerts(0.0, 0.0, Some(10.0)).await,
            Err(AlertError::Store(StorageError::Unavailable(_)))
        ));
    }
}
