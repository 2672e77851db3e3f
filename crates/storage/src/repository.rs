//! Repository Implementation

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use geo_distance::{distance, Coordinate};
use tracing::{debug, info, warn};

use crate::records::{
    Detection, DetectionId, Hazard, HazardId, NewDetection, NewHazard, Region, StoreStats,
    UserId, Verification, VerificationTally,
};
use crate::store::{DetectionSource, HazardStore, VerificationSource};
use crate::StorageError;

/// In-memory repository implementing every store contract
pub struct Repository {
    /// Detections by id
    detections: Mutex<BTreeMap<DetectionId, Detection>>,
    /// Hazards by id
    hazards: Mutex<BTreeMap<HazardId, Hazard>>,
    /// Latest vote per (hazard, user)
    verifications: Mutex<HashMap<(HazardId, UserId), Verification>>,
    /// Next detection ID
    next_detection_id: AtomicU64,
    /// Next hazard ID
    next_hazard_id: AtomicU64,
    /// Cleared to simulate an outage
    available: AtomicBool,
}

impl Repository {
    /// Create an empty in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            detections: Mutex::new(BTreeMap::new()),
            hazards: Mutex::new(BTreeMap::new()),
            verifications: Mutex::new(HashMap::new()),
            next_detection_id: AtomicU64::new(1),
            next_hazard_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability; while unavailable every operation fails (for testing)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Store-wide counts
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        self.ensure_available()?;
        let detections = lock(&self.detections)?;
        let hazards = lock(&self.hazards)?;
        Ok(StoreStats {
            detections_total: detections.len(),
            detections_unconsumed: detections.values().filter(|d| !d.consumed).count(),
            hazards_total: hazards.len(),
            hazards_active: hazards.values().filter(|h| h.active).count(),
        })
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("repository offline".to_string()))
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Unavailable(format!("Lock error: {}", e)))
}

#[async_trait]
impl DetectionSource for Repository {
    async fn insert_detection(&self, detection: NewDetection) -> Result<Detection, StorageError> {
        self.ensure_available()?;
        detection.validate()?;

        let mut detections = lock(&self.detections)?;
        let id = DetectionId(self.next_detection_id.fetch_add(1, Ordering::SeqCst));
        let stored = Detection {
            id,
            coordinate: detection.coordinate,
            accuracy_m: detection.accuracy_m,
            magnitude_g: detection.magnitude_g,
            captured_at: detection.captured_at,
            user_id: detection.user_id,
            consumed: false,
        };
        detections.insert(id, stored.clone());
        debug!("Inserted detection {}", id);
        Ok(stored)
    }

    async fn fetch_unconsumed_detections(
        &self,
        region: Option<Region>,
    ) -> Result<Vec<Detection>, StorageError> {
        self.ensure_available()?;
        let detections = lock(&self.detections)?;
        Ok(detections
            .values()
            .filter(|d| !d.consumed)
            .filter(|d| region.map_or(true, |r| distance(r.center, d.coordinate) <= r.radius_m))
            .cloned()
            .collect())
    }

    async fn mark_consumed(&self, ids: &[DetectionId]) -> Result<(), StorageError> {
        self.ensure_available()?;
        let mut detections = lock(&self.detections)?;

        if let Some(missing) = ids.iter().find(|id| !detections.contains_key(id)) {
            warn!("Cannot mark unknown detection {} as consumed", missing);
            return Err(StorageError::NotFound);
        }
        for id in ids {
            if let Some(d) = detections.get_mut(id) {
                d.consumed = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HazardStore for Repository {
    async fn find_active_near(
        &self,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<Vec<Hazard>, StorageError> {
        self.ensure_available()?;
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(StorageError::InvalidRecord(format!(
                "search radius must be non-negative, got {}",
                radius_m
            )));
        }

        let hazards = lock(&self.hazards)?;
        let mut found: Vec<(f64, Hazard)> = hazards
            .values()
            .filter(|h| h.active)
            .map(|h| (distance(center, h.centroid), h))
            .filter(|(d, _)| *d <= radius_m)
            .map(|(d, h)| (d, h.clone()))
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        Ok(found.into_iter().map(|(_, h)| h).collect())
    }

    async fn get(&self, id: HazardId) -> Result<Option<Hazard>, StorageError> {
        self.ensure_available()?;
        let hazards = lock(&self.hazards)?;
        Ok(hazards.get(&id).cloned())
    }

    async fn insert(&self, hazard: NewHazard) -> Result<Hazard, StorageError> {
        self.ensure_available()?;
        hazard.validate()?;

        let mut hazards = lock(&self.hazards)?;
        let id = HazardId(self.next_hazard_id.fetch_add(1, Ordering::SeqCst));
        let stored = Hazard::from_new(id, hazard);
        hazards.insert(id, stored.clone());
        debug!("Inserted hazard {}", id);
        Ok(stored)
    }

    async fn update(&self, mut hazard: Hazard) -> Result<Hazard, StorageError> {
        self.ensure_available()?;
        hazard.validate()?;

        let mut hazards = lock(&self.hazards)?;
        let current = hazards.get(&hazard.id).ok_or(StorageError::NotFound)?;
        if current.version != hazard.version {
            return Err(StorageError::VersionConflict {
                id: hazard.id.0,
                expected: hazard.version,
                actual: current.version,
            });
        }

        hazard.version += 1;
        hazards.insert(hazard.id, hazard.clone());
        debug!("Updated hazard {} to version {}", hazard.id, hazard.version);
        Ok(hazard)
    }

    async fn list_active(&self) -> Result<Vec<Hazard>, StorageError> {
        self.ensure_available()?;
        let hazards = lock(&self.hazards)?;
        Ok(hazards.values().filter(|h| h.active).cloned().collect())
    }
}

#[async_trait]
impl VerificationSource for Repository {
    async fn get_verification_tally(
        &self,
        id: HazardId,
    ) -> Result<VerificationTally, StorageError> {
        self.ensure_available()?;
        let verifications = lock(&self.verifications)?;
        Ok(tally_for(&verifications, id))
    }

    async fn record_verification(
        &self,
        verification: Verification,
    ) -> Result<VerificationTally, StorageError> {
        self.ensure_available()?;
        if !lock(&self.hazards)?.contains_key(&verification.hazard_id) {
            return Err(StorageError::NotFound);
        }

        let mut verifications = lock(&self.verifications)?;
        let hazard_id = verification.hazard_id;
        verifications.insert((hazard_id, verification.user_id), verification);
        Ok(tally_for(&verifications, hazard_id))
    }
}

fn tally_for(
    verifications: &HashMap<(HazardId, UserId), Verification>,
    id: HazardId,
) -> VerificationTally {
    verifications
        .values()
        .filter(|v| v.hazard_id == id)
        .fold(VerificationTally::default(), |mut tally, v| {
            tally.total += 1;
            if v.agrees {
                tally.positive += 1;
            }
            tally
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hazard_scoring::{HazardType, MagnitudeSummary};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn new_detection(lat: f64, lon: f64) -> NewDetection {
        NewDetection {
            coordinate: coord(lat, lon),
            accuracy_m: 5.0,
            magnitude_g: 2.0,
            captured_at: Utc::now(),
            user_id: UserId(Uuid::new_v4()),
        }
    }

    fn new_hazard(lat: f64, lon: f64) -> NewHazard {
        let now = Utc::now();
        NewHazard {
            centroid: coord(lat, lon),
            hazard_type: HazardType::Unknown,
            severity: 4.0,
            confidence: 0.4,
            detection_count: 3,
            contributing_users: BTreeSet::new(),
            absorbed_detections: BTreeSet::new(),
            magnitudes: MagnitudeSummary::from_magnitudes(&[2.0, 2.0, 2.0]),
            first_seen: now,
            last_seen: now,
            last_detection_at: now,
            positive_verifications: 0,
            verification_count: 0,
        }
    }

    #[tokio::test]
    async fn test_detection_insert_and_fetch() {
        let repo = Repository::new();
        let a = repo.insert_detection(new_detection(37.7749, -122.4194)).await.unwrap();
        let b = repo.insert_detection(new_detection(37.7750, -122.4195)).await.unwrap();
        assert_eq!(a.id, DetectionId(1));
        assert_eq!(b.id, DetectionId(2));

        repo.mark_consumed(&[a.id]).await.unwrap();
        let pending = repo.fetch_unconsumed_detections(None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }

    #[tokio::test]
    async fn test_invalid_detection_rejected() {
        let repo = Repository::new();
        let mut bad = new_detection(10.0, 10.0);
        bad.accuracy_m = -3.0;
        assert!(matches!(
            repo.insert_detection(bad).await,
            Err(StorageError::InvalidRecord(_))
        ));
        assert_eq!(repo.stats().unwrap().detections_total, 0);
    }

    #[tokio::test]
    async fn test_mark_consumed_is_all_or_nothing() {
        let repo = Repository::new();
        let a = repo.insert_detection(new_detection(1.0, 1.0)).await.unwrap();
        let result = repo.mark_consumed(&[a.id, DetectionId(99)]).await;
        assert!(matches!(result, Err(StorageError::NotFound)));
        assert_eq!(repo.fetch_unconsumed_detections(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_region_filter() {
        let repo = Repository::new();
        repo.insert_detection(new_detection(0.0, 0.0)).await.unwrap();
        repo.insert_detection(new_detection(1.0, 1.0)).await.unwrap();

        let region = Region {
            center: coord(0.0, 0.0),
            radius_m: 1_000.0,
        };
        let near = repo.fetch_unconsumed_detections(Some(region)).await.unwrap();
        assert_eq!(near.len(), 1);
    }

    #[tokio::test]
    async fn test_find_active_near_orders_by_distance() {
        let repo = Repository::new();
        let far = repo.insert(new_hazard(0.0, 0.002)).await.unwrap();
        let near = repo.insert(new_hazard(0.0, 0.001)).await.unwrap();
        repo.insert(new_hazard(1.0, 1.0)).await.unwrap();

        let mut inactive = repo.insert(new_hazard(0.0, 0.0005)).await.unwrap();
        inactive.active = false;
        repo.update(inactive).await.unwrap();

        let found = repo.find_active_near(coord(0.0, 0.0), 500.0).await.unwrap();
        let ids: Vec<_> = found.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![near.id, far.id]);
    }

    #[tokio::test]
    async fn test_update_version_check() {
        let repo = Repository::new();
        let hazard = repo.insert(new_hazard(0.0, 0.0)).await.unwrap();
        assert_eq!(hazard.version, 0);

        let mut first = hazard.clone();
        first.detection_count = 4;
        let stored = repo.update(first).await.unwrap();
        assert_eq!(stored.version, 1);

        // A writer holding the stale copy loses
        let mut stale = hazard;
        stale.detection_count = 5;
        match repo.update(stale).await {
            Err(StorageError::VersionConflict { expected, actual, .. }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected version conflict, got {:?}", other),
        }

        let current = repo.get(stored.id).await.unwrap().unwrap();
        assert_eq!(current.detection_count, 4);
    }

    #[tokio::test]
    async fn test_update_rejects_out_of_range_scores() {
        let repo = Repository::new();
        let mut hazard = repo.insert(new_hazard(0.0, 0.0)).await.unwrap();
        hazard.confidence = 1.5;
        assert!(matches!(
            repo.update(hazard).await,
            Err(StorageError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn test_verification_tally_keeps_latest_vote() {
        let repo = Repository::new();
        let hazard = repo.insert(new_hazard(0.0, 0.0)).await.unwrap();
        let alice = UserId(Uuid::new_v4());
        let bob = UserId(Uuid::new_v4());

        for (user, agrees) in [(alice, true), (bob, true), (alice, false)] {
            repo.record_verification(Verification {
                hazard_id: hazard.id,
                user_id: user,
                agrees,
                recorded_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let tally = repo.get_verification_tally(hazard.id).await.unwrap();
        assert_eq!(tally, VerificationTally { positive: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_verification_for_unknown_hazard() {
        let repo = Repository::new();
        let result = repo
            .record_verification(Verification {
                hazard_id: HazardId(42),
                user_id: UserId(Uuid::new_v4()),
                agrees: true,
                recorded_at: Utc::now(),
            })
            .await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let repo = Repository::new();
        repo.set_available(false);
        assert!(matches!(
            repo.fetch_unconsumed_detections(None).await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(matches!(
            repo.find_active_near(coord(0.0, 0.0), 100.0).await,
            Err(StorageError::Unavailable(_))
        ));
        repo.set_available(true);
        assert!(repo.list_active().await.unwrap().is_empty());
    }
}
