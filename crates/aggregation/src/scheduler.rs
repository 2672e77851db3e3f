//! Periodic aggregation driver

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::job::AggregationJob;
use crate::AggregationError;

/// Runs the aggregation job on a fixed interval, with a decay sweep every few cycles
pub struct AggregationScheduler {
    job: Arc<AggregationJob>,
    config: SchedulerConfig,
    /// Completed cycles, skipped ones included
    cycles: u64,
}

impl AggregationScheduler {
    pub fn new(job: Arc<AggregationJob>, config: SchedulerConfig) -> Self {
        Self {
            job,
            config,
            cycles: 0,
        }
    }

    /// Number of cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Loop until `shutdown` flips to true or its sender is dropped
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        info!("Starting aggregation scheduler every {:?}", period);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Aggregation scheduler stopped after {} cycles", self.cycles);
    }

    /// One cycle: an aggregation pass, then the sweep when it is due.
    ///
    /// Failures are logged and never stop the scheduler.
    pub async fn tick(&mut self) {
        self.cycles += 1;

        match self.job.run().await {
            Ok(_) => {}
            Err(AggregationError::LockContention { .. }) => {
                warn!("Aggregation cycle {} skipped: lock busy", self.cycles);
            }
            Err(e) => error!("Aggregation cycle {} failed: {}", self.cycles, e),
        }

        let every = self.config.sweep_every_cycles;
        if every > 0 && self.cycles % every == 0 {
            if let Err(e) = self.job.sweep_at(Utc::now()).await {
                warn!("Decay sweep in cycle {} failed: {}", self.cycles, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationConfig;
    use geo_distance::Coordinate;
    use hazard_scoring::ScoringConfig;
    use spatial_clustering::ClusteringConfig;
    use storage::{DetectionSource, HazardStore, NewDetection, Repository, UserId};
    use uuid::Uuid;

    fn scheduler(repo: &Arc<Repository>, sweep_every_cycles: u64) -> AggregationScheduler {
        let job = AggregationJob::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            ClusteringConfig::default(),
            ScoringConfig::default(),
            AggregationConfig::default(),
        )
        .unwrap();
        AggregationScheduler::new(
            Arc::new(job),
            SchedulerConfig {
                interval_secs: 60,
                sweep_every_cycles,
            },
        )
    }

    async fn seed(repo: &Repository) {
        let user = UserId(Uuid::new_v4());
        for _ in 0..3 {
            repo.insert_detection(NewDetection {
                coordinate: Coordinate::new(51.5, -0.12).unwrap(),
                accuracy_m: 3.0,
                magnitude_g: 3.0,
                captured_at: Utc::now(),
                user_id: user,
            })
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_tick_runs_aggregation() {
        let repo = Arc::new(Repository::new());
        seed(&repo).await;
        let mut scheduler = scheduler(&repo, 0);

        scheduler.tick().await;
        assert_eq!(scheduler.cycles(), 1);
        assert_eq!(repo.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tick_survives_store_outage() {
        let repo = Arc::new(Repository::new());
        seed(&repo).await;
        let mut scheduler = scheduler(&repo, 1);

        repo.set_available(false);
        scheduler.tick().await;
        repo.set_available(true);
        scheduler.tick().await;

        assert_eq!(scheduler.cycles(), 2);
        assert_eq!(repo.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let repo = Arc::new(Repository::new());
        seed(&repo).await;
        let mut scheduler = scheduler(&repo, 0);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            scheduler.run(rx).await;
            scheduler.cycles()
        });

        tokio::time::sleep(Duration::from_secs(90)).await;
        tx.send(true).unwrap();
        let cycles = handle.await.unwrap();

        // immediate first tick plus one at 60s
        assert_eq!(cycles, 2);
        assert_eq!(repo.list_active().await.unwrap().len(), 1);
    }
}
