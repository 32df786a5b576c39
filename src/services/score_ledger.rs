use std::{sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{DEFAULT_CALL_TIMEOUT, bounded};
use crate::{
    dao::scores::ScoreService,
    error::ServiceError,
    state::team::{ScoreBoard, Team},
};

/// Thin client over the score service keeping the last known scores.
///
/// A change is only recorded locally once the service confirmed it. Every
/// call to the service is bounded by its own timeout.
pub struct ScoreLedger {
    service: Arc<dyn ScoreService>,
    cached: RwLock<ScoreBoard>,
    call_timeout: Duration,
}

impl ScoreLedger {
    /// Ledger over `service` with an empty cache.
    pub fn new(service: Arc<dyn ScoreService>) -> Self {
        Self {
            service,
            cached: RwLock::new(ScoreBoard::default()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Give up on a single service call after `call_timeout`.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Last known scores, without any network call.
    pub async fn scores(&self) -> ScoreBoard {
        self.cached.read().await.clone()
    }

    /// Fetch the scores and replace the cache.
    pub async fn refresh(&self) -> Result<ScoreBoard, ServiceError> {
        let scores = bounded(self.call_timeout, self.service.get_scores()).await?;
        *self.cached.write().await = scores.clone();
        Ok(scores)
    }

    /// Fresh points of `team`, straight from the service.
    pub async fn current_points(&self, team: Team) -> Result<i32, ServiceError> {
        Ok(self.refresh().await?.get(team))
    }

    /// Add `delta` (possibly negative) to `team`.
    ///
    /// Returns as soon as the service confirmed the change. Engines call this
    /// inside a transition and [`ScoreLedger::reconcile`] once it committed,
    /// so a slow refetch can never undo a confirmed change.
    pub async fn apply_delta(&self, team: Team, delta: i32) -> Result<(), ServiceError> {
        bounded(self.call_timeout, self.service.apply_delta(team, delta)).await?;
        let points = self.cached.write().await.add(team, delta);
        info!(team = %team, delta, points, "score updated");
        Ok(())
    }

    /// Overwrite the points of `team`, then refetch.
    pub async fn set_absolute(&self, team: Team, points: i32) -> Result<(), ServiceError> {
        bounded(self.call_timeout, self.service.set_absolute(team, points)).await?;
        self.cached.write().await.set(team, points);
        info!(team = %team, points, "score set");
        self.reconcile().await;
        Ok(())
    }

    /// Reset every team. Nothing is sent unless `confirm` returns true.
    pub async fn reset_all(&self, confirm: impl FnOnce() -> bool) -> Result<bool, ServiceError> {
        if !confirm() {
            info!("score reset cancelled by operator");
            return Ok(false);
        }
        bounded(self.call_timeout, self.service.reset_all()).await?;
        info!("scores reset");
        self.reconcile().await;
        Ok(true)
    }

    /// Refetch the scores after a change; a failure only logs.
    pub async fn reconcile(&self) {
        if let Err(err) = self.refresh().await {
            warn!(error = %err, "failed to refetch scores after update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::scores::{InMemoryScoreService, RESET_POINTS};

    fn ledger() -> (InMemoryScoreService, ScoreLedger) {
        let service = InMemoryScoreService::new();
        let ledger = ScoreLedger::new(Arc::new(service.clone()));
        (service, ledger)
    }

    #[tokio::test]
    async fn confirmed_delta_updates_cache() {
        let (service, ledger) = ledger();
        ledger.apply_delta(Team::Yellow, 40).await.unwrap();
        ledger.apply_delta(Team::Yellow, -15).await.unwrap();
        assert_eq!(ledger.scores().await.get(Team::Yellow), 25);
        assert_eq!(service.points(Team::Yellow).await, 25);
    }

    #[tokio::test]
    async fn failed_call_changes_nothing() {
        let (service, ledger) = ledger();
        service.set_offline(true);
        let err = ledger.apply_delta(Team::Red, 10).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(ledger.scores().await.get(Team::Red), 0);
    }

    #[tokio::test]
    async fn reset_needs_confirmation() {
        let (service, ledger) = ledger();
        assert!(!ledger.reset_all(|| false).await.unwrap());
        assert_eq!(service.mutation_count(), 0);

        assert!(ledger.reset_all(|| true).await.unwrap());
        assert_eq!(ledger.scores().await.get(Team::Green), RESET_POINTS);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_without_touching_cache() {
        let (service, ledger) = ledger();
        let ledger = ledger.with_call_timeout(Duration::from_secs(1));
        service.set_latency(Duration::ZERO, Duration::from_secs(3));
        let err = ledger.apply_delta(Team::Red, 10).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout));
        assert_eq!(ledger.scores().await.get(Team::Red), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delta_does_not_wait_for_a_slow_refetch() {
        let (service, ledger) = ledger();
        let ledger = ledger.with_call_timeout(Duration::from_secs(5));
        service.set_latency(Duration::from_secs(4), Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        ledger.apply_delta(Team::Blue, 10).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(ledger.scores().await.get(Team::Blue), 10);

        ledger.reconcile().await;
        assert_eq!(ledger.scores().await.get(Team::Blue), 10);
    }

    #[tokio::test]
    async fn set_absolute_overwrites_points() {
        let (_, ledger) = ledger();
        ledger.apply_delta(Team::Blue, 10).await.unwrap();
        ledger.set_absolute(Team::Blue, 3).await.unwrap();
        assert_eq!(ledger.current_points(Team::Blue).await.unwrap(), 3);
    }
}
