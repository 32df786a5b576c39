//! Score service contract and its in-memory implementation.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use super::storage::{StorageError, StorageResult};
use crate::state::team::{ScoreBoard, Team};

/// Points every team starts from after a full reset.
pub const RESET_POINTS: i32 = 100;

/// Narrow contract of the score service.
pub trait ScoreService: Send + Sync {
    /// Points of every team.
    fn get_scores(&self) -> BoxFuture<'static, StorageResult<ScoreBoard>>;
    /// Add `delta` to the points of `team`.
    fn apply_delta(&self, team: Team, delta: i32) -> BoxFuture<'static, StorageResult<()>>;
    /// Overwrite the points of `team`.
    fn set_absolute(&self, team: Team, points: i32) -> BoxFuture<'static, StorageResult<()>>;
    /// Put every team back to [`RESET_POINTS`].
    fn reset_all(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Score service held in memory. Clones share the same scores.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScoreService {
    scores: Arc<RwLock<ScoreBoard>>,
    offline: Arc<AtomicBool>,
    mutations: Arc<AtomicUsize>,
    read_delay_ms: Arc<AtomicU64>,
    write_delay_ms: Arc<AtomicU64>,
}

impl InMemoryScoreService {
    /// Service where every team has zero points.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every read and every mutating call, like a slow remote service.
    pub fn set_latency(&self, read: Duration, write: Duration) {
        self.read_delay_ms
            .store(read.as_millis() as u64, Ordering::SeqCst);
        self.write_delay_ms
            .store(write.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make every call fail, or recover.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful mutating calls so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Current points of `team`, bypassing the service contract.
    pub async fn points(&self, team: Team) -> i32 {
        self.scores.read().await.get(team)
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::rejected("scores", "service offline"))
        } else {
            Ok(())
        }
    }

    fn mutate(
        &self,
        change: impl FnOnce(&mut ScoreBoard) + Send + 'static,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let online = self.check_online();
        let scores = self.scores.clone();
        let mutations = self.mutations.clone();
        let delay = Duration::from_millis(self.write_delay_ms.load(Ordering::SeqCst));
        Box::pin(async move {
            pause(delay).await;
            online?;
            change(&mut *scores.write().await);
            mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

impl ScoreService for InMemoryScoreService {
    fn get_scores(&self) -> BoxFuture<'static, StorageResult<ScoreBoard>> {
        let online = self.check_online();
        let scores = self.scores.clone();
        let delay = Duration::from_millis(self.read_delay_ms.load(Ordering::SeqCst));
        Box::pin(async move {
            pause(delay).await;
            online?;
            Ok(scores.read().await.clone())
        })
    }

    fn apply_delta(&self, team: Team, delta: i32) -> BoxFuture<'static, StorageResult<()>> {
        self.mutate(move |scores| {
            scores.add(team, delta);
        })
    }

    fn set_absolute(&self, team: Team, points: i32) -> BoxFuture<'static, StorageResult<()>> {
        self.mutate(move |scores| scores.set(team, points))
    }

    fn reset_all(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.mutate(|scores| {
            for team in Team::ALL {
                scores.set(team, RESET_POINTS);
            }
        })
    }
}
