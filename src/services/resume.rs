use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    dao::{kv::KvStore, snapshot::SnapshotEnvelope},
    state::content::{CategoryFilter, GameMode, ItemId},
};

const KEY_PREFIX: &str = "showrunner";
const ROUND: &str = "round";
const PLAYED: &str = "played";
const FILTER: &str = "filter";
const SESSION: &str = "session";

/// Reason a saved round is thrown away instead of resumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleSnapshot {
    /// The active category filter differs.
    #[error("saved under another category filter")]
    FilterChanged,
    /// The round was idle or already over.
    #[error("saved in a phase that is not resumable")]
    NotLive,
    /// The saved item left the catalog.
    #[error("item {0} is no longer in the catalog")]
    MissingItem(ItemId),
    /// The saved fields contradict each other.
    #[error("inconsistent saved round: {0}")]
    Inconsistent(&'static str),
}

/// Check the parts of a snapshot every mode validates the same way.
pub fn check_resume<S>(
    envelope: &SnapshotEnvelope<S>,
    active_filter: &CategoryFilter,
    resumable: bool,
) -> Result<(), StaleSnapshot> {
    if &envelope.filter != active_filter {
        return Err(StaleSnapshot::FilterChanged);
    }
    if !resumable {
        return Err(StaleSnapshot::NotLive);
    }
    Ok(())
}

/// Durable state of one mode: round snapshot, played set, category filter
/// and, for the board mode, the cross-round session.
///
/// Writes never fail the caller; a storage error only costs the ability to
/// resume and is logged.
#[derive(Clone)]
pub struct ResumeStore {
    kv: Arc<dyn KvStore>,
    mode: GameMode,
}

impl ResumeStore {
    /// Store for `mode` over `kv`.
    pub fn new(kv: Arc<dyn KvStore>, mode: GameMode) -> Self {
        Self { kv, mode }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{KEY_PREFIX}.{}.{suffix}", self.mode.key())
    }

    async fn write<T: Serialize + ?Sized>(&self, suffix: &str, value: &T) {
        let key = self.key(suffix);
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to serialize persisted value");
                return;
            }
        };
        if let Err(err) = self.kv.set(&key, payload).await {
            warn!(key = %key, error = %err, "failed to persist value");
        }
    }

    async fn read<T: DeserializeOwned>(&self, suffix: &str) -> Option<T> {
        let key = self.key(suffix);
        let raw = match self.kv.get(&key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to load persisted value");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = %key, error = %err, "dropping unreadable persisted value");
                self.delete(suffix).await;
                None
            }
        }
    }

    async fn delete(&self, suffix: &str) {
        let key = self.key(suffix);
        if let Err(err) = self.kv.remove(&key).await {
            warn!(key = %key, error = %err, "failed to remove persisted value");
        }
    }

    /// Save the live round, or delete the snapshot when there is none.
    pub async fn save_round<S: Serialize>(&self, snapshot: Option<SnapshotEnvelope<S>>) {
        match snapshot {
            Some(snapshot) => self.write(ROUND, &snapshot).await,
            None => {
                debug!(mode = %self.mode, "no live round; clearing snapshot");
                self.delete(ROUND).await
            }
        }
    }

    /// Saved round, if any and readable.
    pub async fn load_round<S: DeserializeOwned>(&self) -> Option<SnapshotEnvelope<S>> {
        self.read(ROUND).await
    }

    /// Forget the saved round.
    pub async fn clear_round(&self) {
        self.delete(ROUND).await;
    }

    /// Persist the played set.
    pub async fn save_played(&self, ids: &[ItemId]) {
        self.write(PLAYED, ids).await;
    }

    /// Played set, empty when nothing was saved.
    pub async fn load_played(&self) -> Vec<ItemId> {
        self.read(PLAYED).await.unwrap_or_default()
    }

    /// Persist the category filter.
    pub async fn save_filter(&self, filter: &CategoryFilter) {
        self.write(FILTER, filter).await;
    }

    /// Saved category filter, if any.
    pub async fn load_filter(&self) -> Option<CategoryFilter> {
        self.read(FILTER).await
    }

    /// Save state that outlives a single round.
    pub async fn save_session<S: Serialize>(&self, session: &S) {
        self.write(SESSION, session).await;
    }

    /// State saved by [`ResumeStore::save_session`], if any.
    pub async fn load_session<S: DeserializeOwned>(&self) -> Option<S> {
        self.read(SESSION).await
    }

    /// Forget the cross-round state.
    pub async fn clear_session(&self) {
        self.delete(SESSION).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{kv::MemoryKvStore, snapshot::WordRoundSnapshot},
        state::{team::TeamSet, word::WordPhase},
    };

    fn snapshot(filter: CategoryFilter, phase: WordPhase) -> SnapshotEnvelope<WordRoundSnapshot> {
        SnapshotEnvelope::now(
            filter,
            WordRoundSnapshot {
                item_id: 11,
                phase,
                revealed: vec![4, 0],
                active_team: None,
                locked_out: TeamSet::new(),
            },
        )
    }

    #[tokio::test]
    async fn round_snapshot_survives_a_new_store_handle() {
        let kv = MemoryKvStore::new();
        let store = ResumeStore::new(Arc::new(kv.clone()), GameMode::WordReveal);
        store
            .save_round(Some(snapshot(CategoryFilter::new([1]), WordPhase::Revealing)))
            .await;

        let reloaded = ResumeStore::new(Arc::new(kv), GameMode::WordReveal);
        let envelope = reloaded.load_round::<WordRoundSnapshot>().await.unwrap();
        assert_eq!(envelope.round.revealed, vec![4, 0]);

        reloaded.save_round::<WordRoundSnapshot>(None).await;
        assert!(reloaded.load_round::<WordRoundSnapshot>().await.is_none());
    }

    #[tokio::test]
    async fn modes_do_not_share_keys() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let image = ResumeStore::new(kv.clone(), GameMode::ImageReveal);
        let board = ResumeStore::new(kv, GameMode::Board);
        image.save_played(&[1, 2]).await;
        assert_eq!(image.load_played().await, vec![1, 2]);
        assert!(board.load_played().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_value_is_dropped() {
        let kv = MemoryKvStore::new();
        kv.set("showrunner.word.round", "{not json".into())
            .await
            .unwrap();
        let store = ResumeStore::new(Arc::new(kv.clone()), GameMode::WordReveal);
        assert!(store.load_round::<WordRoundSnapshot>().await.is_none());
        assert!(kv.get("showrunner.word.round").await.unwrap().is_none());
    }

    #[test]
    fn snapshot_acceptance_rules() {
        let active = CategoryFilter::new([1, 2]);
        let live = snapshot(CategoryFilter::new([2, 1]), WordPhase::Guessing);
        assert_eq!(check_resume(&live, &active, true), Ok(()));

        let other = snapshot(CategoryFilter::new([3]), WordPhase::Guessing);
        assert_eq!(
            check_resume(&other, &active, true),
            Err(StaleSnapshot::FilterChanged)
        );
        assert_eq!(
            check_resume(&live, &active, false),
            Err(StaleSnapshot::NotLive)
        );
    }
}
