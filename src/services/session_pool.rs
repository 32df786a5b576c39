use std::{sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{bounded, notifier::Notifier, resume::ResumeStore};
use crate::{
    dao::catalog::{CatalogItem, CatalogService},
    error::ServiceError,
    state::{
        content::{CategoryFilter, GameMode, ItemId},
        pool::{ContentPool, Pick},
    },
};

/// Item chosen for the next round, not yet committed to the pool.
#[derive(Debug, Clone)]
pub struct Drawn<T> {
    /// The chosen item.
    pub item: T,
    /// Pick to hand back to [`SessionPool::accept`] once the round started.
    pub pick: Pick,
}

/// Content pool of one mode wired to the catalog and to persistence.
///
/// The pool is refetched at every round start; the played set and the
/// category filter are persisted on every change.
pub struct SessionPool<T: CatalogItem> {
    mode: GameMode,
    pool: RwLock<ContentPool<T>>,
    filter: RwLock<CategoryFilter>,
    catalog: Arc<dyn CatalogService>,
    resume: ResumeStore,
    notifier: Arc<Notifier>,
    call_timeout: Duration,
}

impl<T: CatalogItem> SessionPool<T> {
    /// Empty pool of `mode`; catalog calls give up after `call_timeout`.
    pub fn new(
        mode: GameMode,
        catalog: Arc<dyn CatalogService>,
        resume: ResumeStore,
        notifier: Arc<Notifier>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            mode,
            pool: RwLock::new(ContentPool::new()),
            filter: RwLock::new(CategoryFilter::all()),
            catalog,
            resume,
            notifier,
            call_timeout,
        }
    }

    /// Restore the persisted filter and played set.
    ///
    /// Without a persisted filter the categories flagged to auto-start this
    /// mode are selected, or the whole catalog when categories cannot be
    /// listed.
    pub async fn initialize(&self) -> CategoryFilter {
        let filter = match self.resume.load_filter().await {
            Some(filter) => filter,
            None => {
                let filter = match bounded(self.call_timeout, self.catalog.list_categories()).await {
                    Ok(categories) => CategoryFilter::auto_start(&categories, self.mode),
                    Err(err) => {
                        warn!(mode = %self.mode, error = %err, "failed to list categories; using the whole catalog");
                        CategoryFilter::all()
                    }
                };
                self.resume.save_filter(&filter).await;
                filter
            }
        };
        *self.filter.write().await = filter.clone();

        let played = self.resume.load_played().await;
        self.pool.write().await.restore_played(played);
        filter
    }

    /// Active category filter.
    pub async fn filter(&self) -> CategoryFilter {
        self.filter.read().await.clone()
    }

    /// Switch the category filter and start the played history over.
    pub async fn set_filter(&self, filter: CategoryFilter) -> bool {
        let changed = {
            let mut current = self.filter.write().await;
            let changed = *current != filter;
            *current = filter.clone();
            changed
        };
        self.resume.save_filter(&filter).await;
        self.clear_played().await;
        info!(mode = %self.mode, filter = ?filter.ids(), changed, "category filter set");
        changed
    }

    /// Refetch the items of the active filter. Returns the pool size.
    pub async fn reload(&self) -> Result<usize, ServiceError> {
        let filter = self.filter().await;
        let items = bounded(self.call_timeout, T::fetch(self.catalog.as_ref(), &filter)).await?;
        let count = items.len();
        self.pool.write().await.load(items);
        Ok(count)
    }

    /// Choose the next item. Nothing changes until the pick is accepted.
    pub async fn pick(&self) -> Result<Drawn<T>, ServiceError> {
        let pool = self.pool.read().await;
        let pick = pool
            .pick_next(&mut rand::rng())
            .ok_or(ServiceError::PoolExhausted)?;
        let item = pool
            .get(pick.id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", pick.id)))?;
        Ok(Drawn { item, pick })
    }

    /// Commit `pick` after its round started, starting the pool over when it
    /// came from an exhausted pool.
    pub async fn accept(&self, pick: Pick) {
        if !pick.exhausted_reset {
            return;
        }
        self.pool.write().await.accept(pick);
        self.resume.save_played(&[]).await;
        info!(mode = %self.mode, "every item played; starting the pool over");
        self.notifier.info(
            Some(self.mode),
            "Todos os itens foram jogados; recomeçando a lista",
        );
    }

    /// Record `id` as consumed and persist the played set.
    pub async fn mark_played(&self, id: ItemId) {
        let played = {
            let mut pool = self.pool.write().await;
            if !pool.mark_played(id) {
                return;
            }
            pool.played()
        };
        self.resume.save_played(&played).await;
    }

    /// Forget every played item.
    pub async fn clear_played(&self) {
        self.pool.write().await.clear_played();
        self.resume.save_played(&[]).await;
    }

    /// Ids played so far, in play order.
    pub async fn played(&self) -> Vec<ItemId> {
        self.pool.read().await.played()
    }

    /// Item of the last loaded pool.
    pub async fn get(&self, id: ItemId) -> Option<T> {
        self.pool.read().await.get(id).cloned()
    }
}
