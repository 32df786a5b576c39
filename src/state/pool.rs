//! Selection of the next unplayed item with ordered-then-random preference.

use indexmap::IndexSet;
use rand::Rng;

use super::content::{ItemId, PoolItem};

/// Result of a successful [`ContentPool::pick_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    /// Identifier of the chosen item.
    pub id: ItemId,
    /// True when every item had been played; accepting the pick clears the
    /// played set.
    pub exhausted_reset: bool,
}

/// Items available for the active category filter plus the ids already consumed.
#[derive(Debug, Clone)]
pub struct ContentPool<T: PoolItem> {
    items: Vec<T>,
    played: IndexSet<ItemId>,
}

impl<T: PoolItem> Default for ContentPool<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            played: IndexSet::new(),
        }
    }
}

impl<T: PoolItem> ContentPool<T> {
    /// Empty pool with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pool content, keeping the played history.
    pub fn load(&mut self, items: Vec<T>) {
        self.items = items;
    }

    /// Items currently in the pool.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Whether the pool holds no item at all.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an item by id.
    pub fn get(&self, id: ItemId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Ids consumed this session, in consumption order.
    pub fn played(&self) -> Vec<ItemId> {
        self.played.iter().copied().collect()
    }

    /// Whether `id` was already consumed.
    pub fn is_played(&self, id: ItemId) -> bool {
        self.played.contains(&id)
    }

    /// Replace the played history, e.g. after loading it from storage.
    pub fn restore_played(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.played = ids.into_iter().collect();
    }

    /// Record `id` as consumed. Returns `false` when it was already recorded.
    pub fn mark_played(&mut self, id: ItemId) -> bool {
        self.played.insert(id)
    }

    /// Forget the played history.
    pub fn clear_played(&mut self) {
        self.played.clear();
    }

    /// Choose the next item to play without changing the pool.
    ///
    /// Unplayed items carrying an order index win, lowest index first (ties on
    /// id). Without any, an unplayed item is drawn uniformly at random. When
    /// every item was played the whole pool is eligible again and the pick
    /// is flagged so that [`ContentPool::accept`] clears the history. Returns
    /// `None` only for an empty pool.
    pub fn pick_next<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Pick> {
        if self.items.is_empty() {
            return None;
        }

        let mut exhausted_reset = false;
        let mut available: Vec<&T> = self
            .items
            .iter()
            .filter(|item| !self.played.contains(&item.id()))
            .collect();

        if available.is_empty() {
            exhausted_reset = true;
            available = self.items.iter().collect();
        }

        let ordered = available
            .iter()
            .filter_map(|item| item.order_index().map(|order| (order, item.id())))
            .min();

        let id = match ordered {
            Some((_, id)) => id,
            None => available[rng.random_range(0..available.len())].id(),
        };

        Some(Pick {
            id,
            exhausted_reset,
        })
    }

    /// Commit a pick once its round really started.
    pub fn accept(&mut self, pick: Pick) {
        if pick.exhausted_reset {
            self.played.clear();
        }
    }
}
