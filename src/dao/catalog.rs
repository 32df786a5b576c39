//! Read-only catalog of playable content.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;

use super::storage::{StorageError, StorageResult};
use crate::state::content::{
    Board, BoardWord, Category, CategoryFilter, CategoryId, ImageItem, ItemId, PoolItem, WordItem,
};

/// Narrow contract of the catalog service.
pub trait CatalogService: Send + Sync {
    /// Image reveal items of the categories in `filter`.
    fn list_image_items(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<ImageItem>>>;
    /// Word reveal items of the categories in `filter`.
    fn list_word_items(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<WordItem>>>;
    /// Board mode words of the categories in `filter`.
    fn list_board_words(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<BoardWord>>>;
    /// Every board, whatever the filter.
    fn list_boards(&self) -> BoxFuture<'static, StorageResult<Vec<Board>>>;
    /// Categories with their auto-start flags.
    fn list_categories(&self) -> BoxFuture<'static, StorageResult<Vec<Category>>>;
}

/// Item type that knows which catalog listing it comes from.
pub trait CatalogItem: PoolItem {
    /// List the items of this type selected by `filter`.
    fn fetch(
        catalog: &dyn CatalogService,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<Self>>>;
}

impl CatalogItem for ImageItem {
    fn fetch(
        catalog: &dyn CatalogService,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<Self>>> {
        catalog.list_image_items(filter)
    }
}

impl CatalogItem for WordItem {
    fn fetch(
        catalog: &dyn CatalogService,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<Self>>> {
        catalog.list_word_items(filter)
    }
}

impl CatalogItem for BoardWord {
    fn fetch(
        catalog: &dyn CatalogService,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<Self>>> {
        catalog.list_board_words(filter)
    }
}

#[derive(Debug, Default)]
struct CatalogData {
    images: Vec<ImageItem>,
    words: Vec<WordItem>,
    board_words: Vec<BoardWord>,
    boards: Vec<Board>,
    categories: Vec<Category>,
    membership: BTreeMap<ItemId, BTreeSet<CategoryId>>,
}

/// Catalog held in memory, used by tests and the console demo.
///
/// Items without any category membership are only returned for the
/// whole-catalog filter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    data: Arc<CatalogData>,
    offline: Arc<AtomicBool>,
}

impl InMemoryCatalog {
    /// Start an empty catalog.
    pub fn builder() -> InMemoryCatalogBuilder {
        InMemoryCatalogBuilder::default()
    }

    /// Make every call fail, or recover.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::rejected("catalog", "service offline"))
        } else {
            Ok(())
        }
    }

    fn select<T: PoolItem>(&self, items: &[T], filter: &CategoryFilter) -> Vec<T> {
        items
            .iter()
            .filter(|item| {
                filter.is_all()
                    || self.data.membership.get(&item.id()).is_some_and(|categories| {
                        filter.ids().iter().any(|id| categories.contains(id))
                    })
            })
            .cloned()
            .collect()
    }

    fn listing<T: Send + 'static>(
        &self,
        list: impl FnOnce(&Self) -> Vec<T>,
    ) -> BoxFuture<'static, StorageResult<Vec<T>>> {
        let result = self.check_online().map(|()| list(self));
        Box::pin(async move { result })
    }

    /// Catalog used by `--demo`.
    pub fn demo() -> Self {
        use crate::state::content::BoardCell::{HeavyPenalty, Jackpot, Points};

        let points = |value| Points { value };
        Self::builder()
            .category(Category {
                id: 1,
                name: "Geral".into(),
                image_start: true,
                word_start: true,
                board_start: true,
            })
            .category(Category {
                id: 2,
                name: "Cinema".into(),
                image_start: false,
                word_start: false,
                board_start: false,
            })
            .image(
                ImageItem {
                    id: 1,
                    answer: "Torre Eiffel".into(),
                    image_url: "/characters/torre.png".into(),
                    hint: "Monumento em Paris".into(),
                    order_index: Some(1),
                },
                [1],
            )
            .image(
                ImageItem {
                    id: 2,
                    answer: "Cristo Redentor".into(),
                    image_url: "/characters/cristo.png".into(),
                    hint: "Cartão-postal do Rio".into(),
                    order_index: None,
                },
                [1],
            )
            .image(
                ImageItem {
                    id: 3,
                    answer: "Darth Vader".into(),
                    image_url: "/characters/vader.png".into(),
                    hint: "Vilão de capa preta".into(),
                    order_index: None,
                },
                [2],
            )
            .word(
                WordItem {
                    id: 11,
                    word: "CAVALO".into(),
                    image_url: "/conexao_images/cavalo.png".into(),
                    order_index: None,
                },
                [1],
            )
            .word(
                WordItem {
                    id: 12,
                    word: "BOM DIA".into(),
                    image_url: "/conexao_images/sol.png".into(),
                    order_index: None,
                },
                [1],
            )
            .board_word(
                BoardWord {
                    id: 21,
                    word: "GIRASSOL".into(),
                    order_index: None,
                },
                [1],
            )
            .board_word(
                BoardWord {
                    id: 22,
                    word: "PIPOCA".into(),
                    order_index: None,
                },
                [1, 2],
            )
            .board(Board {
                id: 31,
                name: "Clássico".into(),
                cells: vec![
                    vec![points(10), points(20), HeavyPenalty],
                    vec![points(-10), Jackpot, points(30)],
                    vec![points(5), points(15), points(-5)],
                ],
            })
            .build()
    }
}

/// Builder for [`InMemoryCatalog`].
#[derive(Debug, Default)]
pub struct InMemoryCatalogBuilder {
    data: CatalogData,
}

impl InMemoryCatalogBuilder {
    fn member(&mut self, id: ItemId, categories: impl IntoIterator<Item = CategoryId>) {
        self.data
            .membership
            .entry(id)
            .or_default()
            .extend(categories);
    }

    /// Add a category.
    pub fn category(mut self, category: Category) -> Self {
        self.data.categories.push(category);
        self
    }

    /// Add an image item belonging to `categories`.
    pub fn image(
        mut self,
        item: ImageItem,
        categories: impl IntoIterator<Item = CategoryId>,
    ) -> Self {
        self.member(item.id, categories);
        self.data.images.push(item);
        self
    }

    /// Add a word reveal item belonging to `categories`.
    pub fn word(mut self, item: WordItem, categories: impl IntoIterator<Item = CategoryId>) -> Self {
        self.member(item.id, categories);
        self.data.words.push(item);
        self
    }

    /// Add a board mode word belonging to `categories`.
    pub fn board_word(
        mut self,
        item: BoardWord,
        categories: impl IntoIterator<Item = CategoryId>,
    ) -> Self {
        self.member(item.id, categories);
        self.data.board_words.push(item);
        self
    }

    /// Add a board.
    pub fn board(mut self, board: Board) -> Self {
        self.data.boards.push(board);
        self
    }

    /// Finish the catalog; it starts online.
    pub fn build(self) -> InMemoryCatalog {
        InMemoryCatalog {
            data: Arc::new(self.data),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CatalogService for InMemoryCatalog {
    fn list_image_items(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<ImageItem>>> {
        self.listing(|catalog| catalog.select(&catalog.data.images, filter))
    }

    fn list_word_items(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<WordItem>>> {
        self.listing(|catalog| catalog.select(&catalog.data.words, filter))
    }

    fn list_board_words(
        &self,
        filter: &CategoryFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<BoardWord>>> {
        self.listing(|catalog| catalog.select(&catalog.data.board_words, filter))
    }

    fn list_boards(&self) -> BoxFuture<'static, StorageResult<Vec<Board>>> {
        self.listing(|catalog| catalog.data.boards.clone())
    }

    fn list_categories(&self) -> BoxFuture<'static, StorageResult<Vec<Category>>> {
        self.listing(|catalog| catalog.data.categories.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filter_selects_members_of_any_listed_category() {
        let catalog = InMemoryCatalog::demo();
        let all = catalog.list_image_items(&CategoryFilter::all()).await.unwrap();
        assert_eq!(all.len(), 3);

        let cinema = catalog
            .list_image_items(&CategoryFilter::new([2]))
            .await
            .unwrap();
        assert_eq!(cinema.iter().map(|item| item.id).collect::<Vec<_>>(), vec![3]);

        let words = catalog
            .list_board_words(&CategoryFilter::new([2]))
            .await
            .unwrap();
        assert_eq!(words.len(), 1);
    }

    #[tokio::test]
    async fn offline_catalog_fails_every_listing() {
        let catalog = InMemoryCatalog::demo();
        catalog.set_offline(true);
        assert!(catalog.list_boards().await.is_err());
        assert!(catalog.list_categories().await.is_err());
        catalog.set_offline(false);
        assert_eq!(catalog.list_boards().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn catalog_item_dispatches_to_matching_listing() {
        let catalog = InMemoryCatalog::demo();
        let words = WordItem::fetch(&catalog, &CategoryFilter::all()).await.unwrap();
        assert_eq!(words.len(), 2);
    }
}
