//! Runtime representation of the playable content: items of each mode, boards and categories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a catalog item.
pub type ItemId = u64;

/// Identifier of a catalog category.
pub type CategoryId = u64;

/// Common view over items that can be drawn from a [`ContentPool`](super::pool::ContentPool).
pub trait PoolItem: Clone + Send + Sync + 'static {
    /// Stable identifier of the item.
    fn id(&self) -> ItemId;
    /// Explicit play order, when the catalog defines one.
    fn order_index(&self) -> Option<i64>;
}

/// The three game modes run by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Guess a picture while it is progressively uncovered.
    ImageReveal,
    /// Guess a word while its letters appear one by one.
    WordReveal,
    /// Lottery draw, word guess, then a board tile pick.
    Board,
}

impl GameMode {
    /// Short key used to namespace persisted state.
    pub fn key(self) -> &'static str {
        match self {
            GameMode::ImageReveal => "image",
            GameMode::WordReveal => "word",
            GameMode::Board => "board",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Picture to guess, shown after a textual hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    /// Stable identifier.
    pub id: ItemId,
    /// Expected answer, only shown to the operator.
    pub answer: String,
    /// Location of the picture.
    pub image_url: String,
    /// Hint read out before the reveal starts.
    pub hint: String,
    /// Explicit play order.
    pub order_index: Option<i64>,
}

impl PoolItem for ImageItem {
    fn id(&self) -> ItemId {
        self.id
    }

    fn order_index(&self) -> Option<i64> {
        self.order_index
    }
}

/// Word to guess, with an illustrating picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordItem {
    /// Stable identifier.
    pub id: ItemId,
    /// The word (or expression) to guess.
    pub word: String,
    /// Picture shown while letters are revealed.
    pub image_url: String,
    /// Explicit play order.
    pub order_index: Option<i64>,
}

impl WordItem {
    /// Character positions that can be revealed (blanks are always visible).
    pub fn letter_positions(&self) -> Vec<usize> {
        letter_positions(&self.word)
    }

    /// Number of revealable letters.
    pub fn letter_count(&self) -> usize {
        self.letter_positions().len()
    }
}

impl PoolItem for WordItem {
    fn id(&self) -> ItemId {
        self.id
    }

    fn order_index(&self) -> Option<i64> {
        self.order_index
    }
}

/// Positions of the non-blank characters of `word`.
pub fn letter_positions(word: &str) -> Vec<usize> {
    word.chars()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace())
        .map(|(index, _)| index)
        .collect()
}

/// Word guessed during the board mode word phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardWord {
    /// Stable identifier.
    pub id: ItemId,
    /// The word to guess.
    pub word: String,
    /// Explicit play order.
    pub order_index: Option<i64>,
}

impl PoolItem for BoardWord {
    fn id(&self) -> ItemId {
        self.id
    }

    fn order_index(&self) -> Option<i64> {
        self.order_index
    }
}

/// Content of one board tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoardCell {
    /// Adds (or, when negative, removes) a fixed number of points.
    Points {
        /// Signed points applied to the picking team.
        value: i32,
    },
    /// Removes the configured heavy penalty, never going below zero.
    HeavyPenalty,
    /// Adds the configured jackpot bonus.
    Jackpot,
}

/// Row/column coordinates of a board tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub col: usize,
}

impl TilePos {
    /// Build a position.
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.col)
    }
}

/// Grid of tiles used in the board phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Stable identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Rows of tiles.
    pub cells: Vec<Vec<BoardCell>>,
}

impl Board {
    /// Tile at `pos`, if inside the grid.
    pub fn cell(&self, pos: TilePos) -> Option<BoardCell> {
        self.cells.get(pos.row).and_then(|row| row.get(pos.col)).copied()
    }

    /// Every tile position, row by row.
    pub fn positions(&self) -> impl Iterator<Item = TilePos> + '_ {
        self.cells
            .iter()
            .enumerate()
            .flat_map(|(row, cols)| (0..cols.len()).map(move |col| TilePos::new(row, col)))
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }
}

/// Catalog category with its per-mode auto-start flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Stable identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Selected by default for the image reveal mode.
    pub image_start: bool,
    /// Selected by default for the word reveal mode.
    pub word_start: bool,
    /// Selected by default for the board mode.
    pub board_start: bool,
}

impl Category {
    /// Whether the category is selected by default for `mode`.
    pub fn auto_starts(&self, mode: GameMode) -> bool {
        match mode {
            GameMode::ImageReveal => self.image_start,
            GameMode::WordReveal => self.word_start,
            GameMode::Board => self.board_start,
        }
    }
}

/// Active subset of the catalog for a session.
///
/// Kept sorted and de-duplicated so that two filters selecting the same
/// categories always compare equal. An empty filter selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<CategoryId>", into = "Vec<CategoryId>")]
pub struct CategoryFilter(Vec<CategoryId>);

impl CategoryFilter {
    /// Filter selecting the whole catalog.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a normalised filter from arbitrary ids.
    pub fn new(ids: impl IntoIterator<Item = CategoryId>) -> Self {
        let mut ids: Vec<CategoryId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    /// Categories flagged to auto-start for `mode`.
    pub fn auto_start(categories: &[Category], mode: GameMode) -> Self {
        Self::new(
            categories
                .iter()
                .filter(|category| category.auto_starts(mode))
                .map(|category| category.id),
        )
    }

    /// Selected category ids.
    pub fn ids(&self) -> &[CategoryId] {
        &self.0
    }

    /// Whether the filter selects the whole catalog.
    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma separated ids, as expected by the catalog query string.
    pub fn to_query(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl From<Vec<CategoryId>> for CategoryFilter {
    fn from(value: Vec<CategoryId>) -> Self {
        Self::new(value)
    }
}

impl From<CategoryFilter> for Vec<CategoryId> {
    fn from(value: CategoryFilter) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_positions_skip_blanks() {
        assert_eq!(letter_positions("AB C"), vec![0, 1, 3]);
        assert_eq!(letter_positions("  "), Vec::<usize>::new());
        let item = WordItem {
            id: 1,
            word: "BOM DIA".into(),
            image_url: String::new(),
            order_index: None,
        };
        assert_eq!(item.letter_count(), 6);
    }

    #[test]
    fn category_filter_is_normalised() {
        assert_eq!(CategoryFilter::new([3, 1, 3]), CategoryFilter::new([1, 3]));
        assert_eq!(CategoryFilter::new([3, 1]).to_query(), "1,3");
        assert!(CategoryFilter::all().is_all());
    }

    #[test]
    fn auto_start_filter_uses_mode_flag() {
        let categories = vec![
            Category {
                id: 7,
                name: "Filmes".into(),
                image_start: true,
                word_start: false,
                board_start: true,
            },
            Category {
                id: 2,
                name: "Música".into(),
                image_start: false,
                word_start: true,
                board_start: true,
            },
        ];
        assert_eq!(
            CategoryFilter::auto_start(&categories, GameMode::ImageReveal).ids(),
            &[7]
        );
        assert_eq!(
            CategoryFilter::auto_start(&categories, GameMode::Board).ids(),
            &[2, 7]
        );
    }

    #[test]
    fn board_cells_and_positions() {
        let board = Board {
            id: 1,
            name: "classic".into(),
            cells: vec![
                vec![BoardCell::Points { value: 10 }, BoardCell::Jackpot],
                vec![BoardCell::HeavyPenalty],
            ],
        };
        assert_eq!(board.tile_count(), 3);
        assert_eq!(board.cell(TilePos::new(1, 0)), Some(BoardCell::HeavyPenalty));
        assert_eq!(board.cell(TilePos::new(1, 1)), None);
        assert_eq!(board.positions().count(), 3);
    }

    #[test]
    fn board_cell_serializes_with_kind_tag() {
        let json = serde_json::to_string(&BoardCell::Points { value: -10 }).unwrap();
        assert_eq!(json, r#"{"kind":"points","value":-10}"#);
        let back: BoardCell = serde_json::from_str(r#"{"kind":"jackpot"}"#).unwrap();
        assert_eq!(back, BoardCell::Jackpot);
    }
}
