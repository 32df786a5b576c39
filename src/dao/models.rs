//! Payloads exchanged with the catalog and score services, and their
//! conversion into the runtime content types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{
    content::{Board, BoardCell, BoardWord, Category, CategoryId, ImageItem, ItemId, WordItem},
    team::Team,
};

/// Label of the heavy-penalty tile in board configurations.
pub const HEAVY_PENALTY_LABEL: &str = "Bug";
/// Label of the jackpot tile in board configurations.
pub const JACKPOT_LABEL: &str = "Carroção";

/// Image reveal item as listed by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageItemEntity {
    /// Catalog id.
    pub id: ItemId,
    /// Expected answer.
    pub answer: String,
    /// Picture to uncover.
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    /// Hint shown before the reveal.
    #[serde(default)]
    pub hint: String,
    /// Optional play order.
    #[serde(default)]
    pub order_idx: Option<i64>,
}

impl From<ImageItemEntity> for ImageItem {
    fn from(value: ImageItemEntity) -> Self {
        Self {
            id: value.id,
            answer: value.answer,
            image_url: value.image_url,
            hint: value.hint,
            order_index: value.order_idx,
        }
    }
}

/// Word reveal item as listed by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordItemEntity {
    /// Catalog id.
    pub id: ItemId,
    /// Word to guess.
    pub palavra: String,
    /// Illustration shown next to the letters.
    #[serde(rename = "imageUrl", default)]
    pub image_url: String,
    /// Optional play order.
    #[serde(default)]
    pub order_idx: Option<i64>,
}

impl From<WordItemEntity> for WordItem {
    fn from(value: WordItemEntity) -> Self {
        Self {
            id: value.id,
            word: value.palavra,
            image_url: value.image_url,
            order_index: value.order_idx,
        }
    }
}

/// Board mode word as listed by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardWordEntity {
    /// Catalog id.
    pub id: ItemId,
    /// Word to guess.
    pub word: String,
    /// Optional play order.
    #[serde(default)]
    pub order_idx: Option<i64>,
}

impl From<BoardWordEntity> for BoardWord {
    fn from(value: BoardWordEntity) -> Self {
        Self {
            id: value.id,
            word: value.word,
            order_index: value.order_idx,
        }
    }
}

/// Tile of a stored board configuration: a number or a special label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawCell {
    /// Points added (or removed when negative).
    Points(i32),
    /// Special tile label.
    Special(String),
}

/// Board configuration could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("board {board_id} has an unknown tile `{label}`")]
pub struct UnknownCell {
    /// Board holding the tile.
    pub board_id: ItemId,
    /// Label that matched nothing.
    pub label: String,
}

/// Board as listed by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardEntity {
    /// Catalog id.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Rows of tiles.
    pub board_config: Vec<Vec<RawCell>>,
}

impl TryFrom<BoardEntity> for Board {
    type Error = UnknownCell;

    fn try_from(value: BoardEntity) -> Result<Self, Self::Error> {
        let board_id = value.id;
        let cells = value
            .board_config
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| match cell {
                        RawCell::Points(value) => Ok(BoardCell::Points { value }),
                        RawCell::Special(label) if label == HEAVY_PENALTY_LABEL => {
                            Ok(BoardCell::HeavyPenalty)
                        }
                        RawCell::Special(label) if label == JACKPOT_LABEL => Ok(BoardCell::Jackpot),
                        RawCell::Special(label) => Err(UnknownCell { board_id, label }),
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: value.id,
            name: value.name,
            cells,
        })
    }
}

/// Auto-start flag stored either as 0/1 or as a boolean.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FlagEntity {
    /// Boolean flag.
    Bool(bool),
    /// Numeric flag, set when non-zero.
    Number(i64),
}

impl Default for FlagEntity {
    fn default() -> Self {
        FlagEntity::Number(0)
    }
}

impl FlagEntity {
    /// Whether the flag is on.
    pub fn is_set(self) -> bool {
        match self {
            FlagEntity::Bool(value) => value,
            FlagEntity::Number(value) => value != 0,
        }
    }
}

/// Category as listed by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryEntity {
    /// Catalog id.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Auto-start flag of the image reveal mode.
    #[serde(default)]
    pub imagem_oculta_start: FlagEntity,
    /// Auto-start flag of the word reveal mode.
    #[serde(default)]
    pub conexao_start: FlagEntity,
    /// Auto-start flag of the board mode.
    #[serde(default)]
    pub bug_start: FlagEntity,
}

impl From<CategoryEntity> for Category {
    fn from(value: CategoryEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            image_start: value.imagem_oculta_start.is_set(),
            word_start: value.conexao_start.is_set(),
            board_start: value.bug_start.is_set(),
        }
    }
}

/// Body of a relative score update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreDeltaRequest {
    /// Team to update.
    pub team: Team,
    /// Points to add, possibly negative.
    #[serde(rename = "pointsToAdd")]
    pub points_to_add: i32,
}

/// Body of an absolute score update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreSetRequest {
    /// Team to update.
    pub team: Team,
    /// New points.
    pub points: i32,
}
