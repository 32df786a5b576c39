//! Persisted resume snapshots of each mode.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::state::{
    board::{BoardPhase, LotteryOption, RevealedTiles, TileOutcome},
    content::{CategoryFilter, ItemId},
    image::ImagePhase,
    team::{Team, TeamSet, TurnResolver},
    word::WordPhase,
};

/// Snapshot of a live round plus the filter it was played under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEnvelope<S> {
    /// RFC 3339 timestamp of the save.
    pub saved_at: String,
    /// Category filter active when the round was saved.
    pub filter: CategoryFilter,
    /// Mode-specific round data.
    pub round: S,
}

impl<S> SnapshotEnvelope<S> {
    /// Wrap `round` with the current time.
    pub fn now(filter: CategoryFilter, round: S) -> Self {
        let saved_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "invalid-timestamp".into());
        Self {
            saved_at,
            filter,
            round,
        }
    }
}

/// Minimal image round state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRoundSnapshot {
    /// Picture being played.
    pub item_id: ItemId,
    /// Phase at save time.
    pub phase: ImagePhase,
    /// Reveal progress in `[0, 1]`.
    pub progress: f64,
    /// Team answering, if any.
    pub active_team: Option<Team>,
}

/// Minimal word round state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordRoundSnapshot {
    /// Word being played.
    pub item_id: ItemId,
    /// Phase at save time.
    pub phase: WordPhase,
    /// Uncovered positions in reveal order.
    pub revealed: Vec<usize>,
    /// Team answering, if any.
    pub active_team: Option<Team>,
    /// Teams locked out this round.
    pub locked_out: TeamSet,
}

/// Minimal board round state. Rotation and tiles live in [`BoardSessionEntity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardRoundSnapshot {
    /// Word being played.
    pub word_id: ItemId,
    /// Board of the round.
    pub board_id: ItemId,
    /// Phase at save time.
    pub phase: BoardPhase,
    /// Team that spun the lottery.
    pub drawing_team: Option<Team>,
    /// Drawn lottery option.
    pub lottery_option: Option<LotteryOption>,
    /// Points the word is worth.
    pub word_bonus: i32,
    /// Teams removed by the lottery.
    pub lottery_out: TeamSet,
    /// Teams that already missed the word.
    pub guess_out: TeamSet,
    /// Teams eligible when the word phase opened.
    pub word_roster: TeamSet,
    /// Team answering the word, if any.
    pub guessing_team: Option<Team>,
    /// Team choosing a tile.
    pub board_team: Option<Team>,
    /// Tile revealed and waiting for confirmation.
    pub last_tile: Option<TileOutcome>,
}

/// Board mode state that outlives a single round.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardSessionEntity {
    /// Rotation pointer.
    pub turns: TurnResolver,
    /// Revealed tiles per board.
    pub revealed_tiles: RevealedTiles,
}
