use indexmap::IndexSet;
use serde::Serialize;

use crate::state::{
    Snapshot,
    board::{BoardPhase, BoardRound, LotteryOption, TileOutcome, TileStatus},
    content::{BoardCell, CategoryFilter, ItemId, TilePos},
    image::{ImagePhase, ImageRound},
    team::{ScoreBoard, Team, eligible_teams},
    word::{WordPhase, WordRound, WordRules},
};

/// Character shown in place of a hidden letter.
const HIDDEN: char = '_';

/// Read-only state of the image reveal mode.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRoundView {
    /// Current phase.
    pub phase: ImagePhase,
    /// Phase machine version.
    pub version: usize,
    /// Target of the pending transition.
    pub pending: Option<ImagePhase>,
    /// Picture being played.
    pub item_id: Option<ItemId>,
    /// Hint of the picture.
    pub hint: Option<String>,
    /// Picture to uncover.
    pub image_url: Option<String>,
    /// Hidden from the public until the round is over.
    pub answer: Option<String>,
    /// Reveal progress in `[0, 1]`.
    pub progress: f64,
    /// Team answering, if any.
    pub active_team: Option<Team>,
    /// Active category filter.
    pub filter: CategoryFilter,
    /// Last known scores.
    pub scores: ScoreBoard,
}

impl ImageRoundView {
    /// Assemble the view of `round`.
    pub fn build(
        snapshot: Snapshot<ImagePhase>,
        round: &ImageRound,
        filter: CategoryFilter,
        scores: ScoreBoard,
    ) -> Self {
        let item = round.item.as_ref();
        Self {
            phase: snapshot.phase,
            version: snapshot.version,
            pending: snapshot.pending,
            item_id: round.item_id(),
            hint: item.map(|item| item.hint.clone()),
            image_url: item.map(|item| item.image_url.clone()),
            answer: item.map(|item| item.answer.clone()),
            progress: round.progress,
            active_team: round.active_team,
            filter,
            scores,
        }
    }

    /// Copy safe to show to the players.
    pub fn public(mut self) -> Self {
        if !matches!(self.phase, ImagePhase::Finished | ImagePhase::Scoreboard) {
            self.answer = None;
        }
        self
    }
}

/// Read-only state of the word reveal mode.
#[derive(Debug, Clone, Serialize)]
pub struct WordRoundView {
    /// Current phase.
    pub phase: WordPhase,
    /// Phase machine version.
    pub version: usize,
    /// Target of the pending transition.
    pub pending: Option<WordPhase>,
    /// Word being played.
    pub item_id: Option<ItemId>,
    /// Illustration of the word.
    pub image_url: Option<String>,
    /// Full word; hidden from the public until the round is over.
    pub word: Option<String>,
    /// Word with hidden letters masked.
    pub masked: String,
    /// Uncovered positions in reveal order.
    pub revealed: Vec<usize>,
    /// Non-blank characters of the word.
    pub letter_count: usize,
    /// Points a correct answer would earn right now.
    pub potential_score: i32,
    /// Team answering, if any.
    pub active_team: Option<Team>,
    /// Teams locked out this round.
    pub locked_out: Vec<Team>,
    /// Teams still allowed to buzz.
    pub eligible: Vec<Team>,
    /// Active category filter.
    pub filter: CategoryFilter,
    /// Last known scores.
    pub scores: ScoreBoard,
}

impl WordRoundView {
    /// Assemble the view of `round`.
    pub fn build(
        snapshot: Snapshot<WordPhase>,
        round: &WordRound,
        rules: WordRules,
        filter: CategoryFilter,
        scores: ScoreBoard,
    ) -> Self {
        let item = round.item.as_ref();
        Self {
            phase: snapshot.phase,
            version: snapshot.version,
            pending: snapshot.pending,
            item_id: round.item_id(),
            image_url: item.map(|item| item.image_url.clone()),
            word: item.map(|item| item.word.clone()),
            masked: item
                .map(|item| mask_word(&item.word, &round.revealed))
                .unwrap_or_default(),
            revealed: round.revealed.iter().copied().collect(),
            letter_count: round.letter_count(),
            potential_score: round.current_score(rules),
            active_team: round.active_team,
            locked_out: round.locked_out.to_vec(),
            eligible: eligible_teams(&[&round.locked_out]).to_vec(),
            filter,
            scores,
        }
    }

    /// Copy safe to show to the players.
    pub fn public(mut self) -> Self {
        if !matches!(self.phase, WordPhase::Finished | WordPhase::Scoreboard) {
            self.word = None;
        }
        self
    }
}

/// Mask every non-blank character whose position is not in `revealed`.
pub fn mask_word(word: &str, revealed: &IndexSet<usize>) -> String {
    word.chars()
        .enumerate()
        .map(|(index, c)| {
            if c.is_whitespace() || revealed.contains(&index) {
                c
            } else {
                HIDDEN
            }
        })
        .collect()
}

/// One tile of the board as shown on screen.
#[derive(Debug, Clone, Serialize)]
pub struct TileView {
    /// Row and column.
    pub pos: TilePos,
    /// Whether the tile was uncovered.
    pub revealed: bool,
    /// Content, only set once revealed.
    pub cell: Option<BoardCell>,
}

/// Read-only state of the board/lottery mode.
#[derive(Debug, Clone, Serialize)]
pub struct BoardRoundView {
    /// Current phase.
    pub phase: BoardPhase,
    /// Phase machine version.
    pub version: usize,
    /// Target of the pending transition.
    pub pending: Option<BoardPhase>,
    /// Team that spins the lottery.
    pub drawing_team: Option<Team>,
    /// Word being played.
    pub word_id: Option<ItemId>,
    /// Word to guess; hidden from the public until found.
    pub word: Option<String>,
    /// Board of the round.
    pub board_id: Option<ItemId>,
    /// Display name of the board.
    pub board_name: Option<String>,
    /// Tiles, row by row.
    pub tiles: Vec<Vec<TileView>>,
    /// Labels the lottery can land on.
    pub lottery_options: Vec<&'static str>,
    /// Option drawn this round.
    pub lottery_option: Option<LotteryOption>,
    /// Points the word is worth.
    pub word_bonus: i32,
    /// Teams removed by the lottery.
    pub lottery_out: Vec<Team>,
    /// Teams that already missed the word.
    pub guess_out: Vec<Team>,
    /// Teams still allowed to answer.
    pub eligible: Vec<Team>,
    /// Team answering the word, if any.
    pub guessing_team: Option<Team>,
    /// Team choosing a tile.
    pub board_team: Option<Team>,
    /// Last revealed tile.
    pub last_tile: Option<TileOutcome>,
    /// A tile waits for the operator's confirmation.
    pub awaiting_confirmation: bool,
    /// Active category filter.
    pub filter: CategoryFilter,
    /// Last known scores.
    pub scores: ScoreBoard,
}

impl BoardRoundView {
    /// Assemble the view of `round`.
    pub fn build(
        snapshot: Snapshot<BoardPhase>,
        round: &BoardRound,
        filter: CategoryFilter,
        scores: ScoreBoard,
    ) -> Self {
        let tiles = round
            .board
            .as_ref()
            .map(|board| {
                board
                    .cells
                    .iter()
                    .enumerate()
                    .map(|(row, cells)| {
                        cells
                            .iter()
                            .enumerate()
                            .map(|(col, cell)| {
                                let pos = TilePos::new(row, col);
                                let revealed = round.revealed_tiles.contains(board.id, pos);
                                TileView {
                                    pos,
                                    revealed,
                                    cell: revealed.then_some(*cell),
                                }
                            })
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            phase: snapshot.phase,
            version: snapshot.version,
            pending: snapshot.pending,
            drawing_team: round.drawing_team,
            word_id: round.word.as_ref().map(|word| word.id),
            word: round.word.as_ref().map(|word| word.word.clone()),
            board_id: round.board.as_ref().map(|board| board.id),
            board_name: round.board.as_ref().map(|board| board.name.clone()),
            tiles,
            lottery_options: LotteryOption::LABELS.to_vec(),
            lottery_option: round.lottery_option,
            word_bonus: round.word_bonus,
            lottery_out: round.lottery_out.to_vec(),
            guess_out: round.guess_out.to_vec(),
            eligible: round.word_eligible().to_vec(),
            guessing_team: round.guessing_team,
            board_team: round.board_team,
            last_tile: round.last_tile,
            awaiting_confirmation: snapshot.phase
                == BoardPhase::BoardPhase(TileStatus::AwaitingConfirmation),
            filter,
            scores,
        }
    }

    /// Copy safe to show to the players.
    pub fn public(mut self) -> Self {
        if matches!(self.phase, BoardPhase::DrawPhase(_) | BoardPhase::WordPhase) {
            self.word = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::content::{ImageItem, WordItem};

    #[test]
    fn mask_keeps_blanks_and_revealed_letters() {
        let revealed: IndexSet<usize> = [0, 5].into_iter().collect();
        assert_eq!(mask_word("BOM DIA", &revealed), "B__ _I_");
    }

    #[test]
    fn public_image_view_hides_answer_while_live() {
        let round = ImageRound::new(ImageItem {
            id: 1,
            answer: "Torre Eiffel".into(),
            image_url: "/t.png".into(),
            hint: "Paris".into(),
            order_index: None,
        });
        let live = Snapshot {
            phase: ImagePhase::Revealing,
            version: 2,
            pending: None,
        };
        let view = ImageRoundView::build(live, &round, CategoryFilter::all(), ScoreBoard::default());
        assert!(view.answer.is_some());
        assert!(view.public().answer.is_none());
    }

    #[test]
    fn word_view_reports_potential_score() {
        let mut round = WordRound::new(WordItem {
            id: 3,
            word: "GIRASSOL".into(),
            image_url: "/g.png".into(),
            order_index: None,
        });
        round.revealed.extend([0, 1, 2]);
        let snapshot = Snapshot {
            phase: WordPhase::Revealing,
            version: 1,
            pending: None,
        };
        let view = WordRoundView::build(
            snapshot,
            &round,
            WordRules::default(),
            CategoryFilter::all(),
            ScoreBoard::default(),
        );
        assert_eq!(view.potential_score, 50);
        assert_eq!(view.masked, "GIR_____");
        assert_eq!(view.eligible.len(), 4);
        assert!(view.public().word.is_none());
    }
}
