//! Board/lottery mode: a lottery draw, a word guess among the remaining teams,
//! then a single board tile pick by the team that found the word.

use std::{collections::BTreeMap, fmt, str::FromStr};

use indexmap::IndexSet;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    content::{Board, BoardCell, BoardWord, ItemId, TilePos},
    state_machine::PhaseRules,
    team::{Team, TeamSet, TurnResolver, eligible_teams},
};

/// Sub-status of the lottery draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawStatus {
    /// Waiting for the drawn lottery option.
    Choosing,
    /// A removal option was drawn; teams still have to be picked.
    Removing {
        /// Teams left to remove.
        remaining: u8,
    },
}

/// Sub-status of the board phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileStatus {
    /// The winning team picks a tile.
    Choosing,
    /// A tile was resolved; nothing moves until the operator confirms.
    AwaitingConfirmation,
}

/// Phases of a board round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardPhase {
    /// No round in progress.
    Idle,
    /// The drawing team spins the lottery.
    DrawPhase(DrawStatus),
    /// Remaining teams try to guess the word.
    WordPhase,
    /// The winning team picks a board tile.
    BoardPhase(TileStatus),
    /// Scores are displayed; the next round can start.
    Scoreboard,
}

impl BoardPhase {
    /// Whether a saved round in this phase is worth resuming.
    pub fn is_resumable(self) -> bool {
        !matches!(self, BoardPhase::Idle | BoardPhase::Scoreboard)
    }
}

/// Events driving [`BoardPhase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// Start the next round for the next team in rotation.
    StartRound,
    /// A flat gain/loss option was applied.
    FlatScoreApplied,
    /// A removal option was drawn.
    RemovalRequested(u8),
    /// One more team was removed.
    TeamRemoved,
    /// Pending removals were dropped.
    RemovalSkipped,
    /// The draw resolved into the word phase.
    EnterWordPhase,
    /// A team buzzed in the word phase.
    Attempt(Team),
    /// The answering team missed.
    WrongGuess,
    /// The answering team found the word.
    WordGuessed,
    /// A tile was revealed and its effect applied.
    TileRevealed,
    /// The operator acknowledged the tile effect.
    TileConfirmed,
    /// Jump to the scoreboard.
    ViewScoreboard,
}

impl PhaseRules for BoardPhase {
    type Event = BoardEvent;

    fn initial() -> Self {
        BoardPhase::Idle
    }

    fn next(&self, event: &BoardEvent) -> Option<Self> {
        use BoardEvent as E;
        use BoardPhase as P;

        match (self, event) {
            (P::Idle | P::Scoreboard, E::StartRound) => Some(P::DrawPhase(DrawStatus::Choosing)),
            (P::DrawPhase(DrawStatus::Choosing), E::FlatScoreApplied) => Some(P::Scoreboard),
            (P::DrawPhase(DrawStatus::Choosing), E::RemovalRequested(count)) if *count > 0 => {
                Some(P::DrawPhase(DrawStatus::Removing { remaining: *count }))
            }
            (P::DrawPhase(DrawStatus::Choosing), E::EnterWordPhase) => Some(P::WordPhase),
            (P::DrawPhase(DrawStatus::Removing { remaining }), E::TeamRemoved) => {
                if *remaining > 1 {
                    Some(P::DrawPhase(DrawStatus::Removing {
                        remaining: remaining - 1,
                    }))
                } else {
                    Some(P::WordPhase)
                }
            }
            (P::DrawPhase(DrawStatus::Removing { .. }), E::RemovalSkipped) => Some(P::WordPhase),
            (P::WordPhase, E::Attempt(_) | E::WrongGuess) => Some(P::WordPhase),
            (P::WordPhase, E::WordGuessed) => Some(P::BoardPhase(TileStatus::Choosing)),
            (P::BoardPhase(TileStatus::Choosing), E::TileRevealed) => {
                Some(P::BoardPhase(TileStatus::AwaitingConfirmation))
            }
            (P::BoardPhase(TileStatus::AwaitingConfirmation), E::TileConfirmed) => {
                Some(P::Scoreboard)
            }
            (
                P::DrawPhase(_) | P::WordPhase | P::BoardPhase(TileStatus::Choosing),
                E::ViewScoreboard,
            ) => Some(P::Scoreboard),
            _ => None,
        }
    }
}

/// Numeric knobs of the board mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardRules {
    /// Points for finding the word, unless the lottery picked another value.
    pub round_bonus: i32,
    /// Points won with the gain option.
    pub lottery_gain: i32,
    /// Points lost with the loss option.
    pub lottery_loss: i32,
    /// Points removed by a heavy-penalty tile, capped at the team score.
    pub heavy_penalty: i32,
    /// Points added by a jackpot tile.
    pub jackpot: i32,
    /// Lowest word value of the pick option.
    pub pick_min: i32,
    /// Highest word value of the pick option.
    pub pick_max: i32,
    /// Granularity of the pick option.
    pub pick_step: i32,
}

impl Default for BoardRules {
    fn default() -> Self {
        Self {
            round_bonus: 20,
            lottery_gain: 20,
            lottery_loss: 20,
            heavy_penalty: 30,
            jackpot: 100,
            pick_min: 10,
            pick_max: 50,
            pick_step: 10,
        }
    }
}

impl BoardRules {
    /// Whether `points` is a value the pick option may choose.
    pub fn accepts_pick(&self, points: i32) -> bool {
        points >= self.pick_min
            && points <= self.pick_max
            && self.pick_step > 0
            && (points - self.pick_min) % self.pick_step == 0
    }
}

/// Options of the lottery wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotteryOption {
    /// Drawing team wins points, round ends.
    Gain,
    /// Drawing team loses points, round ends.
    Loss,
    /// The word is worth the chosen value instead of the round bonus.
    PickValue(i32),
    /// Drawing team removes one other team from the word phase.
    RemoveOne,
    /// Drawing team removes two other teams from the word phase.
    RemoveTwo,
    /// Drawing team sits out the word phase.
    SelfOut,
}

impl LotteryOption {
    /// Labels shown on the wheel, in wheel order.
    pub const LABELS: [&'static str; 6] = [
        "Ganhe 20",
        "Perca 20",
        "10 a 50",
        "Tire uma",
        "Tire duas",
        "Fora",
    ];

    /// Parse a wheel label. The pick option needs the chosen value in `points`.
    pub fn from_label(label: &str, points: Option<i32>) -> Result<Self, LotteryParseError> {
        let option = match label.trim().to_lowercase().as_str() {
            "ganhe 20" | "gain" => LotteryOption::Gain,
            "perca 20" | "loss" => LotteryOption::Loss,
            "10 a 50" | "pick" => {
                LotteryOption::PickValue(points.ok_or(LotteryParseError::MissingPoints)?)
            }
            "tire uma" | "remove-one" => LotteryOption::RemoveOne,
            "tire duas" | "remove-two" => LotteryOption::RemoveTwo,
            "fora" | "out" => LotteryOption::SelfOut,
            _ => return Err(LotteryParseError::UnknownLabel(label.to_string())),
        };
        Ok(option)
    }

    /// Wheel label of the option.
    pub fn label(&self) -> &'static str {
        match self {
            LotteryOption::Gain => Self::LABELS[0],
            LotteryOption::Loss => Self::LABELS[1],
            LotteryOption::PickValue(_) => Self::LABELS[2],
            LotteryOption::RemoveOne => Self::LABELS[3],
            LotteryOption::RemoveTwo => Self::LABELS[4],
            LotteryOption::SelfOut => Self::LABELS[5],
        }
    }
}

impl fmt::Display for LotteryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LotteryOption::PickValue(points) => write!(f, "{} ({points})", self.label()),
            other => f.write_str(other.label()),
        }
    }
}

impl FromStr for LotteryOption {
    type Err = LotteryParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_label(value, None)
    }
}

/// Error returned when a lottery label cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LotteryParseError {
    /// Label is not on the wheel.
    #[error("unknown lottery option `{0}`")]
    UnknownLabel(String),
    /// The pick option was drawn without a value.
    #[error("the pick option needs a point value")]
    MissingPoints,
}

/// What the engine has to do after a lottery option was drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotteryResolution {
    /// Apply `delta` to `team`, then show the scoreboard.
    ApplyScore {
        /// Drawing team.
        team: Team,
        /// Signed score change.
        delta: i32,
    },
    /// Nobody would be left to guess; show the scoreboard.
    Scoreboard,
    /// The drawing team must pick `count` teams to remove.
    Removal {
        /// Teams to remove.
        count: u8,
    },
    /// Go straight to the word phase.
    WordPhase,
}

/// Reasons a board action is refused without changing anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardRejection {
    /// No drawing team yet.
    #[error("no round in progress")]
    NoRound,
    /// The chosen pick value is outside the allowed range.
    #[error("{0} is not an allowed word value")]
    PickOutOfRange(i32),
    /// The drawing team cannot remove itself.
    #[error("{0} drew the lottery and cannot remove itself")]
    RemovingDrawer(Team),
    /// The team is already out of this round.
    #[error("{0} is already out of this round")]
    AlreadyRemoved(Team),
    /// The team may not answer right now.
    #[error("{0} cannot answer now")]
    NotEligible(Team),
    /// Another team is answering.
    #[error("{0} is already answering")]
    AnswerInProgress(Team),
    /// No team is answering.
    #[error("no team is answering")]
    NoActiveTeam,
    /// No board or no board team.
    #[error("no board in play")]
    NoBoard,
    /// The tile is outside the board.
    #[error("tile {0} is not on the board")]
    UnknownTile(TilePos),
    /// The tile was already revealed.
    #[error("tile {0} was already revealed")]
    TileTaken(TilePos),
}

/// Outcome of a wrong answer in the word phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongAttempt {
    /// Team that missed.
    pub team: Team,
    /// Every team of the phase roster had missed, so the lockouts were lifted.
    pub lockouts_cleared: bool,
}

/// Tile chosen by the board team and the score change it causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileOutcome {
    /// Revealed tile.
    pub pos: TilePos,
    /// Its content.
    pub cell: BoardCell,
    /// Score change applied to the board team.
    pub delta: i32,
}

/// Score change caused by revealing `cell` for a team currently at `current_score`.
pub fn tile_effect(cell: BoardCell, current_score: i32, rules: &BoardRules) -> i32 {
    match cell {
        BoardCell::Points { value } => value,
        BoardCell::HeavyPenalty => -rules.heavy_penalty.min(current_score.max(0)),
        BoardCell::Jackpot => rules.jackpot,
    }
}

/// Board picked for a new round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardChoice {
    /// Chosen board.
    pub id: ItemId,
    /// Every board was fully revealed and the revealed tiles were forgotten.
    pub tiles_reset: bool,
}

/// Tiles revealed so far, per board, for the whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedTiles(BTreeMap<ItemId, IndexSet<TilePos>>);

impl RevealedTiles {
    /// Nothing revealed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `pos` of board `board` was revealed.
    pub fn contains(&self, board: ItemId, pos: TilePos) -> bool {
        self.0.get(&board).is_some_and(|tiles| tiles.contains(&pos))
    }

    /// Record `pos` of board `board`; `false` when it already was.
    pub fn insert(&mut self, board: ItemId, pos: TilePos) -> bool {
        self.0.entry(board).or_default().insert(pos)
    }

    /// Tiles revealed on `board`, in reveal order.
    pub fn for_board(&self, board: ItemId) -> Vec<TilePos> {
        self.0
            .get(&board)
            .map(|tiles| tiles.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether every tile of `board` was revealed.
    pub fn is_exhausted(&self, board: &Board) -> bool {
        board
            .positions()
            .all(|pos| self.contains(board.id, pos))
    }

    /// Forget every revealed tile.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Pick a random board that still has hidden tiles, resetting all boards
    /// when none has. Returns `None` only without boards.
    pub fn choose_board<R: Rng + ?Sized>(
        &mut self,
        boards: &[Board],
        rng: &mut R,
    ) -> Option<BoardChoice> {
        if boards.is_empty() {
            return None;
        }

        let mut tiles_reset = false;
        let mut open: Vec<&Board> = boards
            .iter()
            .filter(|board| !self.is_exhausted(board))
            .collect();

        if open.is_empty() {
            self.clear();
            tiles_reset = true;
            open = boards.iter().collect();
        }

        let board = open[rng.random_range(0..open.len())];
        Some(BoardChoice {
            id: board.id,
            tiles_reset,
        })
    }
}

/// Data of the current board round plus the session-wide rotation and tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRound {
    /// Rotation pointer; persists across rounds.
    pub turns: TurnResolver,
    /// Revealed tiles; persist across rounds.
    pub revealed_tiles: RevealedTiles,
    /// Team that drew the lottery this round.
    pub drawing_team: Option<Team>,
    /// Word to guess.
    pub word: Option<BoardWord>,
    /// Board used in the board phase.
    pub board: Option<Board>,
    /// Option drawn this round.
    pub lottery_option: Option<LotteryOption>,
    /// Points awarded for finding the word.
    pub word_bonus: i32,
    /// Teams taken out of the word phase by the lottery.
    pub lottery_out: TeamSet,
    /// Teams that answered wrong in the word phase.
    pub guess_out: TeamSet,
    /// Teams eligible when the word phase started.
    pub word_roster: TeamSet,
    /// Team currently answering the word.
    pub guessing_team: Option<Team>,
    /// Team that found the word and plays the board.
    pub board_team: Option<Team>,
    /// Last tile resolved this round.
    pub last_tile: Option<TileOutcome>,
}

impl BoardRound {
    /// Empty session: no round played, nothing revealed.
    pub fn new(rules: &BoardRules) -> Self {
        Self {
            turns: TurnResolver::new(),
            revealed_tiles: RevealedTiles::new(),
            drawing_team: None,
            word: None,
            board: None,
            lottery_option: None,
            word_bonus: rules.round_bonus,
            lottery_out: TeamSet::new(),
            guess_out: TeamSet::new(),
            word_roster: TeamSet::new(),
            guessing_team: None,
            board_team: None,
            last_tile: None,
        }
    }

    /// Start the next round: advance the rotation, clear both lockout sets and
    /// install the new word and board. Returns the drawing team.
    pub fn begin(&mut self, word: BoardWord, board: Board, rules: &BoardRules) -> Team {
        let drawer = self.turns.advance();
        self.drawing_team = Some(drawer);
        self.word = Some(word);
        self.board = Some(board);
        self.lottery_option = None;
        self.word_bonus = rules.round_bonus;
        self.lottery_out.clear();
        self.guess_out.clear();
        self.word_roster.clear();
        self.guessing_team = None;
        self.board_team = None;
        self.last_tile = None;
        drawer
    }

    /// Drop the round data but keep the rotation and revealed tiles.
    pub fn clear_round(&mut self, rules: &BoardRules) {
        let turns = self.turns;
        let tiles = std::mem::take(&mut self.revealed_tiles);
        *self = Self::new(rules);
        self.turns = turns;
        self.revealed_tiles = tiles;
    }

    /// Teams still in the lottery, drawer included.
    pub fn lottery_eligible(&self) -> TeamSet {
        eligible_teams(&[&self.lottery_out])
    }

    /// Teams allowed to answer the word right now.
    pub fn word_eligible(&self) -> TeamSet {
        eligible_teams(&[&self.lottery_out, &self.guess_out])
    }

    /// Decide what a drawn option does, without changing anything.
    pub fn resolve_lottery(
        &self,
        option: LotteryOption,
        rules: &BoardRules,
    ) -> Result<LotteryResolution, BoardRejection> {
        let drawer = self.drawing_team.ok_or(BoardRejection::NoRound)?;

        let resolution = match option {
            LotteryOption::Gain => LotteryResolution::ApplyScore {
                team: drawer,
                delta: rules.lottery_gain,
            },
            LotteryOption::Loss => LotteryResolution::ApplyScore {
                team: drawer,
                delta: -rules.lottery_loss,
            },
            LotteryOption::PickValue(points) => {
                if !rules.accepts_pick(points) {
                    return Err(BoardRejection::PickOutOfRange(points));
                }
                LotteryResolution::WordPhase
            }
            LotteryOption::RemoveOne | LotteryOption::RemoveTwo => {
                let count: u8 = if option == LotteryOption::RemoveOne { 1 } else { 2 };
                let remaining = self.lottery_eligible().len() as i64 - i64::from(count);
                if remaining <= 0 {
                    LotteryResolution::Scoreboard
                } else {
                    LotteryResolution::Removal { count }
                }
            }
            LotteryOption::SelfOut => {
                let others = self
                    .lottery_eligible()
                    .iter()
                    .filter(|team| *team != drawer)
                    .count();
                if others == 0 {
                    LotteryResolution::Scoreboard
                } else {
                    LotteryResolution::WordPhase
                }
            }
        };

        Ok(resolution)
    }

    /// Record the drawn option and its direct side effects.
    pub fn apply_lottery(&mut self, option: LotteryOption) {
        self.lottery_option = Some(option);
        match option {
            LotteryOption::PickValue(points) => self.word_bonus = points,
            LotteryOption::SelfOut => {
                if let Some(drawer) = self.drawing_team {
                    self.lottery_out.insert(drawer);
                }
            }
            _ => {}
        }
    }

    /// Check that `team` may be removed by the pending removal option.
    pub fn check_removal(&self, team: Team) -> Result<(), BoardRejection> {
        let drawer = self.drawing_team.ok_or(BoardRejection::NoRound)?;
        if team == drawer {
            return Err(BoardRejection::RemovingDrawer(team));
        }
        if self.lottery_out.contains(team) {
            return Err(BoardRejection::AlreadyRemoved(team));
        }
        Ok(())
    }

    /// Take `team` out of the word phase.
    pub fn remove_team(&mut self, team: Team) {
        self.lottery_out.insert(team);
    }

    /// Freeze the roster of teams allowed in the word phase.
    pub fn open_word_phase(&mut self) {
        self.guess_out.clear();
        self.guessing_team = None;
        self.word_roster = self.word_eligible();
    }

    /// Check that `team` may start answering.
    pub fn check_attempt(&self, team: Team) -> Result<(), BoardRejection> {
        if let Some(current) = self.guessing_team {
            return Err(BoardRejection::AnswerInProgress(current));
        }
        if !self.word_eligible().contains(team) {
            return Err(BoardRejection::NotEligible(team));
        }
        Ok(())
    }

    /// Lock out the answering team; once every roster team has missed, all
    /// guess lockouts are lifted so the phase cannot stall.
    pub fn register_wrong_attempt(&mut self) -> Option<WrongAttempt> {
        let team = self.guessing_team.take()?;
        self.guess_out.insert(team);

        let lockouts_cleared = self.guess_out.covers(&self.word_roster);
        if lockouts_cleared {
            self.guess_out.clear();
        }

        Some(WrongAttempt {
            team,
            lockouts_cleared,
        })
    }

    /// Hand the board to the team that found the word.
    pub fn award_board(&mut self) -> Option<Team> {
        let team = self.guessing_team.take()?;
        self.board_team = Some(team);
        Some(team)
    }

    /// Check that `pos` can be revealed and return its content.
    pub fn check_tile(&self, pos: TilePos) -> Result<(Team, BoardCell), BoardRejection> {
        let board = self.board.as_ref().ok_or(BoardRejection::NoBoard)?;
        let team = self.board_team.ok_or(BoardRejection::NoBoard)?;
        let cell = board.cell(pos).ok_or(BoardRejection::UnknownTile(pos))?;
        if self.revealed_tiles.contains(board.id, pos) {
            return Err(BoardRejection::TileTaken(pos));
        }
        Ok((team, cell))
    }

    /// Record a resolved tile.
    pub fn reveal_tile(&mut self, outcome: TileOutcome) {
        if let Some(board) = &self.board {
            self.revealed_tiles.insert(board.id, outcome.pos);
        }
        self.last_tile = Some(outcome);
    }
}
