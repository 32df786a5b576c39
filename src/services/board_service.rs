use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use super::{
    ActionOutcome, Collaborators, bounded,
    notifier::Notifier,
    resume::{ResumeStore, StaleSnapshot, check_resume},
    score_ledger::ScoreLedger,
    session_pool::SessionPool,
    settle,
};
use crate::{
    config::AppConfig,
    dao::{
        catalog::CatalogService,
        snapshot::{BoardRoundSnapshot, BoardSessionEntity, SnapshotEnvelope},
    },
    dto::view::BoardRoundView,
    error::ServiceError,
    state::{
        RoundSession,
        board::{
            BoardEvent, BoardPhase, BoardRound, BoardRules, DrawStatus, LotteryOption,
            LotteryResolution, TileOutcome, TileStatus, tile_effect,
        },
        content::{Board, BoardCell, BoardWord, CategoryFilter, GameMode, ItemId, TilePos},
        team::Team,
    },
};

const MODE: GameMode = GameMode::Board;

/// Board/lottery mode: the drawing team spins the lottery, the remaining
/// teams race for the word and the winner picks one board tile.
///
/// The drawing team follows a fixed rotation, one step per round. Revealed
/// tiles and the rotation outlive the round and are persisted on their own.
#[derive(Clone)]
pub struct BoardEngine {
    inner: Arc<Inner>,
}

struct Inner {
    session: RoundSession<BoardPhase, BoardRound>,
    pool: SessionPool<BoardWord>,
    catalog: Arc<dyn CatalogService>,
    resume: ResumeStore,
    ledger: Arc<ScoreLedger>,
    notifier: Arc<Notifier>,
    rules: BoardRules,
    call_timeout: Duration,
}

/// Round data restored from a snapshot, before it is applied.
struct RestoredRound {
    word: BoardWord,
    board: Board,
}

impl BoardEngine {
    /// Idle engine over `collaborators`; call [`BoardEngine::initialize`] next.
    pub fn new(collaborators: Collaborators, config: &AppConfig) -> Self {
        let resume = ResumeStore::new(collaborators.kv.clone(), MODE);
        let pool = SessionPool::new(
            MODE,
            collaborators.catalog.clone(),
            resume.clone(),
            collaborators.notifier.clone(),
            config.call_timeout,
        );
        Self {
            inner: Arc::new(Inner {
                session: RoundSession::new(BoardRound::new(&config.board)),
                pool,
                catalog: collaborators.catalog,
                resume,
                ledger: collaborators.ledger,
                notifier: collaborators.notifier,
                rules: config.board,
                call_timeout: config.call_timeout,
            }),
        }
    }

    /// Reload the rotation and tiles, then resume the saved round or start one.
    pub async fn initialize(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.initialize().await;
        settle(MODE, "initialize", &self.inner.notifier, result)
    }

    /// Switch categories. The live round is dropped; rotation and tiles stay.
    pub async fn set_category_filter(
        &self,
        filter: CategoryFilter,
    ) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.set_category_filter(filter).await;
        settle(MODE, "set_category_filter", &self.inner.notifier, result)
    }

    /// Hand the lottery to the next team in rotation with a fresh word and board.
    pub async fn start_new_round(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.start_new_round().await;
        settle(MODE, "start_new_round", &self.inner.notifier, result)
    }

    /// Apply the option the drawing team landed on.
    pub async fn select_lottery_option(
        &self,
        option: LotteryOption,
    ) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.select_lottery_option(option).await;
        settle(MODE, "select_lottery_option", &self.inner.notifier, result)
    }

    /// Take `team` out of the word phase after a removal option.
    pub async fn remove_team(&self, team: Team) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.remove_team(team).await;
        settle(MODE, "remove_team", &self.inner.notifier, result)
    }

    /// Drop the pending removals and open the word phase.
    pub async fn skip_removal(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.skip_removal().await;
        settle(MODE, "skip_removal", &self.inner.notifier, result)
    }

    /// Let `team` answer the word, unless it is out of this word phase.
    pub async fn team_buzzes(&self, team: Team) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.team_buzzes(team).await;
        settle(MODE, "team_buzzes", &self.inner.notifier, result)
    }

    /// Judge the word answer. The finder gets the word value and the board.
    pub async fn operator_verdict(&self, correct: bool) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.operator_verdict(correct).await;
        settle(MODE, "operator_verdict", &self.inner.notifier, result)
    }

    /// Reveal one tile for the board team and apply its effect once.
    pub async fn select_board_tile(&self, pos: TilePos) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.select_board_tile(pos).await;
        settle(MODE, "select_board_tile", &self.inner.notifier, result)
    }

    /// Acknowledge the revealed tile and move on to the scoreboard.
    pub async fn confirm_tile_action(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.confirm_tile_action().await;
        settle(MODE, "confirm_tile_action", &self.inner.notifier, result)
    }

    /// Leave the draw, the word or an unresolved board for the scoreboard.
    pub async fn view_scoreboard(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.view_scoreboard().await;
        settle(MODE, "view_scoreboard", &self.inner.notifier, result)
    }

    /// Forget the round, the rotation, the revealed tiles and the played words.
    pub async fn reset_game(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.reset_game().await;
        settle(MODE, "reset_game", &self.inner.notifier, result)
    }

    /// Current phase.
    pub async fn phase(&self) -> BoardPhase {
        self.inner.session.phase().await
    }

    /// Operator view, word included.
    pub async fn view(&self) -> BoardRoundView {
        let filter = self.inner.pool.filter().await;
        let scores = self.inner.ledger.scores().await;
        self.inner
            .session
            .read(|machine, round| BoardRoundView::build(machine.snapshot(), round, filter, scores))
            .await
    }

    /// Words consumed this session.
    pub async fn played(&self) -> Vec<ItemId> {
        self.inner.pool.played().await
    }
}

impl Inner {
    async fn initialize(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let filter = self.pool.initialize().await;
        if let Err(err) = self.ledger.refresh().await {
            warn!(mode = %MODE, error = %err, "failed to fetch scores");
        }

        if let Some(saved) = self.resume.load_session::<BoardSessionEntity>().await {
            self.session
                .update(|_, round| {
                    round.turns = saved.turns;
                    round.revealed_tiles = saved.revealed_tiles;
                })
                .await;
        }

        self.pool.reload().await?;
        let boards = self.list_boards().await?;

        if let Some(envelope) = self.resume.load_round::<BoardRoundSnapshot>().await {
            match self.check_snapshot(&envelope, &filter, &boards).await {
                Ok(restored) => {
                    let phase = envelope.round.phase;
                    self.apply_snapshot(envelope.round, restored).await;
                    info!(mode = %MODE, phase = ?phase, "resumed saved round");
                    return Ok(());
                }
                Err(reason) => {
                    info!(mode = %MODE, reason = %reason, "discarding saved round");
                    self.resume.clear_round().await;
                }
            }
        }

        self.start_new_round_locked().await
    }

    async fn check_snapshot(
        &self,
        envelope: &SnapshotEnvelope<BoardRoundSnapshot>,
        filter: &CategoryFilter,
        boards: &[Board],
    ) -> Result<RestoredRound, StaleSnapshot> {
        let saved = &envelope.round;
        check_resume(envelope, filter, saved.phase.is_resumable())?;

        if saved.drawing_team.is_none() {
            return Err(StaleSnapshot::Inconsistent("round without a drawing team"));
        }
        if matches!(saved.phase, BoardPhase::BoardPhase(_)) && saved.board_team.is_none() {
            return Err(StaleSnapshot::Inconsistent("board phase without a board team"));
        }
        if saved.guessing_team.is_some() && saved.phase != BoardPhase::WordPhase {
            return Err(StaleSnapshot::Inconsistent("answering team outside the word phase"));
        }
        if saved.phase == BoardPhase::BoardPhase(TileStatus::AwaitingConfirmation)
            && saved.last_tile.is_none()
        {
            return Err(StaleSnapshot::Inconsistent("confirmation pending without a tile"));
        }

        let word = self
            .pool
            .get(saved.word_id)
            .await
            .ok_or(StaleSnapshot::MissingItem(saved.word_id))?;
        let board = boards
            .iter()
            .find(|board| board.id == saved.board_id)
            .cloned()
            .ok_or(StaleSnapshot::MissingItem(saved.board_id))?;

        Ok(RestoredRound { word, board })
    }

    async fn apply_snapshot(&self, saved: BoardRoundSnapshot, restored: RestoredRound) {
        let mut round = self.session.read(|_, round| round.clone()).await;
        round.drawing_team = saved.drawing_team;
        round.word = Some(restored.word);
        round.board = Some(restored.board);
        round.lottery_option = saved.lottery_option;
        round.word_bonus = saved.word_bonus;
        round.lottery_out = saved.lottery_out;
        round.guess_out = saved.guess_out;
        round.word_roster = saved.word_roster;
        round.guessing_team = saved.guessing_team;
        round.board_team = saved.board_team;
        round.last_tile = saved.last_tile;
        self.session.restore(saved.phase, round).await;
    }

    async fn list_boards(&self) -> Result<Vec<Board>, ServiceError> {
        bounded(self.call_timeout, self.catalog.list_boards()).await
    }

    async fn set_category_filter(&self, filter: CategoryFilter) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.pool.set_filter(filter).await;
        self.go_idle().await;
        self.persist().await;
        Ok(())
    }

    async fn start_new_round(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.start_new_round_locked().await
    }

    /// Start a round; the caller holds the action gate.
    async fn start_new_round_locked(&self) -> Result<(), ServiceError> {
        let rules = self.rules;
        let result = self
            .session
            .run_transition(
                BoardEvent::StartRound,
                || async {
                    self.pool.reload().await?;
                    let drawn = self.pool.pick().await?;
                    let boards = self.list_boards().await?;
                    let mut tiles = self.session.read(|_, round| round.revealed_tiles.clone()).await;
                    let choice = tiles
                        .choose_board(&boards, &mut rand::rng())
                        .ok_or_else(|| ServiceError::NotFound("no board in the catalog".into()))?;
                    let board = boards
                        .into_iter()
                        .find(|board| board.id == choice.id)
                        .ok_or_else(|| ServiceError::NotFound(format!("board {}", choice.id)))?;
                    Ok((drawn, board, choice.tiles_reset))
                },
                |round, (drawn, board, tiles_reset)| {
                    if tiles_reset {
                        round.revealed_tiles.clear();
                    }
                    let word_id = drawn.item.id;
                    let board_id = board.id;
                    let drawer = round.begin(drawn.item, board, &rules);
                    (drawer, word_id, board_id, drawn.pick, tiles_reset)
                },
            )
            .await;

        match result {
            Ok(((drawer, word_id, board_id, pick, tiles_reset), _)) => {
                // The word is spent by the round that drew it, whatever the outcome.
                self.pool.accept(pick).await;
                self.pool.mark_played(word_id).await;
                if tiles_reset {
                    info!(mode = %MODE, "every board was fully revealed; tiles reset");
                }
                info!(mode = %MODE, team = %drawer, word_id, board_id, "round started");
                self.persist().await;
                self.notifier.info(
                    Some(MODE),
                    format!("Vez da equipe {} sortear!", drawer.display_name()),
                );
                Ok(())
            }
            Err(ServiceError::PoolExhausted) => {
                self.go_idle().await;
                Err(ServiceError::PoolExhausted)
            }
            Err(err) => Err(err),
        }
    }

    async fn select_lottery_option(&self, option: LotteryOption) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let rules = self.rules;
        let (phase, resolution) = self
            .session
            .read(|machine, round| (machine.phase(), round.resolve_lottery(option, &rules)))
            .await;
        if phase != BoardPhase::DrawPhase(DrawStatus::Choosing) {
            return Err(ServiceError::InvalidTransition(format!(
                "lottery already drawn (phase {phase:?})"
            )));
        }

        match resolution? {
            LotteryResolution::ApplyScore { team, delta } => {
                let ledger = self.ledger.clone();
                self.session
                    .run_transition(
                        BoardEvent::FlatScoreApplied,
                        || async move { ledger.apply_delta(team, delta).await },
                        |round, ()| round.apply_lottery(option),
                    )
                    .await?;
                self.ledger.reconcile().await;
                info!(mode = %MODE, team = %team, option = %option, delta, "lottery score applied");
                let message = format!("Equipe {}: {option}", team.display_name());
                if delta >= 0 {
                    self.notifier.success(Some(MODE), message);
                } else {
                    self.notifier.warning(Some(MODE), message);
                }
            }
            LotteryResolution::Scoreboard => {
                self.session
                    .advance(BoardEvent::ViewScoreboard, |round| round.apply_lottery(option))
                    .await?;
                info!(mode = %MODE, option = %option, "no team left for the word phase");
                self.notifier
                    .warning(Some(MODE), "Não há equipes suficientes. Indo para o placar.");
            }
            LotteryResolution::Removal { count } => {
                self.session
                    .advance(BoardEvent::RemovalRequested(count), |round| {
                        round.apply_lottery(option)
                    })
                    .await?;
                info!(mode = %MODE, option = %option, count, "waiting for removals");
            }
            LotteryResolution::WordPhase => {
                self.session
                    .advance(BoardEvent::EnterWordPhase, |round| {
                        round.apply_lottery(option);
                        round.open_word_phase();
                    })
                    .await?;
                info!(mode = %MODE, option = %option, "word phase opened");
            }
        }

        self.persist().await;
        Ok(())
    }

    async fn remove_team(&self, team: Team) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let (remaining, check) = self
            .session
            .read(|machine, round| {
                let remaining = match machine.phase() {
                    BoardPhase::DrawPhase(DrawStatus::Removing { remaining }) => Some(remaining),
                    _ => None,
                };
                (remaining, round.check_removal(team))
            })
            .await;
        let remaining = remaining
            .ok_or_else(|| ServiceError::InvalidTransition("no removal pending".into()))?;
        check?;

        let last = remaining == 1;
        self.session
            .advance(BoardEvent::TeamRemoved, |round| {
                round.remove_team(team);
                if last {
                    round.open_word_phase();
                }
            })
            .await?;
        self.persist().await;
        info!(mode = %MODE, team = %team, remaining = remaining - 1, "team removed");
        self.notifier.info(
            Some(MODE),
            format!("Equipe {} está fora desta rodada", team.display_name()),
        );
        Ok(())
    }

    async fn skip_removal(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.session
            .advance(BoardEvent::RemovalSkipped, BoardRound::open_word_phase)
            .await?;
        self.persist().await;
        info!(mode = %MODE, "pending removals skipped");
        Ok(())
    }

    async fn team_buzzes(&self, team: Team) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let (phase, check) = self
            .session
            .read(|machine, round| (machine.phase(), round.check_attempt(team)))
            .await;
        if phase != BoardPhase::WordPhase {
            return Err(ServiceError::InvalidTransition(format!(
                "no word to answer (phase {phase:?})"
            )));
        }
        check?;

        self.session
            .advance(BoardEvent::Attempt(team), |round| {
                round.guessing_team = Some(team)
            })
            .await?;
        self.persist().await;
        info!(mode = %MODE, team = %team, "team buzzed");
        Ok(())
    }

    async fn operator_verdict(&self, correct: bool) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let (team, bonus) = self
            .session
            .read(|machine, round| {
                round
                    .guessing_team
                    .filter(|_| machine.phase() == BoardPhase::WordPhase)
                    .map(|team| (team, round.word_bonus))
            })
            .await
            .ok_or_else(|| ServiceError::InvalidTransition("no team is answering".into()))?;

        if correct {
            self.accept_word(team, bonus).await
        } else {
            self.reject_word().await
        }
    }

    async fn accept_word(&self, team: Team, bonus: i32) -> Result<(), ServiceError> {
        let ledger = self.ledger.clone();
        self.session
            .run_transition(
                BoardEvent::WordGuessed,
                || async move { ledger.apply_delta(team, bonus).await },
                |round, ()| round.award_board(),
            )
            .await?;

        self.persist().await;
        self.ledger.reconcile().await;
        info!(mode = %MODE, team = %team, bonus, "word found");
        self.notifier.success(
            Some(MODE),
            format!(
                "Equipe {} acertou! Ganhou {bonus} pontos e escolhe no tabuleiro!",
                team.display_name()
            ),
        );
        Ok(())
    }

    async fn reject_word(&self) -> Result<(), ServiceError> {
        let (_, wrong) = self
            .session
            .advance(BoardEvent::WrongGuess, BoardRound::register_wrong_attempt)
            .await?;
        self.persist().await;

        if let Some(wrong) = wrong {
            info!(
                mode = %MODE,
                team = %wrong.team,
                lockouts_cleared = wrong.lockouts_cleared,
                "wrong answer"
            );
            self.notifier.warning(
                Some(MODE),
                format!("Equipe {} errou!", wrong.team.display_name()),
            );
            if wrong.lockouts_cleared {
                self.notifier.info(
                    Some(MODE),
                    "Todas as equipes erraram; todas podem palpitar de novo",
                );
            }
        }
        Ok(())
    }

    async fn select_board_tile(&self, pos: TilePos) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let (team, cell) = self.session.read(|_, round| round.check_tile(pos)).await?;

        let ledger = self.ledger.clone();
        let rules = self.rules;
        let (outcome, _) = self
            .session
            .run_transition(
                BoardEvent::TileRevealed,
                || async move {
                    let current = match cell {
                        BoardCell::HeavyPenalty => ledger.current_points(team).await?,
                        _ => 0,
                    };
                    let delta = tile_effect(cell, current, &rules);
                    if delta != 0 {
                        ledger.apply_delta(team, delta).await?;
                    }
                    Ok(delta)
                },
                |round, delta| {
                    let outcome = TileOutcome { pos, cell, delta };
                    round.reveal_tile(outcome);
                    outcome
                },
            )
            .await?;

        self.persist().await;
        if outcome.delta != 0 {
            self.ledger.reconcile().await;
        }
        info!(mode = %MODE, team = %team, tile = %pos, delta = outcome.delta, "tile revealed");
        let message = format!("Equipe {}: {:+} pontos", team.display_name(), outcome.delta);
        if outcome.delta >= 0 {
            self.notifier.success(Some(MODE), message);
        } else {
            self.notifier.warning(Some(MODE), message);
        }
        Ok(())
    }

    async fn confirm_tile_action(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.session
            .advance(BoardEvent::TileConfirmed, |_| ())
            .await?;
        self.persist().await;
        if let Err(err) = self.ledger.refresh().await {
            warn!(mode = %MODE, error = %err, "failed to refresh scores");
        }
        Ok(())
    }

    async fn view_scoreboard(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.session
            .advance(BoardEvent::ViewScoreboard, |round| round.guessing_team = None)
            .await?;
        self.persist().await;
        if let Err(err) = self.ledger.refresh().await {
            warn!(mode = %MODE, error = %err, "failed to refresh scores");
        }
        Ok(())
    }

    async fn reset_game(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let rules = self.rules;
        self.session
            .reset(|round| *round = BoardRound::new(&rules))
            .await;
        self.resume.clear_round().await;
        self.resume.clear_session().await;
        self.pool.clear_played().await;
        info!(mode = %MODE, "game reset");
        self.notifier.info(Some(MODE), "Jogo reiniciado");
        Ok(())
    }

    /// Drop the round but keep the rotation and the revealed tiles.
    async fn go_idle(&self) {
        let rules = self.rules;
        self.session
            .reset(|round| round.clear_round(&rules))
            .await;
        self.resume.clear_round().await;
    }

    /// Save the cross-round session and the live round, if any.
    async fn persist(&self) {
        let (session, snapshot) = self
            .session
            .read(|machine, round| {
                let session = BoardSessionEntity {
                    turns: round.turns,
                    revealed_tiles: round.revealed_tiles.clone(),
                };
                let phase = machine.phase();
                let snapshot = match (&round.word, &round.board) {
                    (Some(word), Some(board)) if phase.is_resumable() => Some(BoardRoundSnapshot {
                        word_id: word.id,
                        board_id: board.id,
                        phase,
                        drawing_team: round.drawing_team,
                        lottery_option: round.lottery_option,
                        word_bonus: round.word_bonus,
                        lottery_out: round.lottery_out.clone(),
                        guess_out: round.guess_out.clone(),
                        word_roster: round.word_roster.clone(),
                        guessing_team: round.guessing_team,
                        board_team: round.board_team,
                        last_tile: round.last_tile,
                    }),
                    _ => None,
                };
                (session, snapshot)
            })
            .await;

        self.resume.save_session(&session).await;
        let filter = self.pool.filter().await;
        self.resume
            .save_round(snapshot.map(|round| SnapshotEnvelope::now(filter, round)))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{catalog::InMemoryCatalog, kv::MemoryKvStore, scores::InMemoryScoreService};

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::builder()
            .board_word(
                BoardWord {
                    id: 21,
                    word: "GATO".into(),
                    order_index: Some(1),
                },
                [1],
            )
            .board_word(
                BoardWord {
                    id: 22,
                    word: "SAPO".into(),
                    order_index: None,
                },
                [1],
            )
            .board(Board {
                id: 31,
                name: "Clássico".into(),
                cells: vec![
                    vec![BoardCell::Points { value: 10 }, BoardCell::HeavyPenalty],
                    vec![BoardCell::Jackpot, BoardCell::Points { value: -5 }],
                ],
            })
            .build()
    }

    struct Fixture {
        engine: BoardEngine,
        scores: InMemoryScoreService,
    }

    fn engine_over(kv: MemoryKvStore, scores: InMemoryScoreService) -> Fixture {
        let collaborators = Collaborators {
            catalog: Arc::new(catalog()),
            ledger: Arc::new(ScoreLedger::new(Arc::new(scores.clone()))),
            kv: Arc::new(kv),
            notifier: Arc::new(Notifier::default()),
        };
        Fixture {
            engine: BoardEngine::new(collaborators, &AppConfig::default()),
            scores,
        }
    }

    async fn started() -> Fixture {
        let fx = engine_over(MemoryKvStore::new(), InMemoryScoreService::new());
        fx.engine.initialize().await.unwrap();
        fx
    }

    /// Play the lottery with `option`, then let `team` find the word.
    async fn win_word(fx: &Fixture, option: LotteryOption, team: Team) {
        fx.engine.select_lottery_option(option).await.unwrap();
        fx.engine.team_buzzes(team).await.unwrap();
        fx.engine.operator_verdict(true).await.unwrap();
    }

    #[tokio::test]
    async fn rotation_moves_one_team_per_round() {
        let fx = started().await;
        let mut drawers = vec![fx.engine.view().await.drawing_team];
        for _ in 0..4 {
            fx.engine.view_scoreboard().await.unwrap();
            fx.engine.start_new_round().await.unwrap();
            drawers.push(fx.engine.view().await.drawing_team);
        }
        let expected = [Team::Red, Team::Blue, Team::Green, Team::Yellow, Team::Red];
        assert_eq!(drawers, expected.map(Some).to_vec());
    }

    #[tokio::test]
    async fn flat_option_scores_drawer_and_ends_round() {
        let fx = started().await;
        fx.engine
            .select_lottery_option(LotteryOption::Gain)
            .await
            .unwrap();
        assert_eq!(fx.engine.phase().await, BoardPhase::Scoreboard);
        assert_eq!(fx.scores.points(Team::Red).await, 20);
        assert_eq!(fx.engine.played().await, vec![21]);
    }

    #[tokio::test]
    async fn failed_flat_option_keeps_the_draw_open() {
        let fx = started().await;
        fx.scores.set_offline(true);
        let err = fx
            .engine
            .select_lottery_option(LotteryOption::Loss)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(
            fx.engine.phase().await,
            BoardPhase::DrawPhase(DrawStatus::Choosing)
        );
        assert!(fx.engine.view().await.lottery_option.is_none());
    }

    #[tokio::test]
    async fn removals_lead_to_word_phase() {
        let fx = started().await;
        fx.engine
            .select_lottery_option(LotteryOption::RemoveTwo)
            .await
            .unwrap();
        assert_eq!(
            fx.engine.phase().await,
            BoardPhase::DrawPhase(DrawStatus::Removing { remaining: 2 })
        );

        let drawer = fx.engine.remove_team(Team::Red).await.unwrap();
        assert!(matches!(drawer, ActionOutcome::Ignored(_)));
        fx.engine.remove_team(Team::Blue).await.unwrap();
        let again = fx.engine.remove_team(Team::Blue).await.unwrap();
        assert!(matches!(again, ActionOutcome::Ignored(_)));
        fx.engine.remove_team(Team::Green).await.unwrap();

        let view = fx.engine.view().await;
        assert_eq!(view.phase, BoardPhase::WordPhase);
        assert_eq!(view.eligible, vec![Team::Red, Team::Yellow]);
        let removed = fx.engine.team_buzzes(Team::Blue).await.unwrap();
        assert!(matches!(removed, ActionOutcome::Ignored(_)));
    }

    #[tokio::test]
    async fn skipping_removal_opens_word_phase() {
        let fx = started().await;
        fx.engine
            .select_lottery_option(LotteryOption::RemoveOne)
            .await
            .unwrap();
        fx.engine.skip_removal().await.unwrap();
        let view = fx.engine.view().await;
        assert_eq!(view.phase, BoardPhase::WordPhase);
        assert_eq!(view.eligible.len(), 4);
    }

    #[tokio::test]
    async fn three_wrong_answers_lift_lockouts() {
        let fx = started().await;
        fx.engine
            .select_lottery_option(LotteryOption::SelfOut)
            .await
            .unwrap();
        for team in [Team::Blue, Team::Green, Team::Yellow] {
            fx.engine.team_buzzes(team).await.unwrap();
            fx.engine.operator_verdict(false).await.unwrap();
        }

        let view = fx.engine.view().await;
        assert_eq!(view.phase, BoardPhase::WordPhase);
        assert!(view.guess_out.is_empty());
        assert_eq!(view.eligible, vec![Team::Blue, Team::Green, Team::Yellow]);
        let drawer = fx.engine.team_buzzes(Team::Red).await.unwrap();
        assert!(matches!(drawer, ActionOutcome::Ignored(_)));
        assert!(fx.engine.team_buzzes(Team::Blue).await.unwrap().is_applied());
    }

    #[tokio::test]
    async fn tile_effect_is_applied_once_until_confirmed() {
        let fx = started().await;
        win_word(&fx, LotteryOption::PickValue(40), Team::Blue).await;
        assert_eq!(fx.scores.points(Team::Blue).await, 40);
        assert_eq!(fx.engine.played().await, vec![21]);
        assert_eq!(
            fx.engine.phase().await,
            BoardPhase::BoardPhase(TileStatus::Choosing)
        );

        let pos = TilePos::new(0, 0);
        fx.engine.select_board_tile(pos).await.unwrap();
        let second = fx.engine.select_board_tile(pos).await.unwrap();
        assert!(matches!(second, ActionOutcome::Ignored(_)));
        let other = fx.engine.select_board_tile(TilePos::new(1, 0)).await.unwrap();
        assert!(matches!(other, ActionOutcome::Ignored(_)));
        let skip = fx.engine.view_scoreboard().await.unwrap();
        assert!(matches!(skip, ActionOutcome::Ignored(_)));

        assert_eq!(fx.scores.points(Team::Blue).await, 50);
        assert_eq!(fx.scores.mutation_count(), 2);
        assert!(fx.engine.view().await.awaiting_confirmation);

        fx.engine.confirm_tile_action().await.unwrap();
        assert_eq!(fx.engine.phase().await, BoardPhase::Scoreboard);
    }

    #[tokio::test]
    async fn heavy_penalty_stops_at_zero() {
        let fx = started().await;
        win_word(&fx, LotteryOption::SelfOut, Team::Green).await;
        assert_eq!(fx.scores.points(Team::Green).await, 20);

        fx.engine
            .select_board_tile(TilePos::new(0, 1))
            .await
            .unwrap();
        assert_eq!(fx.scores.points(Team::Green).await, 0);
        assert_eq!(fx.engine.view().await.last_tile.map(|tile| tile.delta), Some(-20));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_score_service_still_applies_tile_once() {
        let fx = started().await;
        win_word(&fx, LotteryOption::SelfOut, Team::Green).await;
        assert_eq!(fx.scores.points(Team::Green).await, 20);

        // Read then write take longer together than one call may.
        fx.scores
            .set_latency(Duration::from_secs(4), Duration::from_secs(2));
        let heavy = TilePos::new(0, 1);
        assert!(fx.engine.select_board_tile(heavy).await.unwrap().is_applied());
        assert_eq!(
            fx.engine.phase().await,
            BoardPhase::BoardPhase(TileStatus::AwaitingConfirmation)
        );
        assert_eq!(fx.scores.points(Team::Green).await, 0);

        let again = fx.engine.select_board_tile(heavy).await.unwrap();
        assert!(matches!(again, ActionOutcome::Ignored(_)));
        assert_eq!(fx.scores.points(Team::Green).await, 0);
        assert_eq!(fx.scores.mutation_count(), 2);
        assert!(fx.engine.view().await.tiles[0][1].revealed);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_tile_changes_nothing() {
        let fx = started().await;
        win_word(&fx, LotteryOption::SelfOut, Team::Blue).await;
        fx.scores.set_latency(Duration::ZERO, Duration::from_secs(8));

        let pos = TilePos::new(0, 0);
        let err = fx.engine.select_board_tile(pos).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout));
        assert_eq!(
            fx.engine.phase().await,
            BoardPhase::BoardPhase(TileStatus::Choosing)
        );
        assert!(!fx.engine.view().await.tiles[0][0].revealed);
        assert_eq!(fx.scores.points(Team::Blue).await, 20);

        fx.scores.set_latency(Duration::ZERO, Duration::ZERO);
        fx.engine.select_board_tile(pos).await.unwrap();
        assert_eq!(fx.scores.points(Team::Blue).await, 30);
    }

    #[tokio::test]
    async fn every_round_draws_a_fresh_word() {
        let fx = started().await;
        let mut words = vec![fx.engine.view().await.word_id];

        // Nobody finds the word.
        fx.engine
            .select_lottery_option(LotteryOption::SelfOut)
            .await
            .unwrap();
        for team in [Team::Blue, Team::Green, Team::Yellow] {
            fx.engine.team_buzzes(team).await.unwrap();
            fx.engine.operator_verdict(false).await.unwrap();
        }
        fx.engine.view_scoreboard().await.unwrap();
        fx.engine.start_new_round().await.unwrap();
        words.push(fx.engine.view().await.word_id);

        // The word is never shown.
        fx.engine
            .select_lottery_option(LotteryOption::Gain)
            .await
            .unwrap();
        fx.engine.start_new_round().await.unwrap();
        words.push(fx.engine.view().await.word_id);

        assert_eq!(words, vec![Some(21), Some(22), Some(21)]);
        assert_eq!(fx.engine.played().await, vec![21]);
    }

    #[tokio::test]
    async fn revealed_tiles_and_rotation_survive_a_restart() {
        let kv = MemoryKvStore::new();
        let scores = InMemoryScoreService::new();
        {
            let fx = engine_over(kv.clone(), scores.clone());
            fx.engine.initialize().await.unwrap();
            fx.engine
                .select_lottery_option(LotteryOption::Gain)
                .await
                .unwrap();
            fx.engine.start_new_round().await.unwrap();
            win_word(&fx, LotteryOption::SelfOut, Team::Yellow).await;
            fx.engine
                .select_board_tile(TilePos::new(1, 0))
                .await
                .unwrap();
            fx.engine.confirm_tile_action().await.unwrap();
        }

        let fx = engine_over(kv, scores);
        fx.engine.initialize().await.unwrap();
        let view = fx.engine.view().await;
        assert_eq!(view.phase, BoardPhase::DrawPhase(DrawStatus::Choosing));
        assert_eq!(view.drawing_team, Some(Team::Green));
        assert!(view.tiles[1][0].revealed);
        assert_eq!(view.tiles[1][0].cell, Some(BoardCell::Jackpot));
        assert!(!view.tiles[0][0].revealed);
        assert_eq!(fx.scores.points(Team::Yellow).await, 120);
    }

    #[tokio::test]
    async fn live_round_is_resumed() {
        let kv = MemoryKvStore::new();
        let scores = InMemoryScoreService::new();
        {
            let fx = engine_over(kv.clone(), scores.clone());
            fx.engine.initialize().await.unwrap();
            fx.engine
                .select_lottery_option(LotteryOption::RemoveOne)
                .await
                .unwrap();
        }

        let fx = engine_over(kv, scores);
        fx.engine.initialize().await.unwrap();
        let view = fx.engine.view().await;
        assert_eq!(
            view.phase,
            BoardPhase::DrawPhase(DrawStatus::Removing { remaining: 1 })
        );
        assert_eq!(view.drawing_team, Some(Team::Red));
        assert_eq!(view.word_id, Some(21));
        fx.engine.remove_team(Team::Yellow).await.unwrap();
        assert_eq!(fx.engine.phase().await, BoardPhase::WordPhase);
    }

    #[tokio::test]
    async fn reset_restarts_rotation() {
        let fx = started().await;
        fx.engine.view_scoreboard().await.unwrap();
        fx.engine.start_new_round().await.unwrap();
        assert_eq!(fx.engine.view().await.drawing_team, Some(Team::Blue));

        fx.engine.reset_game().await.unwrap();
        assert_eq!(fx.engine.phase().await, BoardPhase::Idle);
        fx.engine.start_new_round().await.unwrap();
        assert_eq!(fx.engine.view().await.drawing_team, Some(Team::Red));
    }
}
