use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    ActionOutcome, Collaborators,
    notifier::Notifier,
    resume::{ResumeStore, StaleSnapshot, check_resume},
    score_ledger::ScoreLedger,
    session_pool::SessionPool,
    settle,
};
use crate::{
    config::{AppConfig, RevealTimings},
    dao::snapshot::{SnapshotEnvelope, WordRoundSnapshot},
    dto::view::WordRoundView,
    error::ServiceError,
    state::{
        RoundSession,
        content::{CategoryFilter, GameMode, ItemId, WordItem},
        reveal::{LetterStep, RevealSchedule, RevealTick, TickFlow},
        team::Team,
        word::{WordEvent, WordPhase, WordRound, WordRules},
    },
};

const MODE: GameMode = GameMode::WordReveal;

/// Word reveal mode: letters appear one at a time until a team finds the word.
///
/// A wrong answer locks the team out and the reveal goes on; when every
/// team is locked out the lockouts are lifted.
#[derive(Clone)]
pub struct WordRevealEngine {
    inner: Arc<Inner>,
}

struct Inner {
    session: RoundSession<WordPhase, WordRound>,
    pool: SessionPool<WordItem>,
    resume: ResumeStore,
    ledger: Arc<ScoreLedger>,
    notifier: Arc<Notifier>,
    timings: RevealTimings,
    rules: WordRules,
}

impl WordRevealEngine {
    /// Idle engine over `collaborators`; call [`WordRevealEngine::initialize`] next.
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
                session: RoundSession::new(WordRound::default()),
                pool,
                resume,
                ledger: collaborators.ledger,
                notifier: collaborators.notifier,
                timings: config.timings,
                rules: config.word,
            }),
        }
    }

    /// Resume the saved round when it is still valid, otherwise start a new one.
    pub async fn initialize(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.initialize().await;
        settle(MODE, "initialize", &self.inner.notifier, result)
    }

    /// Switch categories. The live round is dropped and the played set cleared.
    pub async fn set_category_filter(
        &self,
        filter: CategoryFilter,
    ) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.set_category_filter(filter).await;
        settle(MODE, "set_category_filter", &self.inner.notifier, result)
    }

    /// Draw the next word and start uncovering its letters.
    pub async fn start_round(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.start_round().await;
        settle(MODE, "start_round", &self.inner.notifier, result)
    }

    /// Let `team` answer; locked-out teams and buzzes outside the reveal are ignored.
    pub async fn team_buzzes(&self, team: Team) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.team_buzzes(team).await;
        settle(MODE, "team_buzzes", &self.inner.notifier, result)
    }

    /// Judge the answer. A correct one scores the letters still hidden.
    pub async fn operator_verdict(&self, correct: bool) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.operator_verdict(correct).await;
        settle(MODE, "operator_verdict", &self.inner.notifier, result)
    }

    /// Leave the finished round for the scoreboard.
    pub async fn view_scoreboard(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.view_scoreboard().await;
        settle(MODE, "view_scoreboard", &self.inner.notifier, result)
    }

    /// Back to idle with an empty played set.
    pub async fn reset_game(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.reset_game().await;
        settle(MODE, "reset_game", &self.inner.notifier, result)
    }

    /// Current phase.
    pub async fn phase(&self) -> WordPhase {
        self.inner.session.phase().await
    }

    /// Operator view, full word included.
    pub async fn view(&self) -> WordRoundView {
        let filter = self.inner.pool.filter().await;
        let scores = self.inner.ledger.scores().await;
        let rules = self.inner.rules;
        self.inner
            .session
            .read(|machine, round| {
                WordRoundView::build(machine.snapshot(), round, rules, filter, scores)
            })
            .await
    }

    /// Words consumed this session.
    pub async fn played(&self) -> Vec<ItemId> {
        self.inner.pool.played().await
    }

    /// Whether the reveal timer is ticking.
    pub async fn timer_running(&self) -> bool {
        self.inner.session.timer_running().await
    }
}

impl Inner {
    async fn initialize(self: &Arc<Self>) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let filter = self.pool.initialize().await;
        if let Err(err) = self.ledger.refresh().await {
            warn!(mode = %MODE, error = %err, "failed to fetch scores");
        }
        self.pool.reload().await?;

        if let Some(envelope) = self.resume.load_round::<WordRoundSnapshot>().await {
            match self.restore(envelope, &filter).await {
                Ok(phase) => {
                    info!(mode = %MODE, phase = ?phase, "resumed saved round");
                    return Ok(());
                }
                Err(reason) => {
                    info!(mode = %MODE, reason = %reason, "discarding saved round");
                    self.resume.clear_round().await;
                }
            }
        }

        self.start_round_locked().await
    }

    async fn restore(
        self: &Arc<Self>,
        envelope: SnapshotEnvelope<WordRoundSnapshot>,
        filter: &CategoryFilter,
    ) -> Result<WordPhase, StaleSnapshot> {
        let saved = &envelope.round;
        check_resume(&envelope, filter, saved.phase.is_resumable())?;
        if saved.phase == WordPhase::Guessing && saved.active_team.is_none() {
            return Err(StaleSnapshot::Inconsistent("guessing without an answering team"));
        }
        let item = self
            .pool
            .get(saved.item_id)
            .await
            .ok_or(StaleSnapshot::MissingItem(saved.item_id))?;

        let positions = item.letter_positions();
        if saved.revealed.iter().any(|index| !positions.contains(index)) {
            return Err(StaleSnapshot::Inconsistent("revealed position outside the word"));
        }

        let mut round = WordRound::new(item);
        round.revealed.extend(saved.revealed.iter().copied());
        round.active_team = saved.active_team;
        round.locked_out = saved.locked_out.clone();
        self.session.restore(saved.phase, round).await;

        if saved.phase == WordPhase::Revealing {
            self.start_reveal().await;
        }
        Ok(saved.phase)
    }

    async fn set_category_filter(&self, filter: CategoryFilter) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.pool.set_filter(filter).await;
        self.go_idle().await;
        Ok(())
    }

    async fn start_round(self: &Arc<Self>) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.start_round_locked().await
    }

    /// Start a round; the caller holds the action gate.
    async fn start_round_locked(self: &Arc<Self>) -> Result<(), ServiceError> {
        let result = self
            .session
            .run_transition(
                WordEvent::StartRound,
                || async {
                    self.session.stop_timer().await;
                    self.pool.reload().await?;
                    self.pool.pick().await
                },
                |round, drawn| {
                    let item_id = drawn.item.id;
                    *round = WordRound::new(drawn.item);
                    (item_id, drawn.pick)
                },
            )
            .await;

        match result {
            Ok(((item_id, pick), _)) => {
                self.pool.accept(pick).await;
                info!(mode = %MODE, item_id, "round started");
                self.start_reveal().await;
                self.persist().await;
                Ok(())
            }
            Err(ServiceError::PoolExhausted) => {
                self.go_idle().await;
                Err(ServiceError::PoolExhausted)
            }
            Err(err) => Err(err),
        }
    }

    /// (Re)start the stepped reveal with a fresh bounding timeout. No letter
    /// is uncovered before the first step.
    async fn start_reveal(self: &Arc<Self>) {
        if self.session.read(|_, round| round.item.is_none()).await {
            warn!(mode = %MODE, "reveal not started: no current word");
            return;
        }
        let schedule = RevealSchedule::every(self.timings.word_step)
            .with_deadline(self.timings.word_deadline)
            .step_immediately(false);
        let weak = Arc::downgrade(self);
        self.session
            .start_timer(schedule, move |epoch, tick| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => inner.on_reveal_tick(epoch, tick).await,
                        None => TickFlow::Stop,
                    }
                }
            })
            .await;
    }

    async fn on_reveal_tick(&self, epoch: u64, tick: RevealTick) -> TickFlow {
        if self.session.timer_epoch().await != epoch {
            return TickFlow::Stop;
        }
        if tick == RevealTick::Deadline {
            return self.finish_reveal(epoch, "deadline").await;
        }

        let step = self
            .session
            .advance(WordEvent::LetterRevealed, |round| {
                round.reveal_next(&mut rand::rng())
            })
            .await;

        match step {
            Ok((_, LetterStep::Revealed { index, complete: false })) => {
                debug!(mode = %MODE, index, "letter revealed");
                self.persist().await;
                TickFlow::Continue
            }
            Ok((_, LetterStep::Revealed { complete: true, .. } | LetterStep::Exhausted)) => {
                self.finish_reveal(epoch, "all letters revealed").await
            }
            Err(ServiceError::Busy) => TickFlow::Continue,
            Err(err) => {
                debug!(mode = %MODE, error = %err, "reveal tick ignored");
                self.session.release_timer(epoch).await;
                TickFlow::Stop
            }
        }
    }

    /// End the round without a winner.
    async fn finish_reveal(&self, epoch: u64, cause: &'static str) -> TickFlow {
        let finished = self
            .session
            .advance(WordEvent::RevealEnded, |round| {
                round.finish();
                round
                    .item
                    .as_ref()
                    .map(|item| (item.id, item.word.clone()))
            })
            .await;
        self.session.release_timer(epoch).await;

        match finished {
            Ok((_, Some((item_id, word)))) => {
                self.pool.mark_played(item_id).await;
                self.persist().await;
                info!(mode = %MODE, item_id, cause, "reveal ended without a winner");
                self.notifier.info(
                    Some(MODE),
                    format!("Tempo esgotado! Resposta: {word}"),
                );
            }
            Ok((_, None)) => self.persist().await,
            Err(err) => debug!(mode = %MODE, error = %err, cause, "reveal end ignored"),
        }
        TickFlow::Stop
    }

    async fn team_buzzes(&self, team: Team) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let (phase, allowed) = self
            .session
            .read(|machine, round| (machine.phase(), round.can_buzz(team)))
            .await;
        if phase == WordPhase::Revealing && !allowed {
            return Err(ServiceError::InvalidInput(format!(
                "team {team} is locked out this round"
            )));
        }

        self.session
            .advance(WordEvent::Buzz(team), |round| round.active_team = Some(team))
            .await?;
        self.session.stop_timer().await;
        self.persist().await;
        info!(mode = %MODE, team = %team, "team buzzed");
        self.notifier.info(
            Some(MODE),
            format!("Equipe {} irá palpitar!", team.display_name()),
        );
        Ok(())
    }

    async fn operator_verdict(self: &Arc<Self>, correct: bool) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let rules = self.rules;
        let (team, score) = self
            .session
            .read(|machine, round| {
                round
                    .active_team
                    .filter(|_| machine.phase() == WordPhase::Guessing)
                    .map(|team| (team, round.current_score(rules)))
            })
            .await
            .ok_or_else(|| {
                ServiceError::InvalidTransition("verdict without an answering team".into())
            })?;

        if correct {
            self.accept_answer(team, score).await
        } else {
            self.reject_answer().await
        }
    }

    async fn accept_answer(&self, team: Team, score: i32) -> Result<(), ServiceError> {
        let ledger = self.ledger.clone();
        let (item_id, _) = self
            .session
            .run_transition(
                WordEvent::CorrectGuess,
                || async move { ledger.apply_delta(team, score).await },
                |round, ()| {
                    round.finish();
                    round.item_id()
                },
            )
            .await?;

        if let Some(item_id) = item_id {
            self.pool.mark_played(item_id).await;
        }
        self.persist().await;
        self.ledger.reconcile().await;
        info!(mode = %MODE, team = %team, score, "word found");
        self.notifier.success(
            Some(MODE),
            format!(
                "Equipe {} acertou! Ganhou {score} pontos!",
                team.display_name()
            ),
        );
        Ok(())
    }

    async fn reject_answer(self: &Arc<Self>) -> Result<(), ServiceError> {
        let (_, wrong) = self
            .session
            .advance(WordEvent::WrongGuess, |round| round.register_wrong_answer())
            .await?;
        self.start_reveal().await;
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

    async fn view_scoreboard(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.session.stop_timer().await;
        self.session
            .advance(WordEvent::ViewScoreboard, |_| ())
            .await?;
        self.persist().await;
        if let Err(err) = self.ledger.refresh().await {
            warn!(mode = %MODE, error = %err, "failed to refresh scores");
        }
        Ok(())
    }

    async fn reset_game(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.go_idle().await;
        self.pool.clear_played().await;
        info!(mode = %MODE, "game reset");
        self.notifier.info(Some(MODE), "Jogo reiniciado");
        Ok(())
    }

    async fn go_idle(&self) {
        self.session.stop_timer().await;
        self.session
            .reset(|round| *round = WordRound::default())
            .await;
        self.resume.clear_round().await;
    }

    async fn persist(&self) {
        let snapshot = self
            .session
            .read(|machine, round| {
                let phase = machine.phase();
                if !phase.is_resumable() {
                    return None;
                }
                Some(WordRoundSnapshot {
                    item_id: round.item_id()?,
                    phase,
                    revealed: round.revealed.iter().copied().collect(),
                    active_team: round.active_team,
                    locked_out: round.locked_out.clone(),
                })
            })
            .await;
        let filter = self.pool.filter().await;
        self.resume
            .save_round(snapshot.map(|round| SnapshotEnvelope::now(filter, round)))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::dao::{catalog::InMemoryCatalog, kv::MemoryKvStore, scores::InMemoryScoreService};

    fn word(id: ItemId, text: &str, order_index: Option<i64>) -> WordItem {
        WordItem {
            id,
            word: text.into(),
            image_url: format!("/conexao_images/{id}.png"),
            order_index,
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::builder()
            .word(word(11, "GIRASSOL", Some(1)), [1])
            .word(word(12, "BOM DIA", None), [1])
            .build()
    }

    struct Fixture {
        engine: WordRevealEngine,
        scores: InMemoryScoreService,
    }

    fn engine_over(kv: MemoryKvStore, scores: InMemoryScoreService) -> Fixture {
        engine_with(&AppConfig::default(), kv, scores)
    }

    fn engine_with(
        config: &AppConfig,
        kv: MemoryKvStore,
        scores: InMemoryScoreService,
    ) -> Fixture {
        let collaborators = Collaborators {
            catalog: Arc::new(catalog()),
            ledger: Arc::new(ScoreLedger::new(Arc::new(scores.clone()))),
            kv: Arc::new(kv),
            notifier: Arc::new(Notifier::default()),
        };
        Fixture {
            engine: WordRevealEngine::new(collaborators, config),
            scores,
        }
    }

    fn fixture() -> Fixture {
        engine_over(MemoryKvStore::new(), InMemoryScoreService::new())
    }

    /// Let `steps` letter intervals elapse, landing between two ticks.
    async fn wait_steps(steps: u32) {
        sleep(Duration::from_secs(6) * steps + Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_reveals_nothing_until_first_step() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        let view = fx.engine.view().await;
        assert_eq!(view.phase, WordPhase::Revealing);
        assert_eq!(view.item_id, Some(11));
        assert!(view.revealed.is_empty());

        wait_steps(3).await;
        assert_eq!(fx.engine.view().await.revealed.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn correct_answer_scores_hidden_letters() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        wait_steps(3).await;

        fx.engine.team_buzzes(Team::Blue).await.unwrap();
        wait_steps(2).await;
        assert_eq!(fx.engine.view().await.revealed.len(), 3);

        fx.engine.operator_verdict(true).await.unwrap();
        assert_eq!(fx.engine.phase().await, WordPhase::Finished);
        assert_eq!(fx.scores.points(Team::Blue).await, 50);
        assert_eq!(fx.engine.played().await, vec![11]);
    }

    #[tokio::test(start_paused = true)]
    async fn revealed_count_never_decreases() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        let mut last = 0;
        for _ in 0..8 {
            sleep(Duration::from_secs(3)).await;
            let now = fx.engine.view().await.revealed.len();
            assert!(now >= last);
            last = now;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_answer_locks_team_and_resumes_reveal() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        wait_steps(1).await;
        fx.engine.team_buzzes(Team::Red).await.unwrap();
        fx.engine.operator_verdict(false).await.unwrap();

        let view = fx.engine.view().await;
        assert_eq!(view.phase, WordPhase::Revealing);
        assert_eq!(view.locked_out, vec![Team::Red]);
        assert!(fx.engine.timer_running().await);

        let again = fx.engine.team_buzzes(Team::Red).await.unwrap();
        assert!(matches!(again, ActionOutcome::Ignored(_)));
        wait_steps(1).await;
        assert_eq!(fx.engine.view().await.revealed.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn everyone_wrong_lifts_lockouts() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        for team in Team::ALL {
            fx.engine.team_buzzes(team).await.unwrap();
            fx.engine.operator_verdict(false).await.unwrap();
        }
        let view = fx.engine.view().await;
        assert_eq!(view.phase, WordPhase::Revealing);
        assert!(view.locked_out.is_empty());
        assert!(fx.engine.team_buzzes(Team::Red).await.unwrap().is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn full_reveal_finishes_round() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        wait_steps(8).await;
        let view = fx.engine.view().await;
        assert_eq!(view.phase, WordPhase::Finished);
        assert_eq!(view.masked, "GIRASSOL");
        assert_eq!(fx.engine.played().await, vec![11]);
        assert!(!fx.engine.timer_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_finishes_round() {
        let mut config = AppConfig::default();
        config.timings.word_deadline = Duration::from_secs(15);
        let fx = engine_with(&config, MemoryKvStore::new(), InMemoryScoreService::new());
        fx.engine.initialize().await.unwrap();

        wait_steps(2).await;
        assert_eq!(fx.engine.view().await.revealed.len(), 2);
        sleep(Duration::from_secs(3)).await;

        let view = fx.engine.view().await;
        assert_eq!(view.phase, WordPhase::Finished);
        assert_eq!(view.masked, "GIRASSOL");
        assert_eq!(fx.engine.played().await, vec![11]);
        assert_eq!(fx.scores.mutation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_restores_revealed_letters() {
        let kv = MemoryKvStore::new();
        let scores = InMemoryScoreService::new();
        let revealed = {
            let fx = engine_over(kv.clone(), scores.clone());
            fx.engine.initialize().await.unwrap();
            wait_steps(3).await;
            fx.engine.team_buzzes(Team::Yellow).await.unwrap();
            fx.engine.view().await.revealed
        };

        let fx = engine_over(kv, scores);
        fx.engine.initialize().await.unwrap();
        let view = fx.engine.view().await;
        assert_eq!(view.phase, WordPhase::Guessing);
        assert_eq!(view.item_id, Some(11));
        assert_eq!(view.revealed, revealed);
        assert_eq!(view.active_team, Some(Team::Yellow));
        assert!(!fx.engine.timer_running().await);
    }
}
