use std::sync::Arc;

use tokio::time::Instant;
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
    dao::snapshot::{ImageRoundSnapshot, SnapshotEnvelope},
    dto::view::ImageRoundView,
    error::ServiceError,
    state::{
        RoundSession,
        content::{CategoryFilter, GameMode, ImageItem, ItemId},
        image::{ImageEvent, ImagePhase, ImageRound},
        reveal::{LinearReveal, RevealSchedule, TickFlow},
        team::Team,
    },
};

const MODE: GameMode = GameMode::ImageReveal;
/// Progress between two snapshot writes while the picture is uncovered.
const PERSIST_EVERY: f64 = 0.05;

/// Image reveal mode: hint, continuous reveal, single buzz, operator verdict.
///
/// Cheap to clone; clones drive the same round.
#[derive(Clone)]
pub struct ImageRevealEngine {
    inner: Arc<Inner>,
}

struct Inner {
    session: RoundSession<ImagePhase, ImageRound>,
    pool: SessionPool<ImageItem>,
    resume: ResumeStore,
    ledger: Arc<ScoreLedger>,
    notifier: Arc<Notifier>,
    timings: RevealTimings,
}

impl ImageRevealEngine {
    /// Idle engine over `collaborators`; call [`ImageRevealEngine::initialize`] next.
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
                session: RoundSession::new(ImageRound::default()),
                pool,
                resume,
                ledger: collaborators.ledger,
                notifier: collaborators.notifier,
                timings: config.timings,
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

    /// Draw the next picture and show its hint.
    pub async fn start_round(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.start_round().await;
        settle(MODE, "start_round", &self.inner.notifier, result)
    }

    /// Leave the hint and start uncovering the picture.
    pub async fn proceed_to_reveal(&self) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.proceed_to_reveal().await;
        settle(MODE, "proceed_to_reveal", &self.inner.notifier, result)
    }

    /// Freeze the reveal and give `team` the floor.
    pub async fn team_buzzes(&self, team: Team) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.team_buzzes(team).await;
        settle(MODE, "team_buzzes", &self.inner.notifier, result)
    }

    /// Judge the answer; `points` go to the answering team when correct.
    pub async fn operator_verdict(
        &self,
        correct: bool,
        points: i32,
    ) -> Result<ActionOutcome, ServiceError> {
        let result = self.inner.operator_verdict(correct, points).await;
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
    pub async fn phase(&self) -> ImagePhase {
        self.inner.session.phase().await
    }

    /// Operator view, answer included.
    pub async fn view(&self) -> ImageRoundView {
        let filter = self.inner.pool.filter().await;
        let scores = self.inner.ledger.scores().await;
        self.inner
            .session
            .read(|machine, round| ImageRoundView::build(machine.snapshot(), round, filter, scores))
            .await
    }

    /// Pictures consumed this session.
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

        if let Some(envelope) = self.resume.load_round::<ImageRoundSnapshot>().await {
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
        envelope: SnapshotEnvelope<ImageRoundSnapshot>,
        filter: &CategoryFilter,
    ) -> Result<ImagePhase, StaleSnapshot> {
        let saved = &envelope.round;
        check_resume(&envelope, filter, saved.phase.is_resumable())?;
        if saved.phase == ImagePhase::Guessing && saved.active_team.is_none() {
            return Err(StaleSnapshot::Inconsistent("guessing without an answering team"));
        }
        let item = self
            .pool
            .get(saved.item_id)
            .await
            .ok_or(StaleSnapshot::MissingItem(saved.item_id))?;

        let mut round = ImageRound::new(item);
        round.record_progress(saved.progress);
        round.active_team = saved.active_team;
        self.session.restore(saved.phase, round).await;

        if saved.phase == ImagePhase::Revealing {
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

    async fn start_round(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.start_round_locked().await
    }

    /// Start a round; the caller holds the action gate.
    async fn start_round_locked(&self) -> Result<(), ServiceError> {
        let result = self
            .session
            .run_transition(
                ImageEvent::StartRound,
                || async {
                    self.session.stop_timer().await;
                    self.pool.reload().await?;
                    self.pool.pick().await
                },
                |round, drawn| {
                    let item_id = drawn.item.id;
                    *round = ImageRound::new(drawn.item);
                    (item_id, drawn.pick)
                },
            )
            .await;

        match result {
            Ok(((item_id, pick), _)) => {
                self.pool.accept(pick).await;
                info!(mode = %MODE, item_id, "round started");
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

    async fn proceed_to_reveal(self: &Arc<Self>) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let has_item = self.session.read(|_, round| round.item.is_some()).await;
        if !has_item {
            return Err(ServiceError::InvalidTransition(
                "no current picture to reveal".into(),
            ));
        }
        self.session
            .advance(ImageEvent::ProceedToReveal, |_| ())
            .await?;
        self.start_reveal().await;
        self.persist().await;
        Ok(())
    }

    /// Anchor the reveal clock at the current progress and start ticking.
    async fn start_reveal(self: &Arc<Self>) {
        let duration = self.timings.image_duration;
        let now = Instant::now();
        let has_item = self
            .session
            .update(|_, round| {
                let has_item = round.item.is_some();
                if has_item {
                    round.clock = Some(LinearReveal::resume(duration, round.progress, now));
                }
                has_item
            })
            .await;
        if !has_item {
            warn!(mode = %MODE, "reveal not started: no current picture");
            return;
        }

        let weak = Arc::downgrade(self);
        self.session
            .start_timer(
                RevealSchedule::every(self.timings.image_step),
                move |epoch, _tick| {
                    let weak = weak.clone();
                    async move {
                        match weak.upgrade() {
                            Some(inner) => inner.on_reveal_tick(epoch).await,
                            None => TickFlow::Stop,
                        }
                    }
                },
            )
            .await;
    }

    async fn on_reveal_tick(&self, epoch: u64) -> TickFlow {
        if self.session.timer_epoch().await != epoch {
            return TickFlow::Stop;
        }

        let now = Instant::now();
        let sample = self
            .session
            .update(|machine, round| {
                if machine.phase() != ImagePhase::Revealing {
                    return None;
                }
                let clock = round.clock?;
                let before = round.progress;
                Some((before, round.record_progress(clock.progress_at(now))))
            })
            .await;

        let Some((before, after)) = sample else {
            self.session.release_timer(epoch).await;
            return TickFlow::Stop;
        };

        if after >= 1.0 {
            return self.finish_time_up(epoch).await;
        }
        if (after / PERSIST_EVERY).floor() > (before / PERSIST_EVERY).floor() {
            self.persist().await;
        }
        TickFlow::Continue
    }

    async fn finish_time_up(&self, epoch: u64) -> TickFlow {
        let finished = self
            .session
            .advance(ImageEvent::TimeUp, |round| {
                round.finish();
                round.item_id()
            })
            .await;

        match finished {
            Ok((_, item_id)) => {
                self.session.release_timer(epoch).await;
                if let Some(item_id) = item_id {
                    self.pool.mark_played(item_id).await;
                }
                self.persist().await;
                info!(mode = %MODE, item_id = ?item_id, "picture fully revealed without a buzz");
                self.notifier
                    .info(Some(MODE), "Tempo esgotado! Ninguém acertou.");
                TickFlow::Stop
            }
            Err(ServiceError::Busy) => TickFlow::Continue,
            Err(err) => {
                debug!(mode = %MODE, error = %err, "time-up tick ignored");
                self.session.release_timer(epoch).await;
                TickFlow::Stop
            }
        }
    }

    async fn team_buzzes(&self, team: Team) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        let now = Instant::now();
        let (_, progress) = self
            .session
            .advance(ImageEvent::Buzz(team), |round| {
                round.active_team = Some(team);
                round.pause(now)
            })
            .await?;
        self.session.stop_timer().await;
        self.persist().await;
        info!(mode = %MODE, team = %team, progress, "team buzzed");
        Ok(())
    }

    async fn operator_verdict(&self, correct: bool, points: i32) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        if points < 0 {
            return Err(ServiceError::InvalidInput(format!(
                "points must not be negative (got {points})"
            )));
        }
        let team = self
            .session
            .read(|machine, round| {
                round
                    .active_team
                    .filter(|_| machine.phase() == ImagePhase::Guessing)
            })
            .await
            .ok_or_else(|| {
                ServiceError::InvalidTransition("verdict without an answering team".into())
            })?;

        let ledger = self.ledger.clone();
        let (item_id, _) = self
            .session
            .run_transition(
                ImageEvent::Verdict { correct },
                || async move {
                    if correct {
                        ledger.apply_delta(team, points).await?;
                    }
                    Ok(())
                },
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
        if correct {
            self.ledger.reconcile().await;
        }

        info!(mode = %MODE, team = %team, correct, points, "verdict applied");
        if correct {
            self.notifier.success(
                Some(MODE),
                format!(
                    "Equipe {} acertou! Ganhou {points} pontos!",
                    team.display_name()
                ),
            );
        } else {
            self.notifier.warning(
                Some(MODE),
                format!("Equipe {} errou.", team.display_name()),
            );
        }
        Ok(())
    }

    async fn view_scoreboard(&self) -> Result<(), ServiceError> {
        let _action = self.session.begin_action()?;
        self.session.stop_timer().await;
        self.session
            .advance(ImageEvent::ViewScoreboard, |_| ())
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

    /// Cancel the reveal and drop the round.
    async fn go_idle(&self) {
        self.session.stop_timer().await;
        self.session
            .reset(|round| *round = ImageRound::default())
            .await;
        self.resume.clear_round().await;
    }

    /// Save the live round, or delete the snapshot once it is over.
    async fn persist(&self) {
        let snapshot = self
            .session
            .read(|machine, round| {
                let phase = machine.phase();
                if !phase.is_resumable() {
                    return None;
                }
                Some(ImageRoundSnapshot {
                    item_id: round.item_id()?,
                    phase,
                    progress: round.progress,
                    active_team: round.active_team,
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
    use crate::{
        dao::{catalog::InMemoryCatalog, kv::MemoryKvStore, scores::InMemoryScoreService},
        services::notifier::NoticeLevel,
    };

    fn image(id: ItemId, order_index: Option<i64>) -> ImageItem {
        ImageItem {
            id,
            answer: format!("answer {id}"),
            image_url: format!("/characters/{id}.png"),
            hint: format!("hint {id}"),
            order_index,
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::builder()
            .image(image(1, Some(1)), [1])
            .image(image(2, None), [1])
            .image(image(3, None), [2])
            .build()
    }

    struct Fixture {
        engine: ImageRevealEngine,
        scores: InMemoryScoreService,
        kv: MemoryKvStore,
        notifier: Arc<Notifier>,
    }

    fn engine_over(
        catalog: InMemoryCatalog,
        kv: MemoryKvStore,
        scores: InMemoryScoreService,
    ) -> Fixture {
        let notifier = Arc::new(Notifier::default());
        let collaborators = Collaborators {
            catalog: Arc::new(catalog),
            ledger: Arc::new(ScoreLedger::new(Arc::new(scores.clone()))),
            kv: Arc::new(kv.clone()),
            notifier: notifier.clone(),
        };
        Fixture {
            engine: ImageRevealEngine::new(collaborators, &AppConfig::default()),
            scores,
            kv,
            notifier,
        }
    }

    fn fixture() -> Fixture {
        engine_over(catalog(), MemoryKvStore::new(), InMemoryScoreService::new())
    }

    #[tokio::test(start_paused = true)]
    async fn buzz_then_correct_verdict_scores_and_consumes_item() {
        let fx = fixture();
        assert!(fx.engine.initialize().await.unwrap().is_applied());
        assert_eq!(fx.engine.phase().await, ImagePhase::Hint);
        assert_eq!(fx.engine.view().await.item_id, Some(1));

        fx.engine.proceed_to_reveal().await.unwrap();
        sleep(Duration::from_secs(3)).await;
        fx.engine.team_buzzes(Team::Red).await.unwrap();

        let frozen = fx.engine.view().await.progress;
        assert!(frozen > 0.05 && frozen < 0.2, "progress {frozen}");
        assert!(!fx.engine.timer_running().await);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(fx.engine.view().await.progress, frozen);

        fx.engine.operator_verdict(true, 10).await.unwrap();
        assert_eq!(fx.engine.phase().await, ImagePhase::Finished);
        assert_eq!(fx.scores.points(Team::Red).await, 10);
        assert_eq!(fx.engine.played().await, vec![1]);
        assert_eq!(fx.engine.view().await.progress, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_finishes_on_its_own_without_buzz() {
        let fx = fixture();
        let mut notices = fx.notifier.subscribe();
        fx.engine.initialize().await.unwrap();
        fx.engine.proceed_to_reveal().await.unwrap();

        sleep(Duration::from_secs(31)).await;
        assert_eq!(fx.engine.phase().await, ImagePhase::Finished);
        assert_eq!(fx.engine.view().await.progress, 1.0);
        assert_eq!(fx.engine.played().await, vec![1]);
        assert!(!fx.engine.timer_running().await);
        assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_phase_actions_are_ignored() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();

        let buzz = fx.engine.team_buzzes(Team::Blue).await.unwrap();
        assert!(matches!(buzz, ActionOutcome::Ignored(_)));
        let verdict = fx.engine.operator_verdict(true, 10).await.unwrap();
        assert!(matches!(verdict, ActionOutcome::Ignored(_)));
        assert_eq!(fx.engine.phase().await, ImagePhase::Hint);
        assert_eq!(fx.scores.mutation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_score_call_leaves_round_guessing() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        fx.engine.proceed_to_reveal().await.unwrap();
        fx.engine.team_buzzes(Team::Green).await.unwrap();

        fx.scores.set_offline(true);
        let err = fx.engine.operator_verdict(true, 10).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(fx.engine.phase().await, ImagePhase::Guessing);
        assert!(fx.engine.played().await.is_empty());

        fx.scores.set_offline(false);
        fx.engine.operator_verdict(true, 10).await.unwrap();
        assert_eq!(fx.scores.points(Team::Green).await, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_verdict_still_consumes_item() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        fx.engine.proceed_to_reveal().await.unwrap();
        fx.engine.team_buzzes(Team::Yellow).await.unwrap();
        fx.engine.operator_verdict(false, 10).await.unwrap();

        assert_eq!(fx.engine.played().await, vec![1]);
        assert_eq!(fx.scores.mutation_count(), 0);
        fx.engine.view_scoreboard().await.unwrap();
        fx.engine.start_round().await.unwrap();
        assert_ne!(fx.engine.view().await.item_id, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_mid_reveal_restores_item_and_progress() {
        let kv = MemoryKvStore::new();
        let scores = InMemoryScoreService::new();
        {
            let fx = engine_over(catalog(), kv.clone(), scores.clone());
            fx.engine.initialize().await.unwrap();
            fx.engine.proceed_to_reveal().await.unwrap();
            sleep(Duration::from_secs(6)).await;
        }

        let fx = engine_over(catalog(), kv, scores);
        fx.engine.initialize().await.unwrap();
        let view = fx.engine.view().await;
        assert_eq!(view.phase, ImagePhase::Revealing);
        assert_eq!(view.item_id, Some(1));
        assert!(view.progress >= 0.15 && view.progress <= 0.25, "progress {}", view.progress);
        assert!(fx.engine.timer_running().await);

        sleep(Duration::from_secs(3)).await;
        assert!(fx.engine.view().await.progress > view.progress);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_filter_starts_clean_round() {
        let kv = MemoryKvStore::new();
        let scores = InMemoryScoreService::new();
        {
            let fx = engine_over(catalog(), kv.clone(), scores.clone());
            fx.engine.initialize().await.unwrap();
            fx.engine.proceed_to_reveal().await.unwrap();
            sleep(Duration::from_secs(2)).await;
        }
        ResumeStore::new(Arc::new(kv.clone()), MODE)
            .save_filter(&CategoryFilter::new([2]))
            .await;

        let fx = engine_over(catalog(), kv, scores);
        fx.engine.initialize().await.unwrap();
        let view = fx.engine.view().await;
        assert_eq!(view.phase, ImagePhase::Hint);
        assert_eq!(view.item_id, Some(3));
        assert_eq!(view.progress, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_catalog_returns_to_idle() {
        let fx = engine_over(
            InMemoryCatalog::builder().build(),
            MemoryKvStore::new(),
            InMemoryScoreService::new(),
        );
        let mut notices = fx.notifier.subscribe();
        let err = fx.engine.initialize().await.unwrap_err();
        assert!(matches!(err, ServiceError::PoolExhausted));
        assert_eq!(fx.engine.phase().await, ImagePhase::Idle);
        assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_round_leaves_no_snapshot() {
        let fx = fixture();
        fx.engine.initialize().await.unwrap();
        fx.engine.proceed_to_reveal().await.unwrap();
        fx.engine.team_buzzes(Team::Red).await.unwrap();
        fx.engine.operator_verdict(false, 0).await.unwrap();

        let store = ResumeStore::new(Arc::new(fx.kv.clone()), MODE);
        assert!(store.load_round::<ImageRoundSnapshot>().await.is_none());
    }
}
