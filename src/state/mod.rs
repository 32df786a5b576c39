//! Pure round state: phases, teams, pools and reveal math, plus the transition session.

pub mod board;
pub mod content;
pub mod image;
pub mod pool;
pub mod reveal;
pub mod state_machine;
pub mod team;
pub mod word;

use std::future::Future;

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::warn;

use crate::error::ServiceError;

pub use self::state_machine::{
    AbortError, ApplyError, PhaseRules, Plan, PlanError, PlanId, Snapshot, StateMachine,
};
use self::reveal::{RevealSchedule, RevealTick, RevealTimer, TickFlow};

/// Phase machine and round data of one mode, always locked together.
#[derive(Debug)]
pub struct RoundState<P: PhaseRules, R> {
    /// Phase machine.
    pub machine: StateMachine<P>,
    /// Mode-specific round data.
    pub round: R,
}

/// Live round of one mode: phase machine, round data, operator gate and
/// reveal timer.
///
/// Operator actions first take the gate with [`RoundSession::begin_action`];
/// a second action arriving while one is in flight is refused rather than
/// queued. Timer ticks never take the gate and rely on the pending plan of
/// the phase machine instead.
///
/// Transitions carry no deadline of their own: each collaborator call made
/// by their work is bounded where it is issued, so work that returned `Ok`
/// always commits.
pub struct RoundSession<P: PhaseRules, R> {
    state: RwLock<RoundState<P, R>>,
    gate: Mutex<()>,
    timer: Mutex<RevealTimer>,
}

impl<P: PhaseRules, R: Send + Sync> RoundSession<P, R> {
    /// Session in the initial phase holding `round`.
    pub fn new(round: R) -> Self {
        Self {
            state: RwLock::new(RoundState {
                machine: StateMachine::new(),
                round,
            }),
            gate: Mutex::new(()),
            timer: Mutex::new(RevealTimer::new()),
        }
    }

    /// Reserve the session for one operator action.
    pub fn begin_action(&self) -> Result<MutexGuard<'_, ()>, ServiceError> {
        self.gate.try_lock().map_err(|_| ServiceError::Busy)
    }

    /// Current phase.
    pub async fn phase(&self) -> P {
        self.state.read().await.machine.phase()
    }

    /// Phase, version and pending phase.
    pub async fn snapshot(&self) -> Snapshot<P> {
        self.state.read().await.machine.snapshot()
    }

    /// Read the machine and the round under one lock.
    pub async fn read<T>(&self, f: impl FnOnce(&StateMachine<P>, &R) -> T) -> T {
        let state = self.state.read().await;
        f(&state.machine, &state.round)
    }

    /// Mutate the round data without a phase change.
    pub async fn update<T>(&self, f: impl FnOnce(&StateMachine<P>, &mut R) -> T) -> T {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        f(&state.machine, &mut state.round)
    }

    /// Apply `event` immediately and mutate the round under the same lock.
    ///
    /// `f` only runs when the transition is legal.
    pub async fn advance<T>(
        &self,
        event: P::Event,
        f: impl FnOnce(&mut R) -> T,
    ) -> Result<(P, T), ServiceError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let next = state.machine.advance(event)?;
        let value = f(&mut state.round);
        Ok((next, value))
    }

    /// Plan `event`, run the awaited `work`, then apply the plan and `commit`
    /// its result on success, or abort the plan on failure.
    ///
    /// While the work runs the plan is pending, so timers and any other
    /// transition are rejected.
    pub async fn run_transition<W, Fut, T, C, U>(
        &self,
        event: P::Event,
        work: W,
        commit: C,
    ) -> Result<(U, P), ServiceError>
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
        C: FnOnce(&mut R, T) -> U,
    {
        let plan_id = {
            let mut state = self.state.write().await;
            state.machine.plan(event.clone())?.id
        };

        match work().await {
            Ok(value) => {
                let mut guard = self.state.write().await;
                let state = &mut *guard;
                let next = state.machine.apply(plan_id)?;
                let committed = commit(&mut state.round, value);
                Ok((committed, next))
            }
            Err(err) => {
                self.abort_transition(plan_id, &event).await;
                Err(err)
            }
        }
    }

    async fn abort_transition(&self, plan_id: PlanId, event: &P::Event) {
        let mut state = self.state.write().await;
        if let Err(abort_err) = state.machine.abort(plan_id) {
            warn!(
                event = ?event,
                plan_id = %plan_id,
                error = ?abort_err,
                "failed to abort transition"
            );
        }
    }

    /// Put the session back in `phase` with `round`, e.g. from a saved snapshot.
    pub async fn restore(&self, phase: P, round: R) {
        let mut state = self.state.write().await;
        state.machine = StateMachine::restored(phase);
        state.round = round;
    }

    /// Return to the initial phase, dropping any pending plan.
    pub async fn reset(&self, f: impl FnOnce(&mut R)) {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.machine.reset();
        f(&mut state.round);
    }

    /// Start the reveal timer, replacing any running one.
    pub async fn start_timer<F, Fut>(&self, schedule: RevealSchedule, on_tick: F) -> u64
    where
        F: FnMut(u64, RevealTick) -> Fut + Send + 'static,
        Fut: Future<Output = TickFlow> + Send + 'static,
    {
        self.timer.lock().await.start(schedule, on_tick)
    }

    /// Cancel the reveal timer. Idempotent.
    pub async fn stop_timer(&self) -> bool {
        self.timer.lock().await.stop()
    }

    /// Detach the timer of `epoch` from inside its own tick.
    pub async fn release_timer(&self, epoch: u64) {
        self.timer.lock().await.release(epoch);
    }

    /// Epoch of the latest timer start.
    pub async fn timer_epoch(&self) -> u64 {
        self.timer.lock().await.epoch()
    }

    /// Whether a reveal timer is running.
    pub async fn timer_running(&self) -> bool {
        self.timer.lock().await.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::image::{ImageEvent, ImagePhase};

    fn session() -> RoundSession<ImagePhase, Vec<&'static str>> {
        RoundSession::new(Vec::new())
    }

    #[tokio::test]
    async fn successful_work_applies_and_commits() {
        let session = session();
        let (len, phase) = session
            .run_transition(
                ImageEvent::StartRound,
                || async { Ok("drawn") },
                |round, value| {
                    round.push(value);
                    round.len()
                },
            )
            .await
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(phase, ImagePhase::Hint);
        assert!(session.snapshot().await.pending.is_none());
    }

    #[tokio::test]
    async fn failed_work_aborts_without_commit() {
        let session = session();
        let err = session
            .run_transition(
                ImageEvent::StartRound,
                || async { Err::<(), _>(ServiceError::PoolExhausted) },
                |round, _| round.push("never"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PoolExhausted));
        assert_eq!(session.phase().await, ImagePhase::Idle);
        assert!(session.read(|_, round| round.is_empty()).await);
        assert!(session.snapshot().await.pending.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_successful_work_still_commits() {
        let session = session();
        let (_, phase) = session
            .run_transition(
                ImageEvent::StartRound,
                || async {
                    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                    Ok("late")
                },
                |round, value| round.push(value),
            )
            .await
            .unwrap();
        assert_eq!(phase, ImagePhase::Hint);
        assert_eq!(session.read(|_, round| round.clone()).await, vec!["late"]);
    }

    #[tokio::test]
    async fn pending_plan_refuses_other_transitions() {
        let session = session();
        let err = session
            .run_transition(
                ImageEvent::StartRound,
                || async {
                    session
                        .advance(ImageEvent::ProceedToReveal, |_| ())
                        .await
                        .map(|_| ())
                },
                |_, _| (),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Busy));
        assert_eq!(session.phase().await, ImagePhase::Idle);
    }

    #[tokio::test]
    async fn second_action_is_refused_while_gate_is_held() {
        let session = session();
        let _first = session.begin_action().unwrap();
        assert!(matches!(session.begin_action(), Err(ServiceError::Busy)));
    }

    #[tokio::test]
    async fn illegal_advance_leaves_round_untouched() {
        let session = session();
        let err = session
            .advance(ImageEvent::TimeUp, |round| round.push("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
        assert!(session.read(|_, round| round.is_empty()).await);
    }
}
