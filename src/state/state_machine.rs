//! Versioned phase machine with two-step plan, apply and abort transitions.

use std::fmt::Debug;

use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// Transition table of a round state machine.
///
/// Each game mode declares its phases and the events that move between them;
/// [`StateMachine`] only ever asks the rules whether an event is legal.
pub trait PhaseRules: Debug + Clone + PartialEq + Send + Sync + 'static {
    /// Events accepted by this machine.
    type Event: Debug + Clone + PartialEq + Send + Sync + 'static;

    /// Initial phase of a freshly built machine.
    fn initial() -> Self;

    /// Phase reached when `event` is applied from `self`, or `None` when illegal.
    fn next(&self, event: &Self::Event) -> Option<Self>;
}

/// An event the current phase does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event} cannot be applied while in {from}")]
pub struct InvalidTransition {
    /// Debug rendering of the phase the machine was in.
    pub from: String,
    /// Debug rendering of the rejected event.
    pub event: String,
}

/// Why [`StateMachine::plan`] refused an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Another plan is still in flight.
    AlreadyPending,
    /// The rules have no edge for this event.
    InvalidTransition(InvalidTransition),
}

/// Why [`StateMachine::apply`] refused a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// Nothing to apply.
    NoPending,
    /// The pending plan is a different one.
    IdMismatch {
        /// Id of the pending plan.
        expected: PlanId,
        /// Id passed by the caller.
        got: PlanId,
    },
    /// The phase moved under the plan.
    PhaseMismatch {
        /// Phase the plan started from.
        expected: String,
        /// Phase found at apply time.
        actual: String,
    },
    /// The version moved under the plan.
    VersionMismatch {
        /// Version the plan expects to produce.
        expected: usize,
        /// Version the machine would produce now.
        actual: usize,
    },
}

/// Why [`StateMachine::abort`] refused a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// Nothing to abort.
    NoPending,
    /// The pending plan is a different one.
    IdMismatch {
        /// Id of the pending plan.
        expected: PlanId,
        /// Id passed by the caller.
        got: PlanId,
    },
}

/// Identifies one plan so a stale apply or abort cannot hit a newer one.
pub type PlanId = Uuid;

/// Validated transition waiting for its collaborator work to finish.
#[derive(Debug, Clone)]
pub struct Plan<P: PhaseRules> {
    /// Identifier checked by apply and abort.
    pub id: PlanId,
    /// Phase the plan starts from.
    pub from: P,
    /// Phase reached once applied.
    pub to: P,
    /// Event being handled.
    pub event: P::Event,
    /// Version reached once applied.
    pub version_next: usize,
    /// When the plan was made.
    pub pending_since: Instant,
}

/// Phase, version and in-flight target of a machine at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<P> {
    /// Current phase.
    pub phase: P,
    /// Bumped by every applied transition and by resets.
    pub version: usize,
    /// Target phase of the pending plan.
    pub pending: Option<P>,
}

/// Phase holder with two-step transitions: plan, then apply or abort.
#[derive(Debug, Clone)]
pub struct StateMachine<P: PhaseRules> {
    phase: P,
    version: usize,
    pending: Option<Plan<P>>,
}

impl<P: PhaseRules> Default for StateMachine<P> {
    fn default() -> Self {
        Self {
            phase: P::initial(),
            version: 0,
            pending: None,
        }
    }
}

impl<P: PhaseRules> StateMachine<P> {
    /// Machine in the rules' initial phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a machine directly in `phase`, used when restoring a saved round.
    pub fn restored(phase: P) -> Self {
        Self {
            phase,
            version: 0,
            pending: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> P {
        self.phase.clone()
    }

    /// Whether a planned transition is waiting to be applied or aborted.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Phase, version and pending target.
    pub fn snapshot(&self) -> Snapshot<P> {
        Snapshot {
            phase: self.phase.clone(),
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to.clone()),
        }
    }

    /// Validate `event` and reserve the machine until the plan is applied or aborted.
    pub fn plan(&mut self, event: P::Event) -> Result<Plan<P>, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(&event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase.clone(),
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Move to the planned phase. The plan must still match the machine.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<P, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: format!("{:?}", plan.from),
                actual: format!("{:?}", self.phase),
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase.clone())
    }

    /// Plan and apply in one step, for transitions that need no external work.
    pub fn advance(&mut self, event: P::Event) -> Result<P, PlanError> {
        let plan = self.plan(event)?;
        self.phase = plan.to;
        self.version = plan.version_next;
        self.pending = None;
        Ok(self.phase.clone())
    }

    /// Drop the pending plan; the phase is untouched.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Drop any pending plan and return to the initial phase.
    pub fn reset(&mut self) {
        self.phase = P::initial();
        self.version += 1;
        self.pending = None;
    }

    fn compute_transition(&self, event: &P::Event) -> Result<P, InvalidTransition> {
        self.phase.next(event).ok_or_else(|| InvalidTransition {
            from: format!("{:?}", self.phase),
            event: format!("{event:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Off,
        On,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Switch {
        Flip,
        Stay,
    }

    impl PhaseRules for Light {
        type Event = Switch;

        fn initial() -> Self {
            Light::Off
        }

        fn next(&self, event: &Switch) -> Option<Self> {
            match (self, event) {
                (Light::Off, Switch::Flip) => Some(Light::On),
                (Light::On, Switch::Flip) => Some(Light::Off),
                (Light::On, Switch::Stay) => Some(Light::On),
                _ => None,
            }
        }
    }

    #[test]
    fn initial_state_comes_from_rules() {
        let sm = StateMachine::<Light>::new();
        assert_eq!(sm.phase(), Light::Off);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn plan_then_apply_moves_phase_and_bumps_version() {
        let mut sm = StateMachine::<Light>::new();
        let plan = sm.plan(Switch::Flip).unwrap();
        assert_eq!(sm.snapshot().pending, Some(Light::On));
        assert_eq!(sm.apply(plan.id).unwrap(), Light::On);
        assert_eq!(sm.snapshot().version, 1);
        assert!(!sm.is_pending());
    }

    #[test]
    fn second_plan_is_rejected_while_pending() {
        let mut sm = StateMachine::<Light>::new();
        let _plan = sm.plan(Switch::Flip).unwrap();
        assert_eq!(sm.plan(Switch::Flip).unwrap_err(), PlanError::AlreadyPending);
        assert_eq!(sm.advance(Switch::Flip).unwrap_err(), PlanError::AlreadyPending);
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = StateMachine::<Light>::new();
        match sm.plan(Switch::Stay).unwrap_err() {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, "Off");
                assert_eq!(invalid.event, "Stay");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn abort_clears_pending_and_keeps_phase() {
        let mut sm = StateMachine::<Light>::new();
        let plan = sm.plan(Switch::Flip).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(!sm.is_pending());
        assert_eq!(sm.phase(), Light::Off);
        assert_eq!(sm.abort(plan.id).unwrap_err(), AbortError::NoPending);
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan_pending() {
        let mut sm = StateMachine::<Light>::new();
        let plan = sm.plan(Switch::Flip).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert!(sm.is_pending());
        sm.apply(plan.id).unwrap();
    }

    #[test]
    fn reset_returns_to_initial_phase() {
        let mut sm = StateMachine::<Light>::restored(Light::On);
        sm.reset();
        assert_eq!(sm.phase(), Light::Off);
    }
}
