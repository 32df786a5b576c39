//! Image reveal mode: a hint, a continuous reveal, then a single guess.

use serde::{Deserialize, Serialize};

use super::{
    content::{ImageItem, ItemId},
    reveal::LinearReveal,
    state_machine::PhaseRules,
    team::Team,
};

/// Phases of an image reveal round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePhase {
    /// No round in progress.
    Idle,
    /// The hint is shown; the picture is still hidden.
    Hint,
    /// The picture is being uncovered.
    Revealing,
    /// A team buzzed and is answering.
    Guessing,
    /// The answer is shown.
    Finished,
    /// Scores are displayed.
    Scoreboard,
}

impl ImagePhase {
    /// Whether a saved round in this phase is worth resuming.
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            ImagePhase::Hint | ImagePhase::Revealing | ImagePhase::Guessing
        )
    }
}

/// Events driving [`ImagePhase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageEvent {
    /// Draw a new picture and show its hint.
    StartRound,
    /// Leave the hint and start uncovering the picture.
    ProceedToReveal,
    /// A team buzzed during the reveal.
    Buzz(Team),
    /// The reveal reached full visibility without any buzz.
    TimeUp,
    /// The operator judged the answer.
    Verdict {
        /// Whether the answer was right.
        correct: bool,
    },
    /// Show the scoreboard.
    ViewScoreboard,
}

impl PhaseRules for ImagePhase {
    type Event = ImageEvent;

    fn initial() -> Self {
        ImagePhase::Idle
    }

    fn next(&self, event: &ImageEvent) -> Option<Self> {
        use ImageEvent as E;
        use ImagePhase as P;

        match (self, event) {
            (P::Idle | P::Finished | P::Scoreboard, E::StartRound) => Some(P::Hint),
            (P::Hint, E::ProceedToReveal) => Some(P::Revealing),
            (P::Revealing, E::Buzz(_)) => Some(P::Guessing),
            (P::Revealing, E::TimeUp) => Some(P::Finished),
            (P::Guessing, E::Verdict { .. }) => Some(P::Finished),
            (P::Finished, E::ViewScoreboard) => Some(P::Scoreboard),
            _ => None,
        }
    }
}

/// Data of the current image round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageRound {
    /// Picture being played.
    pub item: Option<ImageItem>,
    /// Reveal progress in `[0, 1]`, never decreasing within a round.
    pub progress: f64,
    /// Team currently answering.
    pub active_team: Option<Team>,
    /// Clock of the running reveal; not persisted.
    pub clock: Option<LinearReveal>,
}

impl ImageRound {
    /// Fresh round for `item`.
    pub fn new(item: ImageItem) -> Self {
        Self {
            item: Some(item),
            ..Self::default()
        }
    }

    /// Identifier of the current picture.
    pub fn item_id(&self) -> Option<ItemId> {
        self.item.as_ref().map(|item| item.id)
    }

    /// Raise the progress to `progress`, ignoring any attempt to lower it.
    pub fn record_progress(&mut self, progress: f64) -> f64 {
        if progress > self.progress {
            self.progress = progress.min(1.0);
        }
        self.progress
    }

    /// Freeze the reveal at its progress at `now`.
    pub fn pause(&mut self, now: tokio::time::Instant) -> f64 {
        if let Some(clock) = self.clock.take() {
            self.record_progress(clock.progress_at(now));
        }
        self.progress
    }

    /// Show the whole picture and release the answering team.
    pub fn finish(&mut self) {
        self.progress = 1.0;
        self.active_team = None;
        self.clock = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateMachine;

    fn item() -> ImageItem {
        ImageItem {
            id: 4,
            answer: "Torre Eiffel".into(),
            image_url: "https://img/4.png".into(),
            hint: "Paris".into(),
            order_index: None,
        }
    }

    #[test]
    fn full_round_walks_every_phase() {
        let mut sm = StateMachine::<ImagePhase>::new();
        assert_eq!(sm.advance(ImageEvent::StartRound).unwrap(), ImagePhase::Hint);
        assert_eq!(
            sm.advance(ImageEvent::ProceedToReveal).unwrap(),
            ImagePhase::Revealing
        );
        assert_eq!(
            sm.advance(ImageEvent::Buzz(Team::Green)).unwrap(),
            ImagePhase::Guessing
        );
        assert_eq!(
            sm.advance(ImageEvent::Verdict { correct: true }).unwrap(),
            ImagePhase::Finished
        );
        assert_eq!(
            sm.advance(ImageEvent::ViewScoreboard).unwrap(),
            ImagePhase::Scoreboard
        );
        assert_eq!(sm.advance(ImageEvent::StartRound).unwrap(), ImagePhase::Hint);
    }

    #[test]
    fn buzz_outside_reveal_is_rejected() {
        for phase in [ImagePhase::Idle, ImagePhase::Hint, ImagePhase::Guessing] {
            assert_eq!(phase.next(&ImageEvent::Buzz(Team::Red)), None);
        }
        assert_eq!(
            ImagePhase::Hint.next(&ImageEvent::Verdict { correct: false }),
            None
        );
    }

    #[test]
    fn progress_never_decreases() {
        let mut round = ImageRound::new(item());
        let mut last = 0.0;
        for sample in [0.1, 0.3, 0.2, 0.25, 0.9, 0.5, 1.4] {
            let now = round.record_progress(sample);
            assert!(now >= last);
            last = now;
        }
        assert_eq!(round.progress, 1.0);
    }

    #[test]
    fn finish_uncovers_and_releases_team() {
        let mut round = ImageRound::new(item());
        round.active_team = Some(Team::Blue);
        round.record_progress(0.4);
        round.finish();
        assert_eq!(round.progress, 1.0);
        assert_eq!(round.active_team, None);
        assert_eq!(round.item_id(), Some(4));
    }

    #[test]
    fn only_live_phases_resume() {
        assert!(ImagePhase::Revealing.is_resumable());
        assert!(!ImagePhase::Idle.is_resumable());
        assert!(!ImagePhase::Finished.is_resumable());
        assert!(!ImagePhase::Scoreboard.is_resumable());
    }
}
