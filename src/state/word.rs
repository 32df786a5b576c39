//! Word reveal mode: letters appear on a timer, teams buzz in and may be
//! locked out after a wrong answer.

use indexmap::IndexSet;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    content::{ItemId, WordItem},
    reveal::{LetterStep, reveal_random_letter},
    state_machine::PhaseRules,
    team::{Team, TeamSet, eligible_teams},
};

/// Phases of a word reveal round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordPhase {
    /// No round in progress.
    Idle,
    /// Letters are being uncovered.
    Revealing,
    /// A team buzzed and is answering.
    Guessing,
    /// The word is shown.
    Finished,
    /// Scores are displayed.
    Scoreboard,
}

impl WordPhase {
    /// Whether a saved round in this phase is worth resuming.
    pub fn is_resumable(self) -> bool {
        matches!(self, WordPhase::Revealing | WordPhase::Guessing)
    }
}

/// Events driving [`WordPhase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordEvent {
    /// Draw a new word and start uncovering letters.
    StartRound,
    /// One more letter was uncovered.
    LetterRevealed,
    /// A team buzzed.
    Buzz(Team),
    /// The answering team found the word.
    CorrectGuess,
    /// The answering team missed; the reveal resumes.
    WrongGuess,
    /// Deadline reached or nothing left to uncover.
    RevealEnded,
    /// Show the scoreboard.
    ViewScoreboard,
}

impl PhaseRules for WordPhase {
    type Event = WordEvent;

    fn initial() -> Self {
        WordPhase::Idle
    }

    fn next(&self, event: &WordEvent) -> Option<Self> {
        use WordEvent as E;
        use WordPhase as P;

        match (self, event) {
            (P::Idle | P::Finished | P::Scoreboard, E::StartRound) => Some(P::Revealing),
            (P::Revealing, E::LetterRevealed) => Some(P::Revealing),
            (P::Revealing, E::Buzz(_)) => Some(P::Guessing),
            (P::Revealing, E::RevealEnded) => Some(P::Finished),
            (P::Guessing, E::CorrectGuess) => Some(P::Finished),
            (P::Guessing, E::WrongGuess) => Some(P::Revealing),
            (P::Finished, E::ViewScoreboard) => Some(P::Scoreboard),
            _ => None,
        }
    }
}

/// Points for guessing a word with `letters` letters once `revealed` are visible.
///
/// Every hidden letter is worth `per_letter`; the result never goes negative.
pub fn word_score(letters: usize, revealed: usize, per_letter: i32) -> i32 {
    let hidden = letters.saturating_sub(revealed);
    let hidden = i32::try_from(hidden).unwrap_or(i32::MAX);
    hidden.saturating_mul(per_letter).max(0)
}

/// Scoring knobs of the word reveal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordRules {
    /// Points per hidden letter at guess time.
    pub points_per_letter: i32,
}

impl Default for WordRules {
    fn default() -> Self {
        Self {
            points_per_letter: 10,
        }
    }
}

/// Outcome of a wrong answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongAnswer {
    /// Team that missed.
    pub team: Team,
    /// Every team had missed, so the lockouts were lifted.
    pub lockouts_cleared: bool,
}

/// Data of the current word round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordRound {
    /// Word being played.
    pub item: Option<WordItem>,
    /// Uncovered character positions, in reveal order.
    pub revealed: IndexSet<usize>,
    /// Team currently answering.
    pub active_team: Option<Team>,
    /// Teams locked out after a wrong answer this round.
    pub locked_out: TeamSet,
}

impl WordRound {
    /// Fresh round for `item`.
    pub fn new(item: WordItem) -> Self {
        Self {
            item: Some(item),
            ..Self::default()
        }
    }

    /// Identifier of the current word.
    pub fn item_id(&self) -> Option<ItemId> {
        self.item.as_ref().map(|item| item.id)
    }

    /// Number of revealable letters of the current word.
    pub fn letter_count(&self) -> usize {
        self.item.as_ref().map(WordItem::letter_count).unwrap_or(0)
    }

    /// Whether `team` may buzz right now.
    pub fn can_buzz(&self, team: Team) -> bool {
        self.active_team.is_none() && !self.locked_out.contains(team)
    }

    /// Uncover one more letter.
    pub fn reveal_next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> LetterStep {
        match &self.item {
            Some(item) => reveal_random_letter(&item.word, &mut self.revealed, rng),
            None => LetterStep::Exhausted,
        }
    }

    /// Points the active team would get for a correct answer now.
    pub fn current_score(&self, rules: WordRules) -> i32 {
        word_score(self.letter_count(), self.revealed.len(), rules.points_per_letter)
    }

    /// Lock out the answering team. Once every team has missed, all lockouts
    /// are lifted so that someone can still answer.
    pub fn register_wrong_answer(&mut self) -> Option<WrongAnswer> {
        let team = self.active_team.take()?;
        self.locked_out.insert(team);

        let still_eligible = eligible_teams(&[&self.locked_out]);
        let lockouts_cleared = still_eligible.is_empty();
        if lockouts_cleared {
            self.locked_out.clear();
        }

        Some(WrongAnswer {
            team,
            lockouts_cleared,
        })
    }

    /// Show the whole word and release the answering team.
    pub fn finish(&mut self) {
        if let Some(item) = &self.item {
            self.revealed.extend(item.letter_positions());
        }
        self.active_team = None;
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::StateMachine;

    fn round(word: &str) -> WordRound {
        WordRound::new(WordItem {
            id: 12,
            word: word.into(),
            image_url: String::new(),
            order_index: None,
        })
    }

    #[test]
    fn score_counts_hidden_letters() {
        assert_eq!(word_score(6, 1, 10), 50);
        assert_eq!(word_score(6, 6, 10), 0);
        assert_eq!(word_score(3, 5, 10), 0);
    }

    #[test]
    fn six_letter_word_with_one_revealed_scores_fifty() {
        let mut round = round("CAVALO");
        let mut rng = StdRng::seed_from_u64(5);
        round.reveal_next(&mut rng);
        assert_eq!(round.current_score(WordRules::default()), 50);

        while let LetterStep::Revealed { .. } = round.reveal_next(&mut rng) {}
        assert_eq!(round.current_score(WordRules::default()), 0);
    }

    #[test]
    fn wrong_guess_resumes_reveal() {
        let mut sm = StateMachine::<WordPhase>::new();
        sm.advance(WordEvent::StartRound).unwrap();
        sm.advance(WordEvent::LetterRevealed).unwrap();
        sm.advance(WordEvent::Buzz(Team::Red)).unwrap();
        assert_eq!(sm.advance(WordEvent::WrongGuess).unwrap(), WordPhase::Revealing);
        assert!(sm.advance(WordEvent::CorrectGuess).is_err());
    }

    #[test]
    fn lockouts_are_lifted_when_everyone_missed() {
        let mut round = round("SOL");
        for team in [Team::Red, Team::Blue, Team::Green] {
            assert!(round.can_buzz(team));
            round.active_team = Some(team);
            let wrong = round.register_wrong_answer().unwrap();
            assert!(!wrong.lockouts_cleared);
            assert!(!round.can_buzz(team));
        }

        round.active_team = Some(Team::Yellow);
        let wrong = round.register_wrong_answer().unwrap();
        assert!(wrong.lockouts_cleared);
        assert!(round.locked_out.is_empty());
        assert!(Team::ALL.iter().all(|team| round.can_buzz(*team)));
    }

    #[test]
    fn wrong_answer_without_active_team_is_noop() {
        let mut round = round("SOL");
        assert_eq!(round.register_wrong_answer(), None);
        assert!(round.locked_out.is_empty());
    }

    #[test]
    fn finish_reveals_every_letter() {
        let mut round = round("BOM DIA");
        round.active_team = Some(Team::Green);
        round.finish();
        assert_eq!(round.revealed.len(), 6);
        assert_eq!(round.active_team, None);
    }
}
