//! Progressive reveal: continuous progress math, stepped letter picks and the
//! cancellable timer task driving both.

use std::{future::Future, time::Duration};

use indexmap::IndexSet;
use rand::Rng;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, sleep_until},
};

use super::content::letter_positions;

/// Continuous reveal rising linearly from 0 to 1 over a fixed duration.
///
/// Progress is derived from elapsed wall-clock time against a virtual start,
/// so resuming from a saved progress continues at the same pace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearReveal {
    duration: Duration,
    started_at: Instant,
}

impl LinearReveal {
    /// Start a reveal from zero at `now`.
    pub fn start(duration: Duration, now: Instant) -> Self {
        Self::resume(duration, 0.0, now)
    }

    /// Continue a reveal that had already reached `progress`.
    pub fn resume(duration: Duration, progress: f64, now: Instant) -> Self {
        let elapsed = duration.mul_f64(clamp_progress(progress));
        Self {
            duration,
            started_at: now.checked_sub(elapsed).unwrap_or(now),
        }
    }

    /// Progress in `[0, 1]` at `now`.
    pub fn progress_at(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        clamp_progress(elapsed.as_secs_f64() / self.duration.as_secs_f64())
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Result of revealing one more letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterStep {
    /// A letter was uncovered; `complete` is set once no letter remains hidden.
    Revealed {
        /// Character position of the new letter.
        index: usize,
        /// Whether every letter is now visible.
        complete: bool,
    },
    /// Nothing left to reveal.
    Exhausted,
}

/// Uncover one hidden, non-blank letter of `word` chosen uniformly at random.
pub fn reveal_random_letter<R: Rng + ?Sized>(
    word: &str,
    revealed: &mut IndexSet<usize>,
    rng: &mut R,
) -> LetterStep {
    let positions = letter_positions(word);
    let hidden: Vec<usize> = positions
        .iter()
        .copied()
        .filter(|index| !revealed.contains(index))
        .collect();

    if hidden.is_empty() {
        return LetterStep::Exhausted;
    }

    let index = hidden[rng.random_range(0..hidden.len())];
    revealed.insert(index);

    LetterStep::Revealed {
        index,
        complete: hidden.len() == 1,
    }
}

/// Why the timer woke its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealTick {
    /// Regular interval elapsed.
    Step,
    /// Bounding timeout reached; the timer stops after this tick.
    Deadline,
}

/// Whether the timer should keep running after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    /// Keep ticking.
    Continue,
    /// Stop the timer task.
    Stop,
}

/// Cadence of a reveal timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealSchedule {
    /// Interval between two steps.
    pub step: Duration,
    /// Optional bounding timeout measured from the start.
    pub deadline: Option<Duration>,
    /// Fire a step right away instead of after the first interval.
    pub step_immediately: bool,
}

impl RevealSchedule {
    /// Fixed-step schedule without a bounding timeout.
    pub fn every(step: Duration) -> Self {
        Self {
            step,
            deadline: None,
            step_immediately: false,
        }
    }

    /// Add a bounding timeout.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fire the first step immediately.
    pub fn step_immediately(mut self, value: bool) -> Self {
        self.step_immediately = value;
        self
    }
}

/// Handle on the single background task ticking a round's reveal.
///
/// Starting always cancels the previous task first, so two reveal timers of
/// the same round never overlap. Each start bumps an epoch that callbacks use
/// to recognise ticks from a superseded timer.
#[derive(Debug, Default)]
pub struct RevealTimer {
    task: Option<JoinHandle<()>>,
    epoch: u64,
}

impl RevealTimer {
    /// Idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Epoch of the most recent start.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a timer task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn the ticking task, cancelling any previous one. Returns the new epoch.
    ///
    /// `on_tick` receives the epoch so it can ignore ticks after a restart.
    pub fn start<F, Fut>(&mut self, schedule: RevealSchedule, mut on_tick: F) -> u64
    where
        F: FnMut(u64, RevealTick) -> Fut + Send + 'static,
        Fut: Future<Output = TickFlow> + Send + 'static,
    {
        self.stop();
        self.epoch += 1;
        let epoch = self.epoch;

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let deadline = schedule.deadline.map(|limit| started + limit);
            let first = if schedule.step_immediately {
                started
            } else {
                started + schedule.step
            };
            let mut steps = interval_at(first, schedule.step);
            steps.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let tick = match deadline {
                    Some(at) => tokio::select! {
                        biased;
                        _ = sleep_until(at) => RevealTick::Deadline,
                        _ = steps.tick() => RevealTick::Step,
                    },
                    None => {
                        steps.tick().await;
                        RevealTick::Step
                    }
                };

                let flow = on_tick(epoch, tick).await;
                if flow == TickFlow::Stop || tick == RevealTick::Deadline {
                    break;
                }
            }
        });

        self.task = Some(task);
        epoch
    }

    /// Cancel the running task, if any. Safe to call repeatedly.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the task of `epoch` without aborting it.
    ///
    /// Used from inside a tick callback that is about to return
    /// [`TickFlow::Stop`]; aborting there would cancel the callback itself.
    pub fn release(&mut self, epoch: u64) {
        if self.epoch == epoch {
            self.task = None;
        }
    }
}

impl Drop for RevealTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn linear_progress_follows_elapsed_time() {
        let now = Instant::now();
        let reveal = LinearReveal::start(Duration::from_secs(30), now);
        assert_eq!(reveal.progress_at(now), 0.0);
        let half = reveal.progress_at(now + Duration::from_secs(15));
        assert!((half - 0.5).abs() < 1e-9);
        assert_eq!(reveal.progress_at(now + Duration::from_secs(45)), 1.0);
    }

    #[test]
    fn resumed_reveal_keeps_its_pace() {
        let now = Instant::now() + Duration::from_secs(60);
        let reveal = LinearReveal::resume(Duration::from_secs(30), 0.4, now);
        assert!((reveal.progress_at(now) - 0.4).abs() < 1e-9);
        let later = reveal.progress_at(now + Duration::from_secs(3));
        assert!((later - 0.5).abs() < 1e-9);
    }

    #[test]
    fn resume_clamps_out_of_range_progress() {
        let now = Instant::now() + Duration::from_secs(60);
        let reveal = LinearReveal::resume(Duration::from_secs(30), 3.0, now);
        assert_eq!(reveal.progress_at(now), 1.0);
        let reveal = LinearReveal::resume(Duration::from_secs(30), f64::NAN, now);
        assert_eq!(reveal.progress_at(now), 0.0);
    }

    #[test]
    fn letters_are_revealed_once_each_and_skip_blanks() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut revealed = IndexSet::new();
        let mut seen = Vec::new();
        loop {
            match reveal_random_letter("AB CD", &mut revealed, &mut rng) {
                LetterStep::Revealed { index, complete } => {
                    assert_ne!(index, 2);
                    seen.push(index);
                    assert_eq!(complete, seen.len() == 4);
                }
                LetterStep::Exhausted => break,
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 3, 4]);
        assert_eq!(revealed.len(), 4);
    }

    #[test]
    fn blank_word_is_exhausted_immediately() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut revealed = IndexSet::new();
        assert_eq!(
            reveal_random_letter("   ", &mut revealed, &mut rng),
            LetterStep::Exhausted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_on_schedule_and_stops_at_deadline() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let deadlines = Arc::new(AtomicUsize::new(0));
        let mut timer = RevealTimer::new();
        let (t, d) = (ticks.clone(), deadlines.clone());
        timer.start(
            RevealSchedule::every(Duration::from_secs(6)).with_deadline(Duration::from_secs(20)),
            move |_, tick| {
                let (t, d) = (t.clone(), d.clone());
                async move {
                    match tick {
                        RevealTick::Step => t.fetch_add(1, Ordering::SeqCst),
                        RevealTick::Deadline => d.fetch_add(1, Ordering::SeqCst),
                    };
                    TickFlow::Continue
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(deadlines.load(Ordering::SeqCst), 1);
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_previous_task() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = RevealTimer::new();
        for _ in 0..3 {
            let t = ticks.clone();
            timer.start(RevealSchedule::every(Duration::from_secs(1)), move |_, _| {
                let t = t.clone();
                async move {
                    t.fetch_add(1, Ordering::SeqCst);
                    TickFlow::Continue
                }
            });
        }
        assert_eq!(timer.epoch(), 3);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        assert!(timer.stop());
        assert!(!timer.stop());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_step_fires_at_start() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = RevealTimer::new();
        let t = ticks.clone();
        timer.start(
            RevealSchedule::every(Duration::from_secs(6)).step_immediately(true),
            move |_, _| {
                let t = t.clone();
                async move {
                    t.fetch_add(1, Ordering::SeqCst);
                    TickFlow::Stop
                }
            },
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!timer.is_running());
    }
}
