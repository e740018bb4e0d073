//! # Simulation Clock
//!
//! The frame counter every capture and rewind is addressed by, plus a
//! real-time driver for hosts that step the simulation on wall-clock time.
//!
//! ```text
//!   frame:   0      1      2      3   ...   now
//!            |------|------|------|----------|
//!            never  first capture            newest capture
//!            captured
//! ```

use std::time::{Duration, Instant};

/// Simulation frame number. Frame 0 is the state before the first step.
pub type Frame = u64;

/// Monotonic frame counter with a fixed step length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationClock {
    frame: Frame,
    fixed_step: f64,
}

impl SimulationClock {
    /// Creates a clock at frame 0.
    ///
    /// `fixed_step` is the step length in seconds.
    #[must_use]
    pub const fn new(fixed_step: f64) -> Self {
        Self { frame: 0, fixed_step }
    }

    /// Creates a clock stepping `tick_rate` times per second.
    #[must_use]
    pub fn with_tick_rate(tick_rate: u32) -> Self {
        Self::new(1.0 / f64::from(tick_rate.max(1)))
    }

    /// Advances one step and returns the new frame.
    pub fn tick(&mut self) -> Frame {
        self.frame += 1;
        self.frame
    }

    /// Current frame.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> Frame {
        self.frame
    }

    /// Step length in seconds.
    #[inline]
    #[must_use]
    pub const fn fixed_step(&self) -> f64 {
        self.fixed_step
    }

    /// Converts elapsed seconds to a (fractional) frame count.
    #[inline]
    #[must_use]
    pub fn seconds_to_frames(&self, seconds: f64) -> f64 {
        seconds / self.fixed_step
    }

    /// Converts a frame count to seconds.
    #[inline]
    #[must_use]
    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 * self.fixed_step
    }
}

/// Timing statistics for a [`FixedStepLoop`].
#[derive(Clone, Copy, Debug)]
pub struct StepStats {
    /// Shortest step observed.
    pub min_step_us: u64,
    /// Longest step observed.
    pub max_step_us: u64,
    /// Rolling average step duration.
    pub avg_step_us: u64,
    /// Steps that took longer than the step budget.
    pub overruns: u64,
    /// Steps discarded because the loop fell too far behind.
    pub dropped_steps: u64,
    /// Steps measured.
    pub total_steps: u64,
}

impl StepStats {
    fn new(budget: Duration) -> Self {
        Self {
            min_step_us: u64::MAX,
            max_step_us: 0,
            avg_step_us: budget.as_micros() as u64,
            overruns: 0,
            dropped_steps: 0,
            total_steps: 0,
        }
    }
}

/// Accumulator-driven fixed-timestep driver.
///
/// ```rust,ignore
/// let mut driver = FixedStepLoop::new(60);
/// loop {
///     for _ in 0..driver.due_steps() {
///         let started = Instant::now();
///         coordinator.advance();
///         driver.record_step(started);
///     }
///     driver.sleep_until_next();
/// }
/// ```
pub struct FixedStepLoop {
    step: Duration,
    last_poll: Instant,
    accumulator: Duration,
    max_catch_up: u32,
    steps_run: u64,
    stats: StepStats,
}

impl FixedStepLoop {
    /// Default cap on steps run back-to-back after a stall.
    pub const DEFAULT_MAX_CATCH_UP: u32 = 5;

    /// Creates a driver for `tick_rate` steps per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let step = Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)));
        Self {
            step,
            last_poll: Instant::now(),
            accumulator: Duration::ZERO,
            max_catch_up: Self::DEFAULT_MAX_CATCH_UP,
            steps_run: 0,
            stats: StepStats::new(step),
        }
    }

    /// Overrides the catch-up cap.
    #[must_use]
    pub fn with_max_catch_up(mut self, max_catch_up: u32) -> Self {
        self.max_catch_up = max_catch_up.max(1);
        self
    }

    /// Number of steps owed since the last poll.
    ///
    /// Consumes the matching time from the accumulator. Anything beyond the
    /// catch-up cap is dropped and counted in [`StepStats::dropped_steps`].
    pub fn due_steps(&mut self) -> u32 {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_poll);
        self.last_poll = now;

        let mut due = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            if due < self.max_catch_up {
                due += 1;
            } else {
                self.stats.dropped_steps += 1;
            }
        }
        self.steps_run += u64::from(due);
        due
    }

    /// Records the duration of a step that began at `started`.
    pub fn record_step(&mut self, started: Instant) {
        let elapsed = started.elapsed();
        let us = elapsed.as_micros() as u64;

        self.stats.total_steps += 1;
        self.stats.min_step_us = self.stats.min_step_us.min(us);
        self.stats.max_step_us = self.stats.max_step_us.max(us);
        self.stats.avg_step_us = (self.stats.avg_step_us * 15 + us) / 16;
        if elapsed > self.step {
            self.stats.overruns += 1;
        }
    }

    /// Sleeps until the next step is owed.
    pub fn sleep_until_next(&self) {
        let owed = self.step.saturating_sub(self.accumulator + self.last_poll.elapsed());
        if !owed.is_zero() {
            std::thread::sleep(owed);
        }
    }

    /// Steps handed out so far.
    #[must_use]
    pub const fn steps_run(&self) -> u64 {
        self.steps_run
    }

    /// Step budget.
    #[must_use]
    pub const fn step_duration(&self) -> Duration {
        self.step
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &StepStats {
        &self.stats
    }
}
