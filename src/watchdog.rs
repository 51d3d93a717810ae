//! Stall detection.
//!
//! Sampled on a fixed tick. Playback that is nominally running and visible
//! but whose position has not moved for the stuck threshold is wedged, and
//! gets skipped. Paused, hidden or unloaded playback is never a stall.
//!
//! Low-level buffering notifications are deliberately not inputs here:
//! only the absence of progress over the whole window counts.

use std::time::Duration;

/// What the watchdog sees on a tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sample {
    pub loaded: bool,
    pub paused: bool,
    pub hidden: bool,
    pub position: Duration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    Healthy,
    Stalled,
}

#[derive(Clone, Debug)]
pub struct Watchdog {
    tick: Duration,
    threshold: Duration,
    epsilon: Duration,
    last_position: Duration,
    stuck: Duration,
}

impl Watchdog {
    #[must_use]
    pub fn new(tick: Duration, threshold: Duration, epsilon: Duration) -> Self {
        Self {
            tick,
            threshold,
            epsilon,
            last_position: Duration::ZERO,
            stuck: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn stuck_for(&self) -> Duration {
        self.stuck
    }

    /// Forgets progress history, as after a new track was loaded.
    pub fn reset(&mut self) {
        self.last_position = Duration::ZERO;
        self.stuck = Duration::ZERO;
    }

    pub fn tick(&mut self, sample: Sample) -> Verdict {
        if !sample.loaded {
            self.reset();
            return Verdict::Healthy;
        }

        if sample.paused {
            self.last_position = sample.position;
            self.stuck = Duration::ZERO;
            return Verdict::Healthy;
        }

        if sample.hidden {
            self.stuck = Duration::ZERO;
            return Verdict::Healthy;
        }

        if sample.position <= self.last_position + self.epsilon {
            self.stuck += self.tick;
        } else {
            self.stuck = Duration::ZERO;
        }
        self.last_position = sample.position;

        if self.stuck >= self.threshold {
            self.stuck = Duration::ZERO;
            Verdict::Stalled
        } else {
            Verdict::Healthy
        }
    }
}
