//! Debounced pause on focus loss.
//!
//! Native UI such as dropdowns and select pickers steals window focus for a
//! moment without the user leaving the page. A blur therefore only arms a
//! deadline; focus returning before it elapses disarms it. Visibility
//! changes are reliable and bypass this entirely.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct FocusGuard {
    delay: Duration,
    deadline: Option<Instant>,
    was_playing: bool,
}

impl FocusGuard {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            was_playing: false,
        }
    }

    /// Focus was lost. Re-arms the deadline if already armed.
    pub fn blur(&mut self, was_playing: bool) {
        self.was_playing = was_playing;
        self.deadline = Some(Instant::now() + self.delay);
    }

    /// Focus came back. Returns whether playback was active when it left.
    pub fn focus(&mut self) -> bool {
        if self.deadline.take().is_some() {
            trace!("focus returned within {:?}", self.delay);
        }
        self.was_playing
    }

    /// The armed deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consumes the deadline if it has elapsed.
    pub fn expire(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
