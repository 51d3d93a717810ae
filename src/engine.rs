//! Playback engine.
//!
//! Owns the background music element and tracks where it is in its
//! lifecycle. All state changes go through [`State::next`], the transition
//! table; the coordinator decides *when* to load, play or pause, the engine
//! decides what that means for the element.
//!
//! ```text
//!   Idle    --Load-->     Loading     (any state)
//!   Paused  --Request-->  Loading
//!   Loading --Started-->  Playing
//!   Loading --Refused-->  Paused
//!   Loading, Playing --Halt, Finished--> Paused
//! ```

use std::time::Duration;

use url::Url;

use crate::media::{Media, PlayError, PlayTicket};

/// Lifecycle of the music element.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum State {
    /// Nothing loaded yet.
    #[default]
    Idle,
    /// A resource is assigned and a playback attempt may be in flight.
    Loading,
    Playing,
    Paused,
}

/// Inputs of the transition table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// A new resource was assigned.
    Load,
    /// Playback was requested.
    Request,
    /// The request succeeded.
    Started,
    /// The request was refused or aborted.
    Refused,
    /// Playback was paused.
    Halt,
    /// The resource ended or failed.
    Finished,
}

impl State {
    /// The transition table. Pairs not listed keep the current state.
    #[must_use]
    pub fn next(self, transition: Transition) -> Self {
        use State::*;
        use Transition::*;

        match (self, transition) {
            (_, Load) => Loading,
            (Loading | Paused, Request) => Loading,
            (Loading, Started) => Playing,
            (Loading, Refused) => Paused,
            (Loading | Playing, Halt | Finished) => Paused,
            (state, _) => state,
        }
    }

    /// Whether audio is playing or about to.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, State::Loading | State::Playing)
    }
}

/// Why a playback attempt was made.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    /// First track on page load.
    Start,
    /// Advance after end, error or stall.
    Skip,
    /// Resume of the loaded track.
    Resume,
    /// Muted retry after an audible attempt was refused.
    Retry,
}

/// A playback attempt in flight.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Attempt {
    pub ticket: PlayTicket,
    pub muted: bool,
    pub kind: AttemptKind,
}

/// Result of matching a host report against the attempt in flight.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Not the attempt in flight: abandoned earlier.
    Stale,
    Started(Attempt),
    Refused(Attempt, PlayError),
    Failed(Attempt),
}

pub struct Engine {
    music: Box<dyn Media>,
    volume: f32,
    state: State,
    current: Option<usize>,
    tickets: PlayTicket,
    pending: Option<Attempt>,
}

impl Engine {
    pub fn new(mut music: Box<dyn Media>, volume: f32) -> Self {
        music.set_volume(volume);
        music.set_looping(false);

        Self {
            music,
            volume,
            state: State::Idle,
            current: None,
            tickets: PlayTicket::default(),
            pending: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Catalog index of the loaded track.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn set_current(&mut self, index: Option<usize>) {
        self.current = index;
    }

    #[must_use]
    pub fn pending(&self) -> Option<Attempt> {
        self.pending
    }

    #[must_use]
    pub fn skip_in_flight(&self) -> bool {
        self.pending
            .is_some_and(|attempt| attempt.kind == AttemptKind::Skip)
    }

    #[must_use]
    pub fn has_source(&self) -> bool {
        self.music.has_source()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.music.is_paused()
    }

    #[must_use]
    pub fn position(&self) -> Duration {
        self.music.position()
    }

    /// Stops what is playing and assigns a new resource from the start.
    pub fn load(&mut self, index: usize, url: &Url) {
        self.music.pause();
        self.music.seek_to_start();
        self.music.set_source(Some(url));
        self.current = Some(index);
        self.pending = None;
        self.transition(Transition::Load);
    }

    /// Requests playback of the loaded resource.
    ///
    /// Returns `None` when nothing is loaded.
    pub fn play(&mut self, muted: bool, kind: AttemptKind) -> Option<PlayTicket> {
        if !self.music.has_source() {
            return None;
        }

        self.music.set_volume(self.volume);
        self.music.set_muted(muted);

        let ticket = self.issue_ticket();
        self.pending = Some(Attempt {
            ticket,
            muted,
            kind,
        });
        self.transition(Transition::Request);
        self.music.play(ticket);

        Some(ticket)
    }

    /// Takes a ticket from the engine's counter. Attempts on other elements
    /// draw from here too, so their outcomes never match a music attempt.
    pub fn issue_ticket(&mut self) -> PlayTicket {
        PlayTicket::take_next(&mut self.tickets)
    }

    /// Matches a host report against the attempt in flight.
    pub fn resolve(&mut self, ticket: PlayTicket, result: Result<(), PlayError>) -> Outcome {
        let attempt = match self.pending {
            Some(attempt) if attempt.ticket == ticket => attempt,
            _ => return Outcome::Stale,
        };
        self.pending = None;

        match result {
            Ok(()) => {
                self.transition(Transition::Started);
                Outcome::Started(attempt)
            }
            Err(PlayError::Failed) => {
                self.transition(Transition::Finished);
                Outcome::Failed(attempt)
            }
            Err(e) => {
                self.transition(Transition::Refused);
                Outcome::Refused(attempt, e)
            }
        }
    }

    /// Pauses and abandons any attempt in flight.
    ///
    /// Returns whether audio was playing or about to.
    pub fn pause(&mut self) -> bool {
        let was_active =
            self.state == State::Playing || self.pending.is_some() || !self.music.is_paused();
        self.music.pause();
        self.pending = None;
        self.transition(Transition::Halt);
        was_active
    }

    /// Records that the resource ended or failed.
    pub fn finish(&mut self) {
        self.pending = None;
        self.transition(Transition::Finished);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.music.set_muted(muted);
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.music.is_muted()
    }

    fn transition(&mut self, transition: Transition) {
        let next = self.state.next(transition);
        if next != self.state {
            trace!("engine {:?} --{transition:?}--> {next:?}", self.state);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use State::*;
        use Transition::*;

        let cases = [
            (Idle, Load, Loading),
            (Idle, Request, Idle),
            (Idle, Halt, Idle),
            (Loading, Started, Playing),
            (Loading, Refused, Paused),
            (Loading, Halt, Paused),
            (Playing, Halt, Paused),
            (Playing, Finished, Paused),
            (Playing, Load, Loading),
            (Paused, Request, Loading),
            (Paused, Started, Paused),
            (Playing, Request, Playing),
        ];

        for (from, transition, to) in cases {
            assert_eq!(from.next(transition), to, "{from:?} --{transition:?}-->");
        }
    }

    #[test]
    fn active_states() {
        assert!(State::Loading.is_active());
        assert!(State::Playing.is_active());
        assert!(!State::Paused.is_active());
        assert!(!State::Idle.is_active());
    }
}
