//! Media playback handles.
//!
//! A [`Media`] is one audio element owned by the page. Starting playback is
//! asynchronous on every platform this runs on: [`Media::play`] only issues
//! the request, tagged with a [`PlayTicket`], and the host later reports
//! the outcome as [`Input::PlayResolved`] carrying the same ticket. Tickets
//! let the coordinator ignore outcomes of attempts it has since abandoned.
//!
//! [`Input::PlayResolved`]: crate::input::Input::PlayResolved

use std::{fmt, time::Duration};

use thiserror::Error;
use url::Url;

use crate::page::Page;

/// Identifies one playback attempt.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayTicket(pub u64);

impl PlayTicket {
    /// Returns this ticket and advances the counter.
    pub fn take_next(counter: &mut Self) -> Self {
        let ticket = *counter;
        counter.0 = counter.0.wrapping_add(1);
        ticket
    }
}

impl fmt::Display for PlayTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a playback attempt did not start.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum PlayError {
    /// The platform's autoplay policy refused audible (or any) playback
    /// outside of a user gesture.
    #[error("playback not allowed without a user gesture")]
    NotAllowed,

    /// The attempt was interrupted by a pause or a new source.
    #[error("playback attempt aborted")]
    Aborted,

    /// The resource could not be loaded or decoded.
    #[error("resource failed to play")]
    Failed,
}

/// One audio element.
pub trait Media {
    /// Replaces the resource. `None` unloads.
    fn set_source(&mut self, url: Option<&Url>);

    fn has_source(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    fn is_muted(&self) -> bool;

    fn set_volume(&mut self, volume: f32);

    fn set_looping(&mut self, looping: bool);

    /// Requests playback. The outcome is reported asynchronously with
    /// `ticket`.
    fn play(&mut self, ticket: PlayTicket);

    fn pause(&mut self);

    fn seek_to_start(&mut self);

    /// Current playback position.
    fn position(&self) -> Duration;

    fn is_paused(&self) -> bool;

    /// Detaches the element from the page.
    fn remove(&mut self);
}

impl<M: Media> Media for std::rc::Rc<std::cell::RefCell<M>> {
    fn set_source(&mut self, url: Option<&Url>) {
        self.borrow_mut().set_source(url);
    }

    fn has_source(&self) -> bool {
        self.borrow().has_source()
    }

    fn set_muted(&mut self, muted: bool) {
        self.borrow_mut().set_muted(muted);
    }

    fn is_muted(&self) -> bool {
        self.borrow().is_muted()
    }

    fn set_volume(&mut self, volume: f32) {
        self.borrow_mut().set_volume(volume);
    }

    fn set_looping(&mut self, looping: bool) {
        self.borrow_mut().set_looping(looping);
    }

    fn play(&mut self, ticket: PlayTicket) {
        self.borrow_mut().play(ticket);
    }

    fn pause(&mut self) {
        self.borrow_mut().pause();
    }

    fn seek_to_start(&mut self) {
        self.borrow_mut().seek_to_start();
    }

    fn position(&self) -> Duration {
        self.borrow().position()
    }

    fn is_paused(&self) -> bool {
        self.borrow().is_paused()
    }

    fn remove(&mut self) {
        self.borrow_mut().remove();
    }
}

/// Returns the single element with `id`, creating it if the page has none
/// and discarding extras if an earlier initialization left duplicates.
pub fn ensure_single(page: &mut dyn Page, id: &str) -> Box<dyn Media> {
    let mut found = page.find_media(id);

    if found.len() > 1 {
        warn!("found {} elements with id {id}, keeping the first", found.len());
        for mut extra in found.drain(1..) {
            extra.pause();
            extra.remove();
        }
    }

    match found.pop() {
        Some(media) => media,
        None => {
            trace!("creating element {id}");
            page.create_media(id)
        }
    }
}
