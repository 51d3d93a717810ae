//! Inbound signals.
//!
//! Everything a coordinator reacts to arrives as an [`Input`]: page
//! lifecycle, focus and visibility changes, user interactions, media
//! element notifications, channel messages, storage change notifications
//! and timers.

use crate::{
    catalog::Catalog,
    channel::Message,
    gesture::Interaction,
    media::{PlayError, PlayTicket},
};

/// Low-level buffering notifications of the media element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Buffering {
    Stalled,
    Suspend,
    Waiting,
    Emptied,
    Abort,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// The page is ready: start the first track.
    Boot,

    /// The music element reached the end of its resource.
    Ended,
    /// The music element failed to load or decode its resource.
    MediaError,
    /// The music element reported a buffering condition. Never a skip.
    Buffering(Buffering),
    /// Outcome of a playback attempt.
    PlayResolved {
        ticket: PlayTicket,
        result: Result<(), PlayError>,
    },

    /// Periodic stall check.
    WatchdogTick,

    Blur,
    Focus,
    /// The blur debounce deadline elapsed.
    BlurTimeout,
    /// `true` when the page became hidden.
    Visibility { hidden: bool },
    PageHide,
    BeforeUnload,
    /// The page was shown; `persisted` when restored from the navigation
    /// cache rather than freshly loaded.
    PageShow { persisted: bool },

    Interaction(Interaction),

    /// A message arrived on the coordination channel.
    Message(Message),
    /// Another context wrote the lease key.
    LeaseChanged,

    /// Track validation finished with the reachable subset.
    CatalogValidated(Catalog),
}
