//! Events emitted by a coordinator.
//!
//! These are notifications for the host: status indicators, analytics, or
//! tests asserting on what happened. The coordinator never waits on them.
//!
//! # Example
//!
//! ```rust
//! use bgmsync::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::Play => println!("Music started"),
//!         Event::Pause => println!("Music paused"),
//!         Event::TrackChanged(index) => println!("Now loading track {index}"),
//!         _ => {}
//!     }
//! }
//! ```

/// Events that can be emitted by a coordinator.
///
/// Playback events:
/// * [`Play`](Self::Play) - Music started
/// * [`Pause`](Self::Pause) - Music that was playing (or about to) stopped
/// * [`TrackChanged`](Self::TrackChanged) - A new track was loaded
/// * [`Stalled`](Self::Stalled) - The watchdog forced a skip
///
/// Coordination events:
/// * [`Preempted`](Self::Preempted) - Another context claimed playback
/// * [`Unlocked`](Self::Unlocked) - The first user gesture unlocked audio
/// * [`EffectPlayed`](Self::EffectPlayed) - The interaction sound was triggered
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Music started.
    ///
    /// Emitted when a playback attempt is confirmed by the element, muted
    /// or not.
    Play,

    /// Music paused.
    ///
    /// Emitted only on an actual change: pausing paused music is silent.
    Pause,

    /// A track was loaded, carrying its catalog index.
    TrackChanged(usize),

    /// The watchdog found playback wedged and skipped.
    Stalled,

    /// Another context claimed the playback lease.
    Preempted,

    /// The session was unlocked by a trusted gesture.
    Unlocked,

    /// The interaction sound was started.
    EffectPlayed,
}
