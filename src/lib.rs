//! Background music for multi-page sites, coordinated across tabs.
//!
//! A site that plays background music on every page runs into three
//! problems: several open tabs play over each other, autoplay policies
//! refuse audible playback until the user has interacted, and navigating
//! restarts the playlist from the top. This crate solves them with one
//! [`Coordinator`](coordinator::Coordinator) per page:
//!
//! * a shuffled track order kept in session storage, so navigation picks up
//!   where the last page left off without immediate repeats
//! * an advisory lease in origin storage plus a broadcast channel, so at
//!   most one context is audible once notifications settle
//! * muted autoplay until a trusted gesture unlocks the session
//! * a watchdog that skips tracks whose playback stopped progressing
//! * a debounced pause on focus loss that ignores transient native popups
//!
//! The browser (or whatever hosts the pages) is reached through small
//! traits: [`Page`](page::Page), [`Media`](media::Media),
//! [`Storage`](storage::Storage), [`Broadcast`](channel::Broadcast) and
//! [`Clock`](util::Clock). [`Origin`](origin::Origin) implements the
//! storage and channel seams in memory, and [`Driver`](driver::Driver)
//! supplies timers on tokio.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod catalog;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod focus;
pub mod gesture;
pub mod http;
pub mod input;
pub mod lease;
pub mod media;
pub mod origin;
pub mod owner;
pub mod page;
pub mod shuffle;
pub mod storage;
pub mod util;
pub mod watchdog;
