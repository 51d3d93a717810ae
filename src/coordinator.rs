//! The background music coordinator.
//!
//! One [`Coordinator`] runs per page. It owns the music and effect elements
//! and reacts to every [`Input`] by driving the components:
//!
//! * [`TrackOrder`] picks the next track from a shuffled permutation that
//!   survives navigations within the session
//! * [`Lock`] decides which of the origin's contexts may be audible
//! * [`Engine`] runs the music element's lifecycle
//! * [`Watchdog`] skips playback that stopped making progress
//! * [`FocusGuard`] debounces pauses on focus loss
//! * [`UnlockGate`] remembers whether a user gesture has happened
//!
//! The coordinator is single-threaded and never blocks. Anything that takes
//! time (playback start, timers, track validation) is requested here and
//! reported back later as another input. Hosts feed inputs in arrival
//! order, either directly or through a [`Driver`](crate::driver::Driver).
//!
//! # Ownership rules
//!
//! Before any playback attempt the coordinator checks the lease, and after
//! any attempt succeeds it checks again: a context that lost the lease in
//! the meantime pauses immediately. Pausing abandons the attempt in flight,
//! so an outcome arriving after a pause is ignored.
//!
//! # Failure handling
//!
//! Tracks that fail to play are skipped. After as many consecutive failures
//! as there are tracks, the coordinator stops trying until the next trusted
//! gesture rather than cycling through a broken catalog forever.

use std::{cell::RefCell, fmt, rc::Rc};

use tokio::{sync::mpsc, time::Instant};

use crate::{
    catalog::Catalog,
    channel::Broadcast,
    config::Config,
    engine::{AttemptKind, Engine, Outcome, State},
    error::{Error, Result},
    events::Event,
    focus::FocusGuard,
    gesture::{Interaction, InteractionKind, UnlockGate},
    input::Input,
    lease::{Lock, Preempted},
    media::{self, Media, PlayError, PlayTicket},
    owner::OwnerId,
    page::Page,
    shuffle::TrackOrder,
    storage::Storage,
    util::Clock,
    watchdog::{Sample, Verdict, Watchdog},
};

/// Everything a coordinator needs from its environment.
pub struct Host {
    pub page: Box<dyn Page>,

    /// Session-scoped storage, private to this browsing context.
    pub session: Rc<RefCell<dyn Storage>>,

    /// Origin-scoped storage, shared by all contexts of the origin.
    pub shared: Box<dyn Storage>,

    /// Coordination channel. Without one, contexts learn about claims from
    /// storage change notifications only.
    pub channel: Option<Box<dyn Broadcast>>,

    pub clock: Box<dyn Clock>,
}

/// Why the coordinator moves on to another track.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum SkipReason {
    Ended,
    MediaError,
    Refused,
    Stalled,
}

impl SkipReason {
    fn is_failure(self) -> bool {
        matches!(self, Self::MediaError | Self::Refused)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ended => write!(f, "track ended"),
            Self::MediaError => write!(f, "media error"),
            Self::Refused => write!(f, "track failed to start"),
            Self::Stalled => write!(f, "playback stalled"),
        }
    }
}

pub struct Coordinator {
    page: Box<dyn Page>,
    catalog: Catalog,
    order: TrackOrder,
    lock: Lock,
    gate: UnlockGate,
    engine: Engine,
    effect: Option<Box<dyn Media>>,
    watchdog: Watchdog,
    focus: FocusGuard,

    singleton_marker: String,
    excluded_regions: Vec<String>,

    /// Whether a trusted gesture has been seen on this page.
    gestured: bool,

    /// Set when booting on a hidden page; the first track starts once the
    /// page becomes visible.
    boot_deferred: bool,

    /// Consecutive tracks that failed to play.
    failures: usize,

    /// Set once `failures` reached the catalog length.
    exhausted: bool,

    /// Set when even a muted attempt was refused; the next trusted gesture
    /// retries.
    awaiting_gesture: bool,

    event_tx: Option<mpsc::UnboundedSender<Event>>,
}

impl Coordinator {
    /// Initializes the coordinator on a page.
    ///
    /// Takes over the page's music and effect elements, creating them if
    /// needed and discarding duplicates left by an earlier initialization.
    /// Nothing plays until [`Input::Boot`] is handled.
    ///
    /// # Errors
    ///
    /// * `AlreadyExists` if a coordinator is already running on the page
    /// * `InvalidArgument` if a track or effect path cannot be resolved
    pub fn new(config: &Config, host: Host) -> Result<Self> {
        let Host {
            mut page,
            session,
            shared,
            channel,
            clock,
        } = host;

        if page.is_marked(&config.singleton_marker) {
            return Err(Error::already_exists(
                "a coordinator is already running on this page",
            ));
        }

        let catalog = Catalog::resolve(&config.base_url, &config.tracks)?;
        if catalog.is_empty() {
            warn!("no tracks configured, background music disabled");
        }

        let effect = match config.effect.as_deref() {
            Some(path) => {
                let url = config.base_url.join(path)?;
                let mut effect = media::ensure_single(page.as_mut(), &config.effect_element);
                effect.set_source(Some(&url));
                effect.set_volume(config.effect_volume);
                effect.set_looping(false);
                Some(effect)
            }
            None => None,
        };

        let music = media::ensure_single(page.as_mut(), &config.music_element);
        let engine = Engine::new(music, config.music_volume);

        let order = TrackOrder::new(
            Box::new(Rc::clone(&session)),
            &config.keys.order,
            &config.keys.cursor,
            catalog.len(),
        );
        let gate = UnlockGate::new(Box::new(session), &config.keys.unlocked);

        let owner = OwnerId::generate();
        let lock = Lock::new(
            owner,
            &config.keys.lease,
            config.stale_lease,
            shared,
            channel,
            clock,
        );

        page.mark(&config.singleton_marker, true);
        info!(
            "coordinator {owner} ready with {} tracks{}",
            catalog.len(),
            if gate.is_unlocked() {
                ", session unlocked"
            } else {
                ""
            }
        );

        Ok(Self {
            page,
            catalog,
            order,
            lock,
            gate,
            engine,
            effect,
            watchdog: Watchdog::new(
                config.watchdog_tick,
                config.watchdog_stuck,
                config.stall_epsilon,
            ),
            focus: FocusGuard::new(config.blur_pause_delay),
            singleton_marker: config.singleton_marker.clone(),
            excluded_regions: config.excluded_regions.clone(),
            gestured: false,
            boot_deferred: false,
            failures: 0,
            exhausted: false,
            awaiting_gesture: false,
            event_tx: None,
        })
    }

    /// Sends [`Event`]s to `tx` from now on.
    pub fn register_event_handler(&mut self, tx: mpsc::UnboundedSender<Event>) {
        self.event_tx = Some(tx);
    }

    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.lock.owner()
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.engine.state()
    }

    /// Catalog index of the loaded track.
    #[must_use]
    pub fn current_track(&self) -> Option<usize> {
        self.engine.current()
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.gate.is_unlocked()
    }

    /// Whether this context currently may be audible.
    #[must_use]
    pub fn holds_lease(&self) -> bool {
        self.lock.is_mine()
    }

    /// When [`Input::BlurTimeout`] is due, if a blur is pending.
    #[must_use]
    pub fn blur_deadline(&self) -> Option<Instant> {
        self.focus.deadline()
    }

    /// Reacts to one input.
    pub fn handle(&mut self, input: Input) {
        trace!("handling {input:?}");

        match input {
            Input::Boot => self.boot(),

            Input::Ended => self.on_track_over(SkipReason::Ended),
            Input::MediaError => self.on_track_over(SkipReason::MediaError),
            Input::Buffering(kind) => {
                trace!("buffering ({kind:?}), leaving it to the watchdog");
            }
            Input::PlayResolved { ticket, result } => self.on_play_resolved(ticket, result),

            Input::WatchdogTick => self.on_watchdog_tick(),

            Input::Blur => {
                let was_playing = !self.engine.is_paused();
                self.focus.blur(was_playing);
            }
            Input::Focus => self.on_focus(),
            Input::BlurTimeout => self.on_blur_timeout(),
            Input::Visibility { hidden: true } | Input::PageHide | Input::BeforeUnload => {
                self.pause();
            }
            Input::Visibility { hidden: false } => {
                if self.boot_deferred {
                    self.boot();
                }
            }
            Input::PageShow { persisted } => self.on_page_show(persisted),

            Input::Interaction(interaction) => self.on_interaction(&interaction),

            Input::Message(message) => {
                if let Some(preempted) = self.lock.on_message(&message) {
                    self.preempted(preempted);
                }
            }
            Input::LeaseChanged => {
                if let Some(preempted) = self.lock.on_lease_changed() {
                    self.preempted(preempted);
                }
            }

            Input::CatalogValidated(catalog) => self.replace_catalog(catalog),
        }
    }

    /// Plays the interaction sound from the start, if one is configured.
    pub fn play_effect(&mut self) {
        let ticket = self.engine.issue_ticket();
        if let Some(effect) = self.effect.as_mut() {
            effect.pause();
            effect.seek_to_start();
            effect.play(ticket);
            self.emit(Event::EffectPlayed);
        }
    }

    /// Stops all audio and releases the page so another coordinator can be
    /// initialized on it.
    pub fn shutdown(mut self) {
        self.engine.pause();
        if let Some(effect) = self.effect.as_mut() {
            effect.pause();
        }
        self.page.mark(&self.singleton_marker, false);
        info!("coordinator {} shut down", self.lock.owner());
    }

    fn boot(&mut self) {
        self.boot_deferred = false;

        if self.engine.state() != State::Idle {
            trace!("already started");
            return;
        }

        if self.catalog.is_empty() {
            return;
        }

        if self.page.is_hidden() {
            debug!("page hidden, deferring start until visible");
            self.boot_deferred = true;
            return;
        }

        self.lock.claim();
        if let Some(index) = self.order.next_track(None) {
            self.load(index);
            self.start(AttemptKind::Start, !self.gate.is_unlocked());
        }
    }

    fn on_track_over(&mut self, reason: SkipReason) {
        if self.engine.skip_in_flight() {
            debug!("skip already in flight, ignoring {reason}");
            return;
        }

        self.engine.finish();
        self.skip_to_next(reason);
    }

    fn skip_to_next(&mut self, reason: SkipReason) {
        if self.catalog.is_empty() {
            return;
        }

        // The watchdog supersedes a skip that is itself wedged.
        if self.engine.skip_in_flight() && reason != SkipReason::Stalled {
            debug!("skip already in flight, ignoring {reason}");
            return;
        }

        if self.exhausted {
            trace!("waiting for a gesture, ignoring {reason}");
            return;
        }

        if !self.lock.is_mine() {
            debug!("not holding the lease, not skipping on {reason}");
            return;
        }

        if self.page.is_hidden() {
            debug!("page hidden, not skipping on {reason}");
            return;
        }

        if reason.is_failure() {
            self.failures += 1;
            if self.failures >= self.catalog.len() {
                warn!(
                    "{} tracks failed in a row, waiting for a user gesture",
                    self.failures
                );
                self.exhausted = true;
                return;
            }
        }

        self.lock.claim();
        if let Some(index) = self.order.next_track(self.engine.current()) {
            info!("{reason}, skipping to track {index}");
            self.load(index);
            self.start(AttemptKind::Skip, !self.gate.is_unlocked());
        }
    }

    fn load(&mut self, index: usize) {
        let Some(url) = self.catalog.get(index).cloned() else {
            return;
        };

        debug!("loading track {index}: {url}");
        self.engine.load(index, &url);
        self.watchdog.reset();
        self.emit(Event::TrackChanged(index));
    }

    fn start(&mut self, kind: AttemptKind, muted: bool) {
        if !self.lock.is_mine() {
            debug!("lease lost before {kind:?} attempt, not playing");
            return;
        }

        if let Some(ticket) = self.engine.play(muted, kind) {
            debug!(
                "requested playback {ticket} ({kind:?}{})",
                if muted { ", muted" } else { "" }
            );
        }
    }

    fn on_play_resolved(&mut self, ticket: PlayTicket, result: std::result::Result<(), PlayError>) {
        match self.engine.resolve(ticket, result) {
            Outcome::Stale => {
                trace!("ignoring outcome of abandoned attempt {ticket}");
                if self.engine.state() == State::Paused && !self.engine.is_paused() {
                    self.engine.pause();
                }
            }

            Outcome::Started(attempt) => {
                if !self.lock.is_mine() || self.page.is_hidden() {
                    debug!("attempt {ticket} started without lease or visibility, pausing");
                    self.engine.pause();
                    return;
                }

                if attempt.muted && self.gate.is_unlocked() {
                    self.engine.set_muted(false);
                }
                self.failures = 0;
                self.awaiting_gesture = false;
                debug!("playing track {:?}", self.engine.current());
                self.emit(Event::Play);
            }

            Outcome::Refused(attempt, PlayError::NotAllowed) if !attempt.muted => {
                debug!("audible playback not allowed, retrying muted");
                self.start(AttemptKind::Retry, true);
            }
            Outcome::Refused(_, PlayError::NotAllowed) => {
                debug!("muted playback not allowed, waiting for a user gesture");
                self.awaiting_gesture = true;
            }
            Outcome::Refused(_, e) => trace!("attempt {ticket}: {e}"),

            Outcome::Failed(_) => self.skip_to_next(SkipReason::Refused),
        }
    }

    fn on_watchdog_tick(&mut self) {
        let sample = Sample {
            loaded: self.engine.has_source(),
            paused: self.engine.is_paused(),
            hidden: self.page.is_hidden(),
            position: self.engine.position(),
        };

        if sample.loaded && !sample.paused && !sample.hidden {
            self.lock.renew();
        }

        if self.watchdog.tick(sample) == Verdict::Stalled {
            warn!(
                "track {:?} stuck at {:?}, skipping",
                self.engine.current(),
                sample.position
            );
            self.emit(Event::Stalled);
            self.engine.finish();
            self.skip_to_next(SkipReason::Stalled);
        }
    }

    fn on_focus(&mut self) {
        let was_playing = self.focus.focus();

        if was_playing
            && !self.page.is_hidden()
            && self.gate.is_unlocked()
            && self.engine.is_paused()
            && self.lock.is_mine()
        {
            debug!("focus regained, resuming");
            self.lock.claim();
            self.start(AttemptKind::Resume, false);
        }
    }

    fn on_blur_timeout(&mut self) {
        if !self.focus.expire() {
            return;
        }

        if self.page.is_hidden() || !self.page.has_focus() {
            debug!("focus lost, pausing");
            self.pause();
        }
    }

    fn on_page_show(&mut self, persisted: bool) {
        if !persisted || self.page.is_hidden() || !self.gate.is_unlocked() {
            return;
        }

        self.lock.claim();
        if self.lock.is_mine() && self.engine.is_paused() {
            debug!("restored from navigation cache, resuming");
            self.start(AttemptKind::Resume, false);
        }
    }

    fn on_interaction(&mut self, interaction: &Interaction) {
        if !interaction.trusted {
            trace!("ignoring synthetic interaction");
            return;
        }

        if interaction.kind == InteractionKind::Pointer
            && !interaction.is_within_any(&self.excluded_regions)
        {
            self.play_effect();
        }

        if !self.gestured || self.exhausted || self.awaiting_gesture {
            self.unlock();
        }
    }

    fn unlock(&mut self) {
        if !self.gestured {
            self.gestured = true;
            self.gate.unlock();
            info!("audio unlocked by user gesture");
            self.emit(Event::Unlocked);
        }

        if self.exhausted {
            info!("retrying playback after user gesture");
            self.exhausted = false;
            self.failures = 0;
        }
        self.awaiting_gesture = false;

        self.engine.set_muted(false);

        if self.page.is_hidden() {
            return;
        }

        if self.engine.state() == State::Idle {
            self.boot();
            return;
        }

        self.lock.claim();
        if self.lock.is_mine() && self.engine.is_paused() && self.engine.pending().is_none() {
            self.start(AttemptKind::Resume, false);
        }
    }

    fn preempted(&mut self, preempted: Preempted) {
        if self.engine.pause() {
            info!("playback taken over by {}", preempted.by);
            self.emit(Event::Preempted);
            self.emit(Event::Pause);
        }
    }

    fn pause(&mut self) {
        if self.engine.pause() {
            self.emit(Event::Pause);
        }
    }

    fn replace_catalog(&mut self, catalog: Catalog) {
        if catalog.is_empty() {
            warn!("no track is reachable, keeping the configured catalog");
            return;
        }

        if catalog == self.catalog {
            return;
        }

        let current = self
            .engine
            .current()
            .and_then(|index| self.catalog.get(index))
            .and_then(|url| catalog.position(url));

        if catalog.len() != self.catalog.len() {
            info!(
                "catalog reduced to {} of {} tracks",
                catalog.len(),
                self.catalog.len()
            );
            self.order.reset(catalog.len());
        }

        self.engine.set_current(current);
        self.catalog = catalog;
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.send(event) {
                trace!("no event handler: {e}");
            }
        }
    }
}
