#![allow(dead_code)]

use std::{cell::RefCell, collections::HashSet, rc::Rc, time::Duration};

use bgmsync::{
    config::Config,
    coordinator::{Coordinator, Host},
    events::Event,
    input::Input,
    media::{Media, PlayError, PlayTicket},
    origin::{Context, Subscription},
    page::Page,
    storage::{MemoryStorage, Storage},
    util::ManualClock,
};
use tokio::sync::mpsc;
use url::Url;

pub type Shared<T> = Rc<RefCell<T>>;

pub const EPOCH: u64 = 1_700_000_000_000;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config() -> Config {
    Config {
        base_url: Url::parse("https://example.com/site/page.html").unwrap(),
        tracks: vec!["bgm/a.mp3".into(), "bgm/b.mp3".into(), "/bgm/c.mp3".into()],
        effect: Some("sfx/click.mp3".into()),
        ..Config::default()
    }
}

#[derive(Debug)]
pub struct FakeMedia {
    pub id: String,
    pub source: Option<Url>,
    pub muted: bool,
    pub volume: f32,
    pub looping: bool,
    pub paused: bool,
    pub position: Duration,
    pub requests: Vec<PlayTicket>,
    pub removed: bool,
}

impl FakeMedia {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            source: None,
            muted: false,
            volume: 1.0,
            looping: true,
            paused: true,
            position: Duration::ZERO,
            requests: Vec::new(),
            removed: false,
        }
    }

    pub fn last_request(&self) -> Option<PlayTicket> {
        self.requests.last().copied()
    }
}

impl Media for FakeMedia {
    fn set_source(&mut self, url: Option<&Url>) {
        self.source = url.cloned();
        self.position = Duration::ZERO;
    }

    fn has_source(&self) -> bool {
        self.source.is_some()
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    // Like a browser element: not paused from the moment play is requested.
    fn play(&mut self, ticket: PlayTicket) {
        self.requests.push(ticket);
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn seek_to_start(&mut self) {
        self.position = Duration::ZERO;
    }

    fn position(&self) -> Duration {
        self.position
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn remove(&mut self) {
        self.removed = true;
    }
}

#[derive(Debug)]
pub struct FakePage {
    pub hidden: bool,
    pub focused: bool,
    pub elements: Vec<Shared<FakeMedia>>,
    pub markers: HashSet<String>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            hidden: false,
            focused: true,
            elements: Vec::new(),
            markers: HashSet::new(),
        }
    }
}

impl FakePage {
    pub fn with_element(mut self, id: &str) -> Self {
        self.elements.push(Rc::new(RefCell::new(FakeMedia::new(id))));
        self
    }

    /// The live element with `id`.
    pub fn media(&self, id: &str) -> Shared<FakeMedia> {
        self.elements
            .iter()
            .find(|media| media.borrow().id == id && !media.borrow().removed)
            .map(Rc::clone)
            .expect("no such element")
    }
}

impl Page for FakePage {
    fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn has_focus(&self) -> bool {
        self.focused
    }

    fn find_media(&mut self, id: &str) -> Vec<Box<dyn Media>> {
        self.elements
            .iter()
            .filter(|media| media.borrow().id == id && !media.borrow().removed)
            .map(|media| Box::new(Rc::clone(media)) as Box<dyn Media>)
            .collect()
    }

    fn create_media(&mut self, id: &str) -> Box<dyn Media> {
        let media = Rc::new(RefCell::new(FakeMedia::new(id)));
        self.elements.push(Rc::clone(&media));
        Box::new(media)
    }

    fn is_marked(&self, marker: &str) -> bool {
        self.markers.contains(marker)
    }

    fn mark(&mut self, marker: &str, alive: bool) {
        if alive {
            self.markers.insert(marker.to_owned());
        } else {
            self.markers.remove(marker);
        }
    }
}

/// The host side of one browsing context.
pub struct Fixture {
    pub config: Config,
    pub context: Context,
    pub clock: Rc<ManualClock>,
    pub page: Shared<FakePage>,
    pub session: Shared<MemoryStorage>,
}

impl Fixture {
    pub fn new(config: &Config, context: Context, clock: &Rc<ManualClock>) -> Self {
        Self {
            config: config.clone(),
            context,
            clock: Rc::clone(clock),
            page: Rc::new(RefCell::new(FakePage::default())),
            session: Rc::new(RefCell::new(MemoryStorage::new())),
        }
    }

    pub fn host(&self) -> Host {
        Host {
            page: Box::new(Rc::clone(&self.page)),
            session: Rc::clone(&self.session) as Rc<RefCell<dyn Storage>>,
            shared: Box::new(self.context.storage()),
            channel: Some(Box::new(self.context.channel(&self.config.channel))),
            clock: Box::new(Rc::clone(&self.clock)),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.context
            .subscribe(&self.config.keys.lease, &self.config.channel)
    }

    pub fn music(&self) -> Shared<FakeMedia> {
        self.page.borrow().media(&self.config.music_element)
    }

    pub fn effect(&self) -> Shared<FakeMedia> {
        self.page.borrow().media(&self.config.effect_element)
    }

    pub fn unlock_session(&self) {
        self.session
            .borrow_mut()
            .set(&self.config.keys.unlocked, "1")
            .unwrap();
    }
}

/// A running coordinator with its host.
pub struct Tab {
    pub fixture: Fixture,
    pub coordinator: Coordinator,
    pub subscription: Subscription,
    pub events: mpsc::UnboundedReceiver<Event>,
}

impl Tab {
    pub fn open(fixture: Fixture) -> Self {
        let subscription = fixture.subscribe();
        let mut coordinator = Coordinator::new(&fixture.config, fixture.host()).unwrap();
        let (tx, events) = mpsc::unbounded_channel();
        coordinator.register_event_handler(tx);

        Self {
            fixture,
            coordinator,
            subscription,
            events,
        }
    }

    pub fn handle(&mut self, input: Input) {
        self.coordinator.handle(input);
    }

    /// Reports the outcome of the latest music play request, updating the
    /// element the way a browser would.
    pub fn resolve(&mut self, result: Result<(), PlayError>) {
        let music = self.fixture.music();
        let ticket = music.borrow().last_request().expect("no play request");
        music.borrow_mut().paused = result.is_err();
        self.coordinator.handle(Input::PlayResolved { ticket, result });
    }

    /// Delivers notifications queued by other contexts.
    pub fn pump(&mut self) {
        while let Some(input) = self.subscription.try_recv() {
            self.coordinator.handle(input);
        }
    }

    pub fn events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn requests(&self) -> usize {
        self.fixture.music().borrow().requests.len()
    }

    pub fn is_audible(&self) -> bool {
        let music = self.fixture.music();
        let music = music.borrow();
        !music.paused && !music.muted
    }

    pub fn is_playing(&self) -> bool {
        !self.fixture.music().borrow().paused
    }
}
