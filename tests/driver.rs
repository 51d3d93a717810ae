mod common;

use std::{rc::Rc, time::Duration};

use bgmsync::{
    coordinator::Coordinator,
    driver::Driver,
    events::Event,
    input::Input,
    origin::Origin,
    util::ManualClock,
};
use common::{config, init_logger, Fixture, EPOCH};
use tokio::{sync::mpsc, time};

fn start() -> (
    Fixture,
    Driver,
    mpsc::UnboundedSender<Input>,
    mpsc::UnboundedReceiver<Event>,
) {
    init_logger();
    let origin = Origin::new();
    let clock = Rc::new(ManualClock::new(EPOCH));
    let fixture = Fixture::new(&config(), origin.context(), &clock);
    fixture.unlock_session();

    let mut coordinator = Coordinator::new(&fixture.config, fixture.host()).unwrap();
    let (event_tx, events) = mpsc::unbounded_channel();
    coordinator.register_event_handler(event_tx);

    let (inbox, rx) = mpsc::unbounded_channel();
    let driver = Driver::new(&fixture.config, coordinator, rx)
        .unwrap()
        .with_subscription(fixture.subscribe());

    (fixture, driver, inbox, events)
}

/// Confirms the latest play request, as the element would.
fn confirm(fixture: &Fixture, inbox: &mpsc::UnboundedSender<Input>) {
    let music = fixture.music();
    let ticket = music.borrow().last_request().expect("no play request");
    music.borrow_mut().paused = false;
    inbox
        .send(Input::PlayResolved {
            ticket,
            result: Ok(()),
        })
        .unwrap();
}

fn drain(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn count(events: &[Event], wanted: Event) -> usize {
    events.iter().filter(|&&event| event == wanted).count()
}

#[tokio::test(start_paused = true)]
async fn focus_lost_for_a_second_pauses_once() {
    let (fixture, driver, inbox, mut events) = start();

    let script = {
        let fixture = &fixture;
        async move {
            time::sleep(Duration::from_millis(1)).await;
            confirm(fixture, &inbox);

            fixture.page.borrow_mut().focused = false;
            inbox.send(Input::Blur).unwrap();
            time::sleep(Duration::from_secs(1)).await;

            assert!(fixture.music().borrow().paused);
            drop(inbox);
        }
    };
    tokio::join!(driver.run(), script);

    let events = drain(&mut events);
    assert_eq!(count(&events, Event::Play), 1);
    assert_eq!(count(&events, Event::Pause), 1);
}

#[tokio::test(start_paused = true)]
async fn focus_regained_quickly_keeps_playing() {
    let (fixture, driver, inbox, mut events) = start();

    let script = {
        let fixture = &fixture;
        async move {
            time::sleep(Duration::from_millis(1)).await;
            confirm(fixture, &inbox);

            fixture.page.borrow_mut().focused = false;
            inbox.send(Input::Blur).unwrap();
            time::sleep(Duration::from_millis(100)).await;

            fixture.page.borrow_mut().focused = true;
            inbox.send(Input::Focus).unwrap();
            time::sleep(Duration::from_secs(1)).await;

            assert!(!fixture.music().borrow().paused);
            drop(inbox);
        }
    };
    tokio::join!(driver.run(), script);

    assert_eq!(count(&drain(&mut events), Event::Pause), 0);
}

#[tokio::test(start_paused = true)]
async fn stuck_playback_is_skipped_once() {
    let (fixture, driver, inbox, mut events) = start();

    let script = {
        let fixture = &fixture;
        async move {
            time::sleep(Duration::from_millis(1)).await;
            confirm(fixture, &inbox);

            // Position never moves. One stall window plus most of another.
            time::sleep(Duration::from_secs(15)).await;
            drop(inbox);
        }
    };
    tokio::join!(driver.run(), script);

    let events = drain(&mut events);
    assert_eq!(count(&events, Event::Stalled), 1);
    assert_eq!(fixture.music().borrow().requests.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn closing_the_inbox_shuts_down() {
    let (fixture, driver, inbox, _events) = start();

    let script = {
        let fixture = &fixture;
        async move {
            time::sleep(Duration::from_millis(1)).await;
            confirm(fixture, &inbox);
            time::sleep(Duration::from_millis(1)).await;
            drop(inbox);
        }
    };
    tokio::join!(driver.run(), script);

    assert!(fixture.music().borrow().paused);
    assert!(!fixture
        .page
        .borrow()
        .markers
        .contains(&fixture.config.singleton_marker));
}
