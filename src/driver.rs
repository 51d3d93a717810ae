//! Async driver for a coordinator.
//!
//! The [`Coordinator`] itself is a plain state machine. The driver owns one
//! and supplies everything time-based: the watchdog tick, the blur debounce
//! deadline, and optional track validation in the background. Host inputs
//! arrive over an unbounded channel; when every sender is dropped the driver
//! shuts the coordinator down and returns.
//!
//! Coordinators hold host handles that are not `Send`, so the driver runs on
//! the task that calls [`Driver::run`] rather than being spawned.

use std::future;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    catalog::Catalog,
    config::{Config, Validation},
    coordinator::Coordinator,
    error::Result,
    http,
    input::Input,
    origin::Subscription,
};

pub struct Driver {
    coordinator: Coordinator,
    inbox: mpsc::UnboundedReceiver<Input>,
    subscription: Option<Subscription>,

    watchdog_tick: std::time::Duration,
    validation: Validation,
    http_client: Option<http::Client>,
    validation_task: Option<JoinHandle<Catalog>>,
    validation_started: bool,
}

impl Driver {
    /// Creates a driver for `coordinator`, fed from `inbox`.
    ///
    /// # Errors
    ///
    /// Returns an error if track validation is enabled and the HTTP client
    /// cannot be built.
    pub fn new(
        config: &Config,
        coordinator: Coordinator,
        inbox: mpsc::UnboundedReceiver<Input>,
    ) -> Result<Self> {
        let http_client = if config.validation.enabled {
            Some(http::Client::new(config.validation.timeout)?)
        } else {
            None
        };

        Ok(Self {
            coordinator,
            inbox,
            subscription: None,
            watchdog_tick: config.watchdog_tick,
            validation: config.validation.clone(),
            http_client,
            validation_task: None,
            validation_started: false,
        })
    }

    /// Also listens to the origin's storage and channel notifications.
    #[must_use]
    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscription = Some(subscription);
        self
    }

    #[must_use]
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Boots the coordinator and runs it until the inbox closes.
    pub async fn run(mut self) {
        self.coordinator.handle(Input::Boot);

        let mut watchdog = time::interval_at(Instant::now() + self.watchdog_tick, self.watchdog_tick);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let blur_deadline = self.coordinator.blur_deadline();

            tokio::select! {
                // Host inputs first, so that a focus event beats a blur
                // deadline that elapses in the same instant.
                biased;

                input = self.inbox.recv() => match input {
                    Some(input) => {
                        self.maybe_validate(&input);
                        self.coordinator.handle(input);
                    }
                    None => break,
                },

                Some(input) = next_notification(self.subscription.as_mut()) => {
                    self.coordinator.handle(input);
                }

                () = time::sleep_until(blur_deadline.unwrap_or_else(Instant::now)), if blur_deadline.is_some() => {
                    self.coordinator.handle(Input::BlurTimeout);
                }

                _ = watchdog.tick() => self.coordinator.handle(Input::WatchdogTick),

                Some(catalog) = join_validation(&mut self.validation_task) => {
                    self.coordinator.handle(Input::CatalogValidated(catalog));
                }
            }
        }

        if let Some(task) = self.validation_task.take() {
            task.abort();
        }

        debug!("inbox closed, shutting down");
        self.coordinator.shutdown();
    }

    /// Starts track validation on the first trusted interaction, when
    /// network activity is acceptable.
    fn maybe_validate(&mut self, input: &Input) {
        let Input::Interaction(interaction) = input else {
            return;
        };

        if !interaction.trusted || self.validation_started {
            return;
        }

        let Some(client) = self.http_client.clone() else {
            return;
        };

        self.validation_started = true;
        let catalog = self.coordinator.catalog().clone();
        let concurrency = self.validation.concurrency;

        debug!("validating {} tracks", catalog.len());
        self.validation_task = Some(tokio::spawn(async move {
            catalog.validate(&client, concurrency).await
        }));
    }
}

async fn next_notification(subscription: Option<&mut Subscription>) -> Option<Input> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => future::pending().await,
    }
}

async fn join_validation(task: &mut Option<JoinHandle<Catalog>>) -> Option<Catalog> {
    let result = match task {
        Some(handle) => handle.await,
        None => return future::pending().await,
    };
    *task = None;

    match result {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            error!("track validation failed: {e}");
            None
        }
    }
}
