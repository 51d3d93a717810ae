//! In-process origin.
//!
//! Browsers give every context of an origin a shared key/value store with
//! change notifications, and named broadcast channels. [`Origin`] provides
//! the same two facilities inside one process, so that several coordinators
//! can run side by side: in tests, or in hosts that multiplex pages
//! themselves.
//!
//! Notifications follow browser semantics: a storage change is reported to
//! every context except the one that made it, and a channel message reaches
//! every context except its sender.
//!
//! # Example
//!
//! ```rust
//! use bgmsync::origin::Origin;
//!
//! let origin = Origin::new();
//! let tab_a = origin.context();
//! let tab_b = origin.context();
//!
//! let mut events_b = tab_b.subscribe("bgm_audio_lock", "bgm_audio_channel");
//! ```

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    channel::{Broadcast, Message},
    error::Result,
    input::Input,
    storage::Storage,
};

/// Capacity of each notification queue. Receivers that fall further behind
/// than this skip ahead and log a warning.
const NOTIFICATION_CAPACITY: usize = 64;

/// Identifies a context within its origin.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

#[derive(Clone, Debug)]
struct StorageChange {
    key: String,
    source: ContextId,
}

#[derive(Clone, Debug)]
struct Envelope {
    channel: String,
    payload: String,
    source: ContextId,
}

#[derive(Clone, Debug)]
pub struct Origin {
    entries: Arc<Mutex<HashMap<String, String>>>,
    changes: broadcast::Sender<StorageChange>,
    messages: broadcast::Sender<Envelope>,
    next_id: Arc<AtomicU64>,
}

impl Default for Origin {
    fn default() -> Self {
        Self::new()
    }
}

impl Origin {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (messages, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            changes,
            messages,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Opens a new browsing context in this origin.
    #[must_use]
    pub fn context(&self) -> Context {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Context {
            id,
            origin: self.clone(),
        }
    }

    /// Reads a key directly, bypassing any context.
    ///
    /// # Errors
    ///
    /// Returns an error if the store's lock is poisoned.
    pub fn peek(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock()?.get(key).cloned())
    }
}

/// One browsing context of an [`Origin`].
#[derive(Clone, Debug)]
pub struct Context {
    id: ContextId,
    origin: Origin,
}

impl Context {
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// This context's handle on the origin's shared storage.
    #[must_use]
    pub fn storage(&self) -> OriginStorage {
        OriginStorage {
            context: self.clone(),
        }
    }

    /// This context's sending half of the channel called `name`.
    #[must_use]
    pub fn channel(&self, name: impl Into<String>) -> OriginChannel {
        OriginChannel {
            context: self.clone(),
            name: name.into(),
        }
    }

    /// Subscribes to what other contexts do: writes to `lease_key`, and
    /// messages on the channel called `channel`.
    #[must_use]
    pub fn subscribe(
        &self,
        lease_key: impl Into<String>,
        channel: impl Into<String>,
    ) -> Subscription {
        Subscription {
            id: self.id,
            lease_key: lease_key.into(),
            channel: channel.into(),
            changes: self.origin.changes.subscribe(),
            messages: self.origin.messages.subscribe(),
        }
    }
}

/// Shared storage as seen from one context.
#[derive(Clone, Debug)]
pub struct OriginStorage {
    context: Context,
}

impl OriginStorage {
    fn notify(&self, key: &str) {
        // No receivers is not an error: nobody else is listening yet.
        let _ = self.context.origin.changes.send(StorageChange {
            key: key.to_owned(),
            source: self.context.id,
        });
    }
}

impl Storage for OriginStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.context.origin.peek(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let changed = {
            let mut entries = self.context.origin.entries.lock()?;
            entries.insert(key.to_owned(), value.to_owned()).as_deref() != Some(value)
        };

        if changed {
            self.notify(key);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let removed = self.context.origin.entries.lock()?.remove(key).is_some();
        if removed {
            self.notify(key);
        }
        Ok(())
    }
}

/// Sending half of a named channel, as seen from one context.
#[derive(Clone, Debug)]
pub struct OriginChannel {
    context: Context,
    name: String,
}

impl Broadcast for OriginChannel {
    fn post(&mut self, message: &Message) -> Result<()> {
        let payload = message.encode()?;
        let _ = self.context.origin.messages.send(Envelope {
            channel: self.name.clone(),
            payload,
            source: self.context.id,
        });
        Ok(())
    }
}

/// Notifications for one context, translated into coordinator inputs.
#[derive(Debug)]
pub struct Subscription {
    id: ContextId,
    lease_key: String,
    channel: String,
    changes: broadcast::Receiver<StorageChange>,
    messages: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Waits for the next notification relevant to this context.
    ///
    /// Returns `None` once the origin is gone.
    pub async fn recv(&mut self) -> Option<Input> {
        loop {
            tokio::select! {
                change = self.changes.recv() => match change {
                    Ok(change) => {
                        if change.source != self.id && change.key == self.lease_key {
                            return Some(Input::LeaseChanged);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("missed {skipped} storage notifications");
                        // The lease may have moved in what was missed.
                        return Some(Input::LeaseChanged);
                    }
                    Err(RecvError::Closed) => return None,
                },

                envelope = self.messages.recv() => match envelope {
                    Ok(envelope) => {
                        if envelope.source != self.id && envelope.channel == self.channel {
                            if let Some(message) = Message::parse(&envelope.payload) {
                                return Some(Input::Message(message));
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("missed {skipped} channel messages");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Returns a notification that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Input> {
        use broadcast::error::TryRecvError;

        loop {
            match self.changes.try_recv() {
                Ok(change) if change.source != self.id && change.key == self.lease_key => {
                    return Some(Input::LeaseChanged);
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("missed {skipped} storage notifications");
                    return Some(Input::LeaseChanged);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        loop {
            match self.messages.try_recv() {
                Ok(envelope) if envelope.source != self.id && envelope.channel == self.channel => {
                    if let Some(message) = Message::parse(&envelope.payload) {
                        return Some(Input::Message(message));
                    }
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("missed {skipped} channel messages");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
