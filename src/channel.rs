//! Pub/sub channel between browsing contexts of one origin.
//!
//! A single message type travels on the channel: a claim, announcing that
//! the sender has just written the lease and intends to play. On the wire
//! it is JSON:
//!
//! ```json
//! {"type":"CLAIM","owner":"6f2a1c9e-0d4b-4f7a-9a51-3c1f0e2b8d77"}
//! ```
//!
//! Delivery is asynchronous and never reaches the sender itself.

use serde::{Deserialize, Serialize};

use crate::{error::Result, owner::OwnerId};

/// A message on the coordination channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// `owner` has claimed the playback lease.
    Claim { owner: OwnerId },
}

impl Message {
    /// Parses a raw channel payload.
    ///
    /// Anything that is not a well-formed message is dropped with a trace
    /// log: other scripts on the origin may share the channel name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                trace!("ignoring channel payload {raw:?}: {e}");
                None
            }
        }
    }

    /// Encodes the message for the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

/// Sending half of the coordination channel.
pub trait Broadcast {
    /// Posts `message` to every other context of the origin.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel is closed or unavailable.
    fn post(&mut self, message: &Message) -> Result<()>;
}

impl<B: Broadcast> Broadcast for std::rc::Rc<std::cell::RefCell<B>> {
    fn post(&mut self, message: &Message) -> Result<()> {
        self.borrow_mut().post(message)
    }
}

/// A broadcast sink that records what it was asked to post.
#[cfg(test)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct RecordingBroadcast {
    pub posted: Vec<Message>,
}

#[cfg(test)]
impl Broadcast for RecordingBroadcast {
    fn post(&mut self, message: &Message) -> Result<()> {
        self.posted.push(message.clone());
        Ok(())
    }
}
