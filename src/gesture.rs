//! Gesture unlock.
//!
//! Browsers only guarantee audible playback when it is started from inside
//! a trusted user gesture. Until one has happened in this session, music
//! may only run muted. The unlock flag lives in session storage so that
//! later pages of the same tab start audible right away.

use crate::storage::Storage;

/// Kind of user interaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    /// Click or tap.
    Pointer,
    Key,
}

/// A user interaction as delivered by the host.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Interaction {
    pub kind: InteractionKind,

    /// Whether the browser generated the event (as opposed to a script).
    pub trusted: bool,

    /// Selectors matching the target and its ancestors, such as `#menu` or
    /// `.goog-te-gadget`.
    pub ancestry: Vec<String>,
}

impl Interaction {
    #[must_use]
    pub fn click() -> Self {
        Self {
            kind: InteractionKind::Pointer,
            trusted: true,
            ancestry: Vec::new(),
        }
    }

    #[must_use]
    pub fn key() -> Self {
        Self {
            kind: InteractionKind::Key,
            trusted: true,
            ancestry: Vec::new(),
        }
    }

    #[must_use]
    pub fn within<S: Into<String>>(mut self, selector: S) -> Self {
        self.ancestry.push(selector.into());
        self
    }

    #[must_use]
    pub fn untrusted(mut self) -> Self {
        self.trusted = false;
        self
    }

    /// Whether the target lies inside any of `regions`.
    #[must_use]
    pub fn is_within_any(&self, regions: &[String]) -> bool {
        self.ancestry
            .iter()
            .any(|selector| regions.iter().any(|region| region == selector))
    }
}

/// Session-scoped unlock flag.
pub struct UnlockGate {
    storage: Box<dyn Storage>,
    key: String,

    /// Mirror of the flag for sessions whose storage refuses writes.
    unlocked: bool,
}

impl UnlockGate {
    const UNLOCKED: &'static str = "1";

    pub fn new(storage: Box<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            unlocked: false,
        }
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
            || self
                .storage
                .get(&self.key)
                .is_ok_and(|flag| flag.as_deref() == Some(Self::UNLOCKED))
    }

    /// Marks the session unlocked. Never cleared.
    pub fn unlock(&mut self) {
        self.unlocked = true;
        if let Err(e) = self.storage.set(&self.key, Self::UNLOCKED) {
            debug!("could not persist unlock flag: {e}");
        }
    }
}
