//! Cross-context playback lock.
//!
//! An advisory lease over origin-scoped storage: whoever wants to play
//! writes `{owner, t}` to the lease key and announces a claim on the
//! channel. Every other context that hears the claim, or sees the lease
//! change hands in storage, pauses.
//!
//! There is no consensus here. Two contexts claiming at the same moment
//! both write (last writer wins) and both broadcast; each then pauses on
//! the other's announcement or on the storage change, and the next claim
//! settles it. That overlap lasts at most one notification round-trip.
//!
//! A lease older than the staleness window belongs to a context that is
//! gone (crashed or killed tab) and is treated as free. When the shared
//! store cannot be used at all, the lock fails open: this context plays,
//! and exclusion across tabs is simply not guaranteed.

use std::{cell::Cell, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    channel::{Broadcast, Message},
    error::{Error, Result},
    owner::OwnerId,
    storage::Storage,
    util::Clock,
};

/// The stored lease record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lease {
    pub owner: OwnerId,

    /// Acquisition time, in epoch milliseconds.
    #[serde(rename = "t")]
    pub timestamp: u64,
}

/// What the shared store says about the lease right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Holder {
    /// No lease, or a record that fails validation.
    Vacant,
    /// A lease past the staleness window.
    Stale(Lease),
    /// A live lease.
    Held(Lease),
    /// The shared store refused the read.
    Unknown,
}

/// Another context took the lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Preempted {
    pub by: OwnerId,
}

pub struct Lock {
    owner: OwnerId,
    key: String,
    stale_after: Duration,
    shared: Box<dyn Storage>,
    channel: Option<Box<dyn Broadcast>>,
    clock: Box<dyn Clock>,

    /// Set once the shared store has failed, so the warning is logged once.
    degraded: Cell<bool>,
}

impl Lock {
    pub fn new(
        owner: OwnerId,
        key: impl Into<String>,
        stale_after: Duration,
        shared: Box<dyn Storage>,
        channel: Option<Box<dyn Broadcast>>,
        clock: Box<dyn Clock>,
    ) -> Self {
        if channel.is_none() {
            warn!("no coordination channel, relying on storage notifications only");
        }

        Self {
            owner,
            key: key.into(),
            stale_after,
            shared,
            channel,
            clock,
            degraded: Cell::new(false),
        }
    }

    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Whether the shared store has failed during this session.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.get()
    }

    /// Writes a fresh lease for this context and announces it.
    pub fn claim(&mut self) {
        self.write();

        let claim = Message::Claim { owner: self.owner };
        if let Some(channel) = self.channel.as_mut() {
            if let Err(e) = channel.post(&claim) {
                debug!("could not announce claim: {e}");
            }
        }
    }

    /// Refreshes the lease timestamp without announcing, unless another
    /// context holds a live lease.
    ///
    /// A stale or vacant lease is rewritten too: a context still playing
    /// on it is alive and must not look gone to the others.
    pub fn renew(&mut self) {
        let renewable = match self.holder() {
            Holder::Held(lease) => lease.owner == self.owner,
            Holder::Stale(_) | Holder::Vacant => true,
            Holder::Unknown => false,
        };

        if renewable {
            trace!("renewing lease");
            self.write();
        }
    }

    /// Returns whether this context may play.
    ///
    /// True when the live lease is ours, when the lease is vacant or stale
    /// (its holder is gone), and when the shared store is unusable.
    #[must_use]
    pub fn is_mine(&self) -> bool {
        match self.holder() {
            Holder::Held(lease) => lease.owner == self.owner,
            Holder::Vacant | Holder::Stale(_) | Holder::Unknown => true,
        }
    }

    /// Reads and validates the current lease.
    #[must_use]
    pub fn holder(&self) -> Holder {
        let raw = match self.shared.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Holder::Vacant,
            Err(e) => {
                self.degrade(&e);
                return Holder::Unknown;
            }
        };

        let lease: Lease = match serde_json::from_str(&raw) {
            Ok(lease) => lease,
            Err(e) => {
                debug!("ignoring malformed lease {raw:?}: {e}");
                return Holder::Vacant;
            }
        };

        let age = self.clock.now_millis().saturating_sub(lease.timestamp);
        if u128::from(age) > self.stale_after.as_millis() {
            Holder::Stale(lease)
        } else {
            Holder::Held(lease)
        }
    }

    /// Handles a message from the channel.
    #[must_use]
    pub fn on_message(&self, message: &Message) -> Option<Preempted> {
        match *message {
            Message::Claim { owner } if owner != self.owner => {
                debug!("claim announced by {owner}");
                Some(Preempted { by: owner })
            }
            Message::Claim { .. } => None,
        }
    }

    /// Handles a change notification for the lease key.
    #[must_use]
    pub fn on_lease_changed(&self) -> Option<Preempted> {
        match self.holder() {
            Holder::Held(lease) if lease.owner != self.owner => {
                debug!("lease now held by {}", lease.owner);
                Some(Preempted { by: lease.owner })
            }
            _ => None,
        }
    }

    fn write(&mut self) {
        let lease = Lease {
            owner: self.owner,
            timestamp: self.clock.now_millis(),
        };

        let written = serde_json::to_string(&lease)
            .map_err(Error::from)
            .and_then(|raw| self.shared.set(&self.key, &raw));

        if let Err(e) = written {
            self.degrade(&e);
        }
    }

    fn degrade(&self, e: &Error) {
        if !self.degraded.replace(true) {
            warn!("shared storage unavailable, playing without cross-tab exclusion: {e}");
        }
    }
}

/// Reads the lease record from `storage`, for hosts and diagnostics.
///
/// # Errors
///
/// Returns an error when the store cannot be read or the record is
/// malformed.
pub fn read_lease(storage: &dyn Storage, key: &str) -> Result<Option<Lease>> {
    storage
        .get(key)?
        .map(|raw| serde_json::from_str(&raw).map_err(Into::into))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        channel::RecordingBroadcast,
        storage::{MemoryStorage, UnavailableStorage},
        util::ManualClock,
    };

    const KEY: &str = "lock";
    const STALE: Duration = Duration::from_secs(15);

    struct Rig {
        shared: Rc<RefCell<MemoryStorage>>,
        clock: Rc<ManualClock>,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                shared: Rc::new(RefCell::new(MemoryStorage::new())),
                clock: Rc::new(ManualClock::new(1_700_000_000_000)),
            }
        }

        fn lock(&self) -> (Lock, Rc<RefCell<RecordingBroadcast>>) {
            let channel = Rc::new(RefCell::new(RecordingBroadcast::default()));
            let lock = Lock::new(
                OwnerId::generate(),
                KEY,
                STALE,
                Box::new(Rc::clone(&self.shared)),
                Some(Box::new(Rc::clone(&channel))),
                Box::new(Rc::clone(&self.clock)),
            );
            (lock, channel)
        }
    }

    #[test]
    fn claim_writes_and_announces() {
        let rig = Rig::new();
        let (mut lock, channel) = rig.lock();
        lock.claim();

        let lease = read_lease(&*rig.shared.borrow(), KEY).unwrap().unwrap();
        assert_eq!(lease.owner, lock.owner());
        assert_eq!(lease.timestamp, 1_700_000_000_000);
        assert_eq!(
            channel.borrow().posted,
            [Message::Claim { owner: lock.owner() }]
        );
        assert!(lock.is_mine());
    }

    #[test]
    fn last_claim_wins() {
        let rig = Rig::new();
        let (mut a, _) = rig.lock();
        let (mut b, _) = rig.lock();

        a.claim();
        b.claim();
        assert!(!a.is_mine());
        assert!(b.is_mine());
        assert_eq!(a.on_lease_changed(), Some(Preempted { by: b.owner() }));
        assert_eq!(b.on_lease_changed(), None);
    }

    #[test]
    fn foreign_claim_preempts_own_does_not() {
        let rig = Rig::new();
        let (a, _) = rig.lock();
        let other = OwnerId::generate();

        assert_eq!(
            a.on_message(&Message::Claim { owner: other }),
            Some(Preempted { by: other })
        );
        assert_eq!(a.on_message(&Message::Claim { owner: a.owner() }), None);
    }

    #[test]
    fn stale_lease_is_free() {
        let rig = Rig::new();
        let (mut crashed, _) = rig.lock();
        let (fresh, _) = rig.lock();

        crashed.claim();
        assert!(!fresh.is_mine());

        rig.clock.advance(STALE + Duration::from_millis(1));
        assert!(matches!(fresh.holder(), Holder::Stale(_)));
        assert!(fresh.is_mine());
        assert_eq!(fresh.on_lease_changed(), None);
    }

    #[test]
    fn lease_at_exactly_the_window_is_live() {
        let rig = Rig::new();
        let (mut a, _) = rig.lock();
        let (b, _) = rig.lock();
        a.claim();
        rig.clock.advance(STALE);
        assert!(!b.is_mine());
    }

    #[test]
    fn renew_leaves_a_foreign_live_lease() {
        let rig = Rig::new();
        let (mut a, _) = rig.lock();
        let (mut b, channel_b) = rig.lock();

        a.claim();
        rig.clock.advance(Duration::from_secs(10));
        a.renew();
        rig.clock.advance(Duration::from_secs(10));
        assert!(!b.is_mine(), "renewed lease must still be live");

        b.renew();
        assert!(channel_b.borrow().posted.is_empty());
        assert_eq!(
            read_lease(&*rig.shared.borrow(), KEY).unwrap().unwrap().owner,
            a.owner()
        );
    }

    #[test]
    fn renew_revives_own_stale_lease() {
        let rig = Rig::new();
        let (mut a, channel_a) = rig.lock();
        let (b, _) = rig.lock();

        a.claim();
        rig.clock.advance(STALE * 2);
        assert!(b.is_mine());

        a.renew();
        assert!(!b.is_mine());
        assert_eq!(channel_a.borrow().posted.len(), 1, "renewal is silent");
        let lease = read_lease(&*rig.shared.borrow(), KEY).unwrap().unwrap();
        assert_eq!(lease.owner, a.owner());
        assert_eq!(lease.timestamp, rig.clock.now_millis());
    }

    #[test]
    fn renew_writes_a_vacant_lease() {
        let rig = Rig::new();
        let (mut a, _) = rig.lock();
        a.renew();
        assert_eq!(
            read_lease(&*rig.shared.borrow(), KEY).unwrap().unwrap().owner,
            a.owner()
        );
    }

    #[test]
    fn malformed_lease_is_vacant() {
        let rig = Rig::new();
        let (lock, _) = rig.lock();
        for raw in ["garbage", "{}", r#"{"owner":"x","t":1}"#, r#"{"owner":null,"t":1}"#] {
            rig.shared.borrow_mut().set(KEY, raw).unwrap();
            assert_eq!(lock.holder(), Holder::Vacant, "{raw}");
            assert!(lock.is_mine());
        }
    }

    #[test]
    fn unavailable_storage_fails_open() {
        let mut lock = Lock::new(
            OwnerId::generate(),
            KEY,
            STALE,
            Box::new(UnavailableStorage),
            None,
            Box::new(ManualClock::new(0)),
        );

        lock.claim();
        assert!(lock.is_degraded());
        assert!(lock.is_mine());
        assert_eq!(lock.on_lease_changed(), None);
    }
}
