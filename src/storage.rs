//! Key/value storage seam.
//!
//! Two stores back the coordinator:
//! * a session-scoped store, private to one browsing context, holding the
//!   unlock flag and the shuffle state;
//! * an origin-scoped store, shared by every context of the origin, holding
//!   the playback lease.
//!
//! Both are string-keyed and string-valued, and both may refuse service
//! (privacy settings, quota, sandboxed frames). Callers must treat every
//! error as "value unknown" and carry on.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::error::{Error, Result};

/// A fallible string key/value store.
pub trait Storage {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be written.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Storage kept in process memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Storage that refuses every operation, as a browser does when storage is
/// disabled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct UnavailableStorage;

impl Storage for UnavailableStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Err(Error::unavailable(format!("cannot read {key}: storage disabled")))
    }

    fn set(&mut self, key: &str, _value: &str) -> Result<()> {
        Err(Error::unavailable(format!("cannot write {key}: storage disabled")))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        Err(Error::unavailable(format!("cannot remove {key}: storage disabled")))
    }
}

/// Shared handles, so that a host (or a test) can keep looking at a store
/// after handing it to the coordinator.
impl<S: Storage + ?Sized> Storage for Rc<RefCell<S>> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.borrow().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.borrow_mut().set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.borrow_mut().remove(key)
    }
}
