//! Lease owner identity.
//!
//! Every browsing context generates one [`OwnerId`] at construction and
//! uses it for every lease it writes and every claim it broadcasts. It is
//! opaque to other contexts: they only compare it for equality.
//!
//! # Example
//! ```
//! use bgmsync::owner::OwnerId;
//!
//! let id = OwnerId::generate();
//! let parsed: OwnerId = id.to_string().parse().unwrap();
//! assert_eq!(id, parsed);
//! ```

use std::{fmt, ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Session-unique token identifying one browsing context.
///
/// Serialized as the hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(uuid::Uuid);

impl Deref for OwnerId {
    type Target = uuid::Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl OwnerId {
    /// Generates a new random owner id using a fast random number generator.
    ///
    /// Uniqueness among the handful of tabs of one origin is all that is
    /// needed here, so `fastrand` is used instead of a cryptographically
    /// secure generator.
    #[must_use]
    pub fn generate() -> Self {
        let random_bytes = fastrand::u128(..).to_ne_bytes();
        let uuid = uuid::Builder::from_random_bytes(random_bytes).into_uuid();
        Self(uuid)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(Self).map_err(Into::into)
    }
}

impl From<OwnerId> for uuid::Uuid {
    fn from(value: OwnerId) -> Self {
        *value
    }
}
