//! Error handling for bgmsync.
//!
//! Provides a unified error type based on gRPC status codes, with mapping
//! from the underlying host, storage and network errors to categories.
//!
//! Errors rarely leave this crate. Host seams ([`Storage`], [`Broadcast`])
//! return them so that the coordinator can log them and degrade: "try the
//! next track" or "stay silent until the next gesture". Only construction
//! and configuration loading hand errors to the caller.
//!
//! # Example
//!
//! ```rust
//! use bgmsync::error::{Error, ErrorKind, Result};
//!
//! fn read_order(raw: Option<&str>) -> Result<String> {
//!     let raw = raw.ok_or_else(|| Error::not_found("no stored order"))?;
//!     Ok(raw.to_owned())
//! }
//! ```
//!
//! [`Storage`]: crate::storage::Storage
//! [`Broadcast`]: crate::channel::Broadcast

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for bgmsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// Unknown error.
    #[error("unknown error")]
    Unknown = 2,

    /// The caller specified an invalid argument, such as a malformed
    /// configuration file or a catalog path that cannot be resolved.
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// A time-bound operation did not complete in time.
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// Some requested entity was not found.
    #[error("not found")]
    NotFound = 5,

    /// The entity that a client attempted to create already exists, such
    /// as a second coordinator on the same page.
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// Internal invariant broken.
    #[error("internal error")]
    Internal = 13,

    /// The resource is currently unavailable, such as storage disabled by
    /// privacy settings.
    #[error("service unavailable")]
    Unavailable = 14,

    /// Unrecoverable data loss or corruption, such as a malformed persisted
    /// record.
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::NotFound, "lease not found");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for duplicate resource creation attempts.
    pub fn already_exists<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::AlreadyExists, error)
    }

    /// Creates an error for data corruption or loss.
    ///
    /// Use when a persisted record fails structural validation.
    pub fn data_loss<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataLoss, error)
    }

    /// Creates an error for operations that exceeded their deadline.
    pub fn deadline_exceeded<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeadlineExceeded, error)
    }

    /// Creates an error for internal errors.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Creates an error for invalid arguments.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::invalid_argument("catalog path is not a valid URL");
    /// assert_eq!(err.kind, ErrorKind::InvalidArgument);
    /// ```
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for resources that could not be found.
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates an error for unavailable resources.
    ///
    /// Storage rejected by the browser's privacy settings maps here.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::unavailable("local storage is disabled");
    /// assert_eq!(err.kind, ErrorKind::Unavailable);
    /// ```
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error for unknown errors.
    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display, showing both kind and details.
///
/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts HTTP client errors into appropriate error kinds.
///
/// * Timeout errors -> `DeadlineExceeded`
/// * Connect errors -> `Unavailable`
/// * Builder errors -> `Internal`
/// * Others -> `Unknown`
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        if err.is_connect() {
            return Self::unavailable(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        Self::unknown(err)
    }
}

/// Converts JSON errors: malformed persisted records are data loss.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::data_loss(err)
    }
}

/// Converts configuration parsing errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e)
    }
}

/// Converts URL parsing errors to `InvalidArgument`.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts timeout errors to `DeadlineExceeded`.
impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e.to_string())
    }
}

/// Converts UUID errors to `InvalidArgument`.
impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts mutex poisoning errors to `Internal`.
impl<T> From<std::sync::PoisonError<std::sync::MutexGuard<'_, T>>> for Error {
    fn from(e: std::sync::PoisonError<std::sync::MutexGuard<'_, T>>) -> Self {
        Self::internal(e.to_string())
    }
}
