//! Error types and handling for pagevault-core operations.
//!
//! Absence of a page or session is never an error: lookups return `Ok(None)`.
//! The variants below cover failures of a [`PageStore`](crate::PageStore)
//! backend, invalid configuration, and serialization of pages or settings.
//!
//! ## Error Categories
//!
//! - **I/O Errors**: backend file or socket access
//! - **Storage Errors**: backend failures that are not plain I/O
//! - **Configuration Errors**: invalid settings or unreadable config files
//! - **Serialization Errors**: config files that fail to (de)serialize
//!
//! Store failures travel through [`PageCache`](crate::PageCache) and
//! [`SessionPageDirectory`](crate::SessionPageDirectory) untouched, so callers
//! can decide on retries with [`Error::is_recoverable`]:
//!
//! ```rust
//! use pagevault_core::Error;
//! use std::io;
//!
//! let err = Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow disk"));
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "io");
//! ```

use thiserror::Error;

/// The main error type for pagevault-core operations.
///
/// All fallible public functions return `Result<T, Error>`.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Raised by backends that persist pages on disk or over the network,
    /// and by configuration loading.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend failed.
    ///
    /// ## Common Causes
    ///
    /// - Backend rejected the write (quota, corruption)
    /// - Backend connection dropped mid-operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    ///
    /// Raised when a config file is not valid TOML or does not match
    /// [`Config`](crate::Config).
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// pagevault never retries on its own; this is a hint for the calling
    /// framework.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pagevault_core::Error;
    ///
    /// assert!(!Error::Config("max_sessions must be > 0".into()).is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            Self::Storage(_) => true,
            _ => false,
        }
    }

    /// Get the error category as a string identifier for logging.
    ///
    /// - `"io"`, `"storage"`, `"config"`, `"serialization"`
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
