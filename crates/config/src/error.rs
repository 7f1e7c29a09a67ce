//! Configuration Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories. All of them are fatal at startup.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A required setting is absent. Holds its dotted key, e.g. `storage.bucket`.
    #[display("missing required setting: {_0}")]
    Missing(#[error(not(source))] String),
    /// A setting is present but can't be used.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// An explicitly requested configuration file doesn't exist.
    #[display("configuration file not found: {_0}")]
    FileNotFound(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
