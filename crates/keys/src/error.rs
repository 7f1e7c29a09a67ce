//! Key Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A key derivation error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for key derivation.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every variant means the request that produced the input is malformed;
/// none of them are worth retrying.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Module path could not be split into a coordinate.
    #[display("invalid module path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Version string is empty or would escape its storage prefix.
    #[display("invalid version: {_0}")]
    InvalidVersion(#[error(not(source))] String),
    /// Case-escaping of a module path is malformed.
    #[display("invalid case escaping: {_0}")]
    InvalidEscape(#[error(not(source))] String),
    /// Versioned artifact requested without a version (or vice versa).
    #[display("artifact kind {_0} does not match version presence")]
    KindMismatch(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
