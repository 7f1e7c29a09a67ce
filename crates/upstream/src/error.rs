//! Upstream Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An upstream error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for upstream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// A registry that *answers* with a non-2xx status is not an error; see
/// [`UpstreamResponse::is_success`](crate::UpstreamResponse::is_success).
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The registry could not be reached, or the response body could not be
    /// read. Never cached.
    #[display("upstream transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// The HTTP client could not be constructed.
    #[display("upstream client configuration error")]
    Client,
    /// Checksum database host is not on the allow list.
    #[display("checksum database not allowed: {_0}")]
    SumdbNotAllowed(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
