//! Index Synchronizer Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A synchronizer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for synchronizer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// None of these escape the background tasks; they are logged where they
/// happen and the offending entry, workload or cycle is skipped.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A change-feed line or version could not be parsed.
    #[display("unparseable index entry: {_0}")]
    Parse(#[error(not(source))] String),
    /// A module path doesn't split into a domain and a module name.
    #[display("invalid module path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// The registry could not be reached.
    #[display("upstream unavailable")]
    Upstream,
    /// The registry answered with a non-2xx status.
    #[display("upstream returned status {_0}")]
    UpstreamStatus(#[error(not(source))] u16),
    /// Reading or writing module records failed.
    #[display("module record persistence failed")]
    Database,
    /// Writing a warmed artifact to the blob store failed.
    #[display("blob storage failed")]
    Storage,
    /// Every worker has stopped; nothing will drain the queue.
    #[display("work queue closed")]
    QueueClosed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream | Self::UpstreamStatus(_) | Self::Database | Self::Storage)
    }
}
