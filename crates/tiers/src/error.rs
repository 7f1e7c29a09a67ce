//! Tier Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A tier error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for tier operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Only [`Upstream`](Self::Upstream) ever reaches a caller of
/// [`TierCache::resolve`](crate::TierCache::resolve); failures of the cache
/// tiers themselves are logged and treated as misses.
#[derive(Debug, Clone, Display, Error)]
pub enum ErrorKind {
    /// The shared tier could not be reached at startup.
    #[display("shared tier unreachable")]
    Connection,
    /// A shared tier read or write failed.
    #[display("shared tier operation failed: {_0}")]
    Shared(#[error(not(source))] String),
    /// The registry could not be reached.
    #[display("upstream unavailable: {_0}")]
    Upstream(#[error(not(source))] String),
    /// The task resolving a key panicked or was aborted.
    #[display("lookup aborted")]
    Aborted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::Shared(_) | Self::Upstream(_) | Self::Aborted)
    }
}
