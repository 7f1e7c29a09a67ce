//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object does not exist
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Object exists but carries no integrity tag
    #[display("checksum missing: {_0}")]
    ChecksumMissing(#[error(not(source))] String),
    /// Stored integrity tag does not match the payload
    #[display("checksum mismatch: {_0}")]
    ChecksumMismatch(#[error(not(source))] String),
    /// Fewer (or more) bytes were read than the object declares
    #[display("short read: {key} (expected {expected} bytes, read {read})")]
    ShortRead { key: String, expected: u64, read: u64 },
    /// Key contains invalid segments or would escape its prefix
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// Backing service could not be reached (fatal at startup)
    #[display("connection error: {_0}")]
    Connection(#[error(not(source))] String),
    /// Network-related error during a request
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::BackendError(_) | Self::ShortRead { .. })
    }

    /// Integrity failures mean the stored copy can't be trusted, and the
    /// caller should fall through to a more authoritative source.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::ChecksumMissing(_) | Self::ChecksumMismatch(_) | Self::ShortRead { .. })
    }
}
