//! Object store trait and implementations.
//!
//! This module defines the `ObjectStore` trait, which provides a unified
//! interface for the raw object operations the [`BlobStore`](crate::BlobStore)
//! builds on (S3-compatible services, an in-memory map for tests).

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
use crate::Object;
use crate::error::Result;
use async_trait::async_trait;

/// Unified interface for object storage backends.
///
/// Backends move bytes and metadata around and nothing else: they do not
/// compute or verify checksums. All keys must be validated using
/// [`validate_key`](crate::validate_key) before use, and implementations
/// should enforce this.
///
/// # Examples
///
/// ```
/// use modproxy_storage::{ObjectStore, error::Result};
///
/// async fn copy(store: &dyn ObjectStore, from: &str, to: &str) -> Result<()> {
///     let object = store.get(from).await?;
///     store.put(to, object).await
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// Create the backing bucket/container if it does not already exist.
    ///
    /// Returns [`Connection`](crate::error::ErrorKind::Connection) if the
    /// service is unreachable or refuses the create for any reason other
    /// than "already exists".
    async fn ensure_bucket(&self) -> Result<()>;

    /// Write an object, overwriting any existing object at `key`.
    async fn put(&self, key: &str, object: Object) -> Result<()>;

    /// Read an object and its metadata.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn get(&self, key: &str) -> Result<Object>;

    /// Delete an object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist and the backend can tell (S3 cannot: deleting a missing
    /// key succeeds).
    async fn delete(&self, key: &str) -> Result<()>;
}
