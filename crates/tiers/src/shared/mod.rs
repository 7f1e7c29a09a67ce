//! Shared networked tier.
//!
//! A TTL-bearing key/value store reachable by every proxy node. The only
//! production implementation is Redis (feature `redis`).

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "redis")]
mod redis;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockSharedTier;
#[cfg(feature = "redis")]
pub use self::redis::RedisTier;

#[async_trait]
pub trait SharedTier: Send + Sync {
    /// Human-readable name, used in tracing spans.
    fn name(&self) -> &str;

    /// Returns `Ok(None)` when the key is absent or has expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `value` under `key`, replacing any previous value, for `ttl`.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;
}
