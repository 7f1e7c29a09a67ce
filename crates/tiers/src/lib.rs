//! The tiered cache in front of the module registry.
//!
//! Lookups cascade from the fastest tier to the most authoritative one:
//!
//! 1. [`MemoryTier`], in-process and short lived;
//! 2. a [`SharedTier`] (Redis) that every proxy node reads and writes;
//! 3. the checksum-verified [`BlobStore`](modproxy_storage::BlobStore);
//! 4. the registry itself, via a caller-supplied fetch.
//!
//! [`TierCache`] owns the cascade and its write-back rules.

pub mod error;
mod memory;
mod shared;
mod tier_cache;

pub use crate::memory::MemoryTier;
#[cfg(any(test, feature = "mock"))]
pub use crate::shared::MockSharedTier;
#[cfg(feature = "redis")]
pub use crate::shared::RedisTier;
pub use crate::shared::SharedTier;
pub use crate::tier_cache::{Lookup, Resolution, Source, TierCache, TierCacheBuilder};
use std::sync::Arc;

pub type SharedHandle = Arc<dyn SharedTier + Send + Sync>;
