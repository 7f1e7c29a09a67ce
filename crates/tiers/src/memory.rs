//! Volatile in-process tier.

use bytes::Bytes;
use moka::Expiry;
use moka::sync::Cache;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Clone)]
struct Entry {
    body: Bytes,
    ttl: Duration,
}

/// Each entry lives for the TTL it was inserted with, regardless of reads.
struct InsertedTtl;

impl Expiry<String, Entry> for InsertedTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// String-keyed, size-bounded, in-process cache with per-entry TTLs.
///
/// Safe to share between tasks; clones share the same storage. Expiry is
/// time based only, so a hot entry still disappears when its TTL elapses.
#[derive(Clone)]
pub struct MemoryTier {
    entries: Cache<String, Entry>,
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY_BYTES)
    }
}

impl MemoryTier {
    /// A tier holding at most `capacity_bytes` of payload.
    pub fn with_capacity(capacity_bytes: u64) -> Self {
        let entries = Cache::builder()
            .weigher(|_, entry: &Entry| u32::try_from(entry.body.len()).unwrap_or(u32::MAX))
            .max_capacity(capacity_bytes)
            .expire_after(InsertedTtl)
            .build();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|entry| entry.body)
    }

    pub fn insert(&self, key: impl Into<String>, body: Bytes, ttl: Duration) {
        self.entries.insert(key.into(), Entry { body, ttl });
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_get() {
        let tier = MemoryTier::default();
        tier.insert("k", Bytes::from_static(b"v1.0.0\n"), Duration::from_secs(30));
        assert_eq!(tier.get("k").unwrap(), "v1.0.0\n");
        assert!(tier.get("other").is_none());
    }

    #[test]
    fn test_entry_is_absent_after_ttl() {
        let tier = MemoryTier::default();
        tier.insert("short", Bytes::from_static(b"a"), Duration::from_millis(50));
        tier.insert("long", Bytes::from_static(b"b"), Duration::from_secs(60));
        assert!(tier.contains("short"));
        std::thread::sleep(Duration::from_millis(120));
        assert!(tier.get("short").is_none());
        assert_eq!(tier.get("long").unwrap(), "b");
    }

    #[test]
    fn test_reinsert_resets_ttl() {
        let tier = MemoryTier::default();
        tier.insert("k", Bytes::from_static(b"old"), Duration::from_millis(50));
        tier.insert("k", Bytes::from_static(b"new"), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(tier.get("k").unwrap(), "new");
    }

    #[test]
    fn test_clones_share_storage() {
        let tier = MemoryTier::default();
        let clone = tier.clone();
        clone.insert("k", Bytes::from_static(b"shared"), Duration::from_secs(5));
        assert_eq!(tier.get("k").unwrap(), "shared");
    }
}
