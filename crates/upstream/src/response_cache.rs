//! Short-lived memo of registry responses.

use crate::UpstreamResponse;
use moka::sync::Cache;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// How long a response is served without triggering a refresh.
pub const FRESH_FOR: Duration = Duration::from_secs(30);
/// How long a response is kept at all.
pub const STALE_AFTER: Duration = Duration::from_secs(60);
/// Bodies of this size or larger are never memoised.
pub const MAX_CACHED_BODY: usize = 1024 * 1024;
const CAPACITY_BYTES: u64 = 256 * 1024 * 1024;

/// 128-bit BLAKE3 digest of the full request URL.
pub fn url_hash(url: &str) -> u128 {
    let digest = blake3::hash(url.as_bytes());
    let mut prefix = [0u8; 16];
    prefix.copy_from_slice(&digest.as_bytes()[..16]);
    u128::from_le_bytes(prefix)
}

#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) response: UpstreamResponse,
    fetched_at: Instant,
}

impl Entry {
    pub(crate) fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= FRESH_FOR
    }
}

pub(crate) struct ResponseCache {
    entries: Cache<u128, Arc<Entry>>,
    refreshing: Mutex<HashSet<u128>>,
}

impl ResponseCache {
    pub(crate) fn new() -> Self {
        let entries = Cache::builder()
            .time_to_live(STALE_AFTER)
            .weigher(|_, entry: &Arc<Entry>| u32::try_from(entry.response.body.len()).unwrap_or(u32::MAX))
            .max_capacity(CAPACITY_BYTES)
            .build();
        Self {
            entries,
            refreshing: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn get(&self, key: u128) -> Option<Arc<Entry>> {
        self.entries.get(&key)
    }

    /// Memoise `response` unless its body is too large. Returns whether it was stored.
    pub(crate) fn insert(&self, key: u128, response: &UpstreamResponse) -> bool {
        if response.body.len() >= MAX_CACHED_BODY {
            return false;
        }
        let entry = Entry {
            response: response.clone(),
            fetched_at: Instant::now(),
        };
        self.entries.insert(key, Arc::new(entry));
        true
    }

    /// Claim the right to refresh `key`. Only one claim per key is held at a time.
    pub(crate) fn claim_refresh(&self, key: u128) -> bool {
        self.lock_refreshing().insert(key)
    }

    pub(crate) fn release_refresh(&self, key: u128) {
        self.lock_refreshing().remove(&key);
    }

    fn lock_refreshing(&self) -> std::sync::MutexGuard<'_, HashSet<u128>> {
        self.refreshing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
