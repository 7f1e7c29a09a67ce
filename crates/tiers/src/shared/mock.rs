//! In-memory shared tier for testing.

use super::SharedTier;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory shared tier for testing.
///
/// Expiry follows the Tokio clock, so tests running with a paused clock can
/// step past a TTL with `tokio::time::advance`.
#[derive(Default)]
pub struct MockSharedTier {
    entries: RwLock<HashMap<String, (Bytes, Instant)>>,
    unreachable: bool,
    sets: AtomicUsize,
}

impl MockSharedTier {
    /// A tier whose every call fails.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Whether a live entry exists for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        matches!(self.get(key).await, Ok(Some(_)))
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|(_, expires)| *expires > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of successful `set` calls so far.
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        match self.unreachable {
            true => exn::bail!(ErrorKind::Shared("mock shared tier is unreachable".to_string())),
            false => Ok(()),
        }
    }
}

#[async_trait]
impl SharedTier for MockSharedTier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_reachable()?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.check_reachable()?;
        let expires = Instant::now() + ttl;
        self.entries.write().await.insert(key.to_string(), (value, expires));
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
