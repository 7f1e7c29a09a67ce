//! The cascading lookup across every tier.

use crate::SharedHandle;
use crate::error::{ErrorKind, Result};
use crate::memory::MemoryTier;
use bytes::Bytes;
use derive_more::Display;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use modproxy_db::{ModuleRepository, Recorded};
use modproxy_keys::{ArtifactKind, CacheKey};
use modproxy_storage::BlobStore;
use modproxy_upstream::UpstreamResponse;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::instrument;

const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(30);

/// The tier a served body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Source {
    #[display("memory")]
    Memory,
    #[display("cache")]
    Shared,
    #[display("blob")]
    Blob,
    #[display("upstream")]
    Upstream,
}

impl Source {
    /// `false` only for bodies fetched from the registry during this lookup.
    pub fn is_cached(self) -> bool {
        !matches!(self, Self::Upstream)
    }
}

/// Outcome of [`TierCache::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A body to serve with a success status.
    Served { body: Bytes, source: Source },
    /// A non-2xx registry answer, to be relayed unchanged. Never cached here.
    Relayed(UpstreamResponse),
}

/// A single key to resolve, with the TTL its entries get in the shared tier.
#[derive(Debug, Clone)]
pub struct Lookup {
    key: CacheKey,
    ttl: Duration,
    record: Option<(String, String)>,
}

impl Lookup {
    pub fn new(key: CacheKey, ttl: Duration) -> Self {
        Self { key, ttl, record: None }
    }

    /// After a successful fetch from upstream, note `version` as a known
    /// release of the (decoded) module path.
    pub fn recording(mut self, module_path: impl Into<String>, version: impl Into<String>) -> Self {
        self.record = Some((module_path.into(), version.into()));
        self
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_durable(&self) -> bool {
        self.key.kind().is_none_or(ArtifactKind::is_durable)
    }
}

type Flight = Shared<BoxFuture<'static, std::result::Result<Resolution, ErrorKind>>>;

/// Resolves keys through memory, then the shared tier, then the blob store,
/// and finally the registry.
///
/// A hit writes back into the *faster* tiers only. A successful registry
/// fetch is written to the blob store and shared tier before it's returned,
/// and to memory as well. Concurrent misses for one key share a single
/// registry call. Cheap to clone.
#[derive(Clone)]
pub struct TierCache {
    inner: Arc<Inner>,
}

struct Inner {
    memory: MemoryTier,
    memory_ttl: Duration,
    shared: SharedHandle,
    blobs: BlobStore,
    records: Option<ModuleRepository>,
    inflight: Mutex<HashMap<String, Flight>>,
}

pub struct TierCacheBuilder {
    memory: MemoryTier,
    memory_ttl: Duration,
    shared: SharedHandle,
    blobs: BlobStore,
    records: Option<ModuleRepository>,
}

impl TierCacheBuilder {
    pub fn memory(mut self, memory: MemoryTier) -> Self {
        self.memory = memory;
        self
    }

    /// Upper bound on how long entries stay in memory. Shorter lookup TTLs win.
    pub fn memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl = ttl;
        self
    }

    pub fn records(mut self, records: ModuleRepository) -> Self {
        self.records = Some(records);
        self
    }

    pub fn build(self) -> TierCache {
        TierCache {
            inner: Arc::new(Inner {
                memory: self.memory,
                memory_ttl: self.memory_ttl,
                shared: self.shared,
                blobs: self.blobs,
                records: self.records,
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl TierCache {
    pub fn builder(shared: SharedHandle, blobs: BlobStore) -> TierCacheBuilder {
        TierCacheBuilder {
            memory: MemoryTier::default(),
            memory_ttl: DEFAULT_MEMORY_TTL,
            shared,
            blobs,
            records: None,
        }
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.inner.memory
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.inner.blobs
    }

    /// Find the body for `lookup`, calling `fetch` only if no tier has it.
    ///
    /// `fetch` is dropped unused when another task is already resolving the
    /// same key; that task's outcome is shared instead. Only a registry
    /// transport failure is an error. Every tier failure is logged and
    /// treated as a miss.
    pub async fn resolve<F, Fut>(&self, lookup: Lookup, fetch: F) -> Result<Resolution>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = modproxy_upstream::error::Result<UpstreamResponse>> + Send + 'static,
    {
        if let Some(body) = self.inner.memory.get(lookup.key.tier_key()) {
            tracing::trace!(key = lookup.key.tier_key(), "memory hit");
            return Ok(Resolution::Served {
                body,
                source: Source::Memory,
            });
        }
        self.join_or_start(lookup, fetch).await.map_err(exn::Exn::from)
    }

    fn join_or_start<F, Fut>(&self, lookup: Lookup, fetch: F) -> Flight
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = modproxy_upstream::error::Result<UpstreamResponse>> + Send + 'static,
    {
        let tier_key = lookup.key.tier_key().to_string();
        let mut inflight = self.lock_inflight();
        if let Some(flight) = inflight.get(&tier_key) {
            tracing::debug!(key = %tier_key, "joining in-flight lookup");
            return flight.clone();
        }
        // The cascade runs in its own task so it completes (and the in-flight
        // entry is cleared) even if every waiting caller goes away.
        let cache = self.clone();
        let key = tier_key.clone();
        let task = tokio::spawn(async move {
            let outcome = cache.cascade(lookup, fetch).await.map_err(|err| {
                tracing::warn!(key = %key, error = ?err, "lookup failed");
                (*err).clone()
            });
            cache.lock_inflight().remove(&key);
            outcome
        });
        let flight = async move { task.await.unwrap_or_else(|_| Err(ErrorKind::Aborted)) }
            .boxed()
            .shared();
        inflight.insert(tier_key, flight.clone());
        flight
    }

    #[instrument(skip_all, fields(key = lookup.key.tier_key()))]
    async fn cascade<F, Fut>(&self, lookup: Lookup, fetch: F) -> Result<Resolution>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = modproxy_upstream::error::Result<UpstreamResponse>> + Send + 'static,
    {
        let tier_key = lookup.key.tier_key();
        // Another flight may have filled memory between the caller's check and now.
        if let Some(body) = self.inner.memory.get(tier_key) {
            return Ok(Resolution::Served {
                body,
                source: Source::Memory,
            });
        }

        match self.inner.shared.get(tier_key).await {
            Ok(Some(body)) => {
                tracing::debug!("shared tier hit");
                self.remember(&lookup, body.clone());
                return Ok(Resolution::Served {
                    body,
                    source: Source::Shared,
                });
            },
            Ok(None) => {},
            Err(err) => tracing::warn!(tier = self.inner.shared.name(), error = ?err, "shared tier read failed"),
        }

        if lookup.is_durable() {
            match self.inner.blobs.get_key(&lookup.key).await {
                Ok(Some(body)) => {
                    tracing::debug!("blob hit");
                    self.remember(&lookup, body.clone());
                    self.write_back_shared(&lookup, body.clone());
                    return Ok(Resolution::Served {
                        body,
                        source: Source::Blob,
                    });
                },
                Ok(None) => {},
                Err(err) if err.is_integrity_failure() => {
                    tracing::warn!(path = lookup.key.path(), error = ?err, "discarding corrupt blob");
                },
                Err(err) => tracing::warn!(path = lookup.key.path(), error = ?err, "blob read failed"),
            }
        }

        let response = match fetch().await {
            Ok(response) => response,
            Err(err) => exn::bail!(ErrorKind::Upstream(err.to_string())),
        };
        if !response.is_success() {
            tracing::debug!(status = response.status, "relaying upstream failure");
            return Ok(Resolution::Relayed(response));
        }

        let body = response.body;
        if lookup.is_durable()
            && let Err(err) = self.inner.blobs.put_key(&lookup.key, body.clone()).await
        {
            tracing::error!(path = lookup.key.path(), error = ?err, "failed to store blob");
        }
        if let Err(err) = self.inner.shared.set(tier_key, body.clone(), lookup.ttl).await {
            tracing::error!(tier = self.inner.shared.name(), error = ?err, "failed to populate shared tier");
        }
        self.remember(&lookup, body.clone());
        self.record(&lookup).await;

        Ok(Resolution::Served {
            body,
            source: Source::Upstream,
        })
    }

    /// Memory writes never wait on I/O, so they happen inline.
    fn remember(&self, lookup: &Lookup, body: Bytes) {
        let ttl = lookup.ttl.min(self.inner.memory_ttl);
        self.inner.memory.insert(lookup.key.tier_key(), body, ttl);
    }

    fn write_back_shared(&self, lookup: &Lookup, body: Bytes) {
        let shared = self.inner.shared.clone();
        let key = lookup.key.tier_key().to_string();
        let ttl = lookup.ttl;
        tokio::spawn(async move {
            if let Err(err) = shared.set(&key, body, ttl).await {
                tracing::warn!(key = %key, error = ?err, "shared tier write-back failed");
            }
        });
    }

    async fn record(&self, lookup: &Lookup) {
        let (Some(records), Some((path, version))) = (&self.inner.records, &lookup.record) else {
            return;
        };
        match records.record(path, version).await {
            Ok(Recorded::Unchanged) => {},
            Ok(outcome) => tracing::debug!(path = %path, version = %version, ?outcome, "module recorded"),
            Err(err) => tracing::warn!(path = %path, version = %version, error = ?err, "failed to record module version"),
        }
    }

    fn lock_inflight(&self) -> std::sync::MutexGuard<'_, HashMap<String, Flight>> {
        self.inner.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockSharedTier;
    use crate::SharedTier;
    use futures::future::{Ready, ready};
    use modproxy_db::Database;
    use modproxy_keys::{ModuleCoordinate, encode, sumdb_key};
    use modproxy_storage::backend::MockStore;
    use modproxy_storage::error::ErrorKind as StorageErrorKind;
    use modproxy_upstream::error::ErrorKind as UpstreamErrorKind;
    use rstest::{fixture, rstest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Fetched = modproxy_upstream::error::Result<UpstreamResponse>;

    const TTL: Duration = Duration::from_secs(60);

    struct Harness {
        shared: Arc<MockSharedTier>,
        store: Arc<MockStore>,
        cache: TierCache,
        calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn respond(&self, status: u16, body: &'static str) -> impl FnOnce() -> Ready<Fetched> + Send + 'static {
            let calls = self.calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Ok(UpstreamResponse::new(status, body)))
            }
        }

        fn fail(&self) -> impl FnOnce() -> Ready<Fetched> + Send + 'static {
            let calls = self.calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Err(exn::Exn::from(UpstreamErrorKind::Transport("connection refused".to_string()))))
            }
        }

        fn slow(&self, body: &'static str) -> impl FnOnce() -> BoxFuture<'static, Fetched> + Send + 'static {
            let calls = self.calls.clone();
            move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(UpstreamResponse::new(200, body))
                }
                .boxed()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn build(shared: Arc<MockSharedTier>, records: Option<ModuleRepository>) -> Harness {
        let store = Arc::new(MockStore::default());
        let mut builder = TierCache::builder(shared.clone(), BlobStore::new(store.clone()));
        if let Some(records) = records {
            builder = builder.records(records);
        }
        Harness {
            shared,
            store,
            cache: builder.build(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[fixture]
    fn harness() -> Harness {
        build(Arc::new(MockSharedTier::default()), None)
    }

    fn coordinate() -> ModuleCoordinate {
        ModuleCoordinate::parse("github.com/user/repo").unwrap()
    }

    fn list_lookup() -> Lookup {
        Lookup::new(encode(&coordinate(), ArtifactKind::List, None).unwrap(), TTL)
    }

    fn zip_lookup(version: &str) -> Lookup {
        Lookup::new(encode(&coordinate(), ArtifactKind::Zip, Some(version)).unwrap(), TTL)
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn served(resolution: Resolution) -> (Bytes, Source) {
        match resolution {
            Resolution::Served { body, source } => (body, source),
            Resolution::Relayed(response) => panic!("expected a served body, got {response:?}"),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_miss_then_memory_hit(harness: Harness) {
        let first = harness.cache.resolve(list_lookup(), harness.respond(200, "v1.0.0\n")).await.unwrap();
        assert_eq!(served(first), (Bytes::from_static(b"v1.0.0\n"), Source::Upstream));

        let second = harness.cache.resolve(list_lookup(), harness.respond(200, "v9.9.9\n")).await.unwrap();
        assert_eq!(served(second), (Bytes::from_static(b"v1.0.0\n"), Source::Memory));
        assert_eq!(harness.calls(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_miss_writes_through_to_durable_and_shared(harness: Harness) {
        let lookup = zip_lookup("v1.0.0");
        harness.cache.resolve(lookup.clone(), harness.respond(200, "PK...")).await.unwrap();
        assert!(harness.shared.contains(lookup.key().tier_key()).await);
        assert_eq!(harness.cache.blobs().get(lookup.key().path()).await.unwrap(), "PK...");
        assert!(harness.cache.memory().contains(lookup.key().tier_key()));
    }

    #[rstest]
    #[tokio::test]
    async fn test_not_found_is_relayed_and_never_cached(harness: Harness) {
        let lookup = zip_lookup("v0.0.1");
        let resolution = harness.cache.resolve(lookup.clone(), harness.respond(404, "not found")).await.unwrap();
        assert_eq!(resolution, Resolution::Relayed(UpstreamResponse::new(404, "not found")));

        assert!(!harness.cache.memory().contains(lookup.key().tier_key()));
        assert!(harness.shared.is_empty().await);
        assert!(harness.store.is_empty().await);

        // Nothing was cached, so the registry is asked again.
        harness.cache.resolve(lookup, harness.respond(404, "not found")).await.unwrap();
        assert_eq!(harness.calls(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_transport_error_surfaces_and_is_not_cached(harness: Harness) {
        let lookup = list_lookup();
        let err = harness.cache.resolve(lookup.clone(), harness.fail()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Upstream(_)));
        assert!(harness.shared.is_empty().await);
        assert!(!harness.cache.memory().contains(lookup.key().tier_key()));
    }

    #[rstest]
    #[tokio::test]
    async fn test_shared_hit_fills_memory(harness: Harness) {
        let lookup = list_lookup();
        harness.shared.set(lookup.key().tier_key(), Bytes::from_static(b"v1.2.0\n"), TTL).await.unwrap();

        let resolution = harness.cache.resolve(lookup.clone(), harness.respond(200, "unused")).await.unwrap();
        assert_eq!(served(resolution), (Bytes::from_static(b"v1.2.0\n"), Source::Shared));
        assert!(harness.cache.memory().contains(lookup.key().tier_key()));
        assert_eq!(harness.calls(), 0);
        // Hits never write to slower tiers.
        assert!(harness.store.is_empty().await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_blob_hit_writes_back_to_faster_tiers(harness: Harness) {
        let lookup = zip_lookup("v1.0.0");
        harness.cache.blobs().put_key(lookup.key(), Bytes::from_static(b"PK...")).await.unwrap();

        let resolution = harness.cache.resolve(lookup.clone(), harness.respond(200, "unused")).await.unwrap();
        assert_eq!(served(resolution), (Bytes::from_static(b"PK..."), Source::Blob));
        assert_eq!(harness.calls(), 0);
        assert!(harness.cache.memory().contains(lookup.key().tier_key()));

        settle().await;
        assert!(harness.shared.contains(lookup.key().tier_key()).await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_corrupt_blob_is_a_miss_and_gets_replaced(harness: Harness) {
        let lookup = zip_lookup("v1.0.0");
        harness.cache.blobs().put_key(lookup.key(), Bytes::from_static(b"PK...")).await.unwrap();
        harness
            .store
            .tamper(lookup.key().path(), |object| object.data = Bytes::from_static(b"PK!!!"))
            .await;
        let err = harness.cache.blobs().get(lookup.key().path()).await.unwrap_err();
        assert!(matches!(&*err, StorageErrorKind::ChecksumMismatch(_)));

        let resolution = harness.cache.resolve(lookup.clone(), harness.respond(200, "PK...")).await.unwrap();
        assert_eq!(served(resolution), (Bytes::from_static(b"PK..."), Source::Upstream));
        assert_eq!(harness.calls(), 1);
        assert_eq!(harness.cache.blobs().get(lookup.key().path()).await.unwrap(), "PK...");
    }

    #[rstest]
    #[tokio::test]
    async fn test_latest_skips_durable_tier(harness: Harness) {
        let lookup = Lookup::new(encode(&coordinate(), ArtifactKind::Latest, None).unwrap(), TTL);
        harness
            .cache
            .resolve(lookup.clone(), harness.respond(200, r#"{"Version":"v1.0.0"}"#))
            .await
            .unwrap();
        assert!(harness.store.is_empty().await);
        assert!(harness.shared.contains(lookup.key().tier_key()).await);
    }

    #[rstest]
    #[tokio::test]
    async fn test_sumdb_entries_are_durable(harness: Harness) {
        let lookup = Lookup::new(sumdb_key("sum.golang.org", "lookup/github.com/user/repo@v1.0.0"), TTL);
        harness.cache.resolve(lookup.clone(), harness.respond(200, "checksums")).await.unwrap();
        assert_eq!(harness.cache.blobs().get(lookup.key().path()).await.unwrap(), "checksums");
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_fetch(harness: Harness) {
        let (first, second, third) = tokio::join!(
            harness.cache.resolve(zip_lookup("v1.0.0"), harness.slow("PK...")),
            harness.cache.resolve(zip_lookup("v1.0.0"), harness.slow("PK...")),
            harness.cache.resolve(zip_lookup("v1.0.0"), harness.slow("PK...")),
        );
        assert_eq!(harness.calls(), 1);
        for resolution in [first, second, third] {
            assert_eq!(served(resolution.unwrap()).0, "PK...");
        }
        assert!(harness.cache.lock_inflight().is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_fetch_independently(harness: Harness) {
        let (first, second) = tokio::join!(
            harness.cache.resolve(zip_lookup("v1.0.0"), harness.slow("one")),
            harness.cache.resolve(zip_lookup("v1.1.0"), harness.slow("two")),
        );
        assert_eq!(served(first.unwrap()).0, "one");
        assert_eq!(served(second.unwrap()).0, "two");
        assert_eq!(harness.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_entries_expire() {
        let harness = build(Arc::new(MockSharedTier::default()), None);
        let lookup = Lookup::new(encode(&coordinate(), ArtifactKind::Latest, None).unwrap(), Duration::from_millis(50));
        harness.cache.resolve(lookup.clone(), harness.respond(200, "a")).await.unwrap();
        assert!(harness.cache.memory().contains(lookup.key().tier_key()));

        // Memory expiry follows the wall clock; the shared mock follows Tokio's.
        std::thread::sleep(Duration::from_millis(120));
        tokio::time::advance(Duration::from_millis(120)).await;
        assert!(harness.cache.memory().get(lookup.key().tier_key()).is_none());

        let resolution = harness.cache.resolve(lookup, harness.respond(200, "b")).await.unwrap();
        assert_eq!(served(resolution), (Bytes::from_static(b"b"), Source::Upstream));
        assert_eq!(harness.calls(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_shared_tier_still_serves() {
        let harness = build(Arc::new(MockSharedTier::unreachable()), None);
        let lookup = list_lookup();
        let first = harness.cache.resolve(lookup.clone(), harness.respond(200, "v1.0.0\n")).await.unwrap();
        assert_eq!(served(first).1, Source::Upstream);
        let second = harness.cache.resolve(lookup, harness.respond(200, "v1.0.0\n")).await.unwrap();
        assert_eq!(served(second).1, Source::Memory);
    }

    #[tokio::test]
    async fn test_versioned_miss_records_module() {
        let db = Database::connect_in_memory().await.unwrap();
        let records = ModuleRepository::from(&db);
        let harness = build(Arc::new(MockSharedTier::default()), Some(records.clone()));

        let lookup = zip_lookup("v1.2.0").recording("github.com/user/repo", "v1.2.0");
        harness.cache.resolve(lookup, harness.respond(200, "PK...")).await.unwrap();
        assert_eq!(records.get("github.com/user/repo").await.unwrap().unwrap().version, "v1.2.0");

        // An older version fetched later does not move the record backwards.
        let lookup = zip_lookup("v1.0.0").recording("github.com/user/repo", "v1.0.0");
        harness.cache.resolve(lookup, harness.respond(200, "PK...")).await.unwrap();
        assert_eq!(records.get("github.com/user/repo").await.unwrap().unwrap().version, "v1.2.0");
    }

    #[tokio::test]
    async fn test_record_failure_does_not_fail_lookup() {
        let db = Database::connect_in_memory().await.unwrap();
        let records = ModuleRepository::from(&db);
        db.close().await;
        let harness = build(Arc::new(MockSharedTier::default()), Some(records));

        let lookup = zip_lookup("v1.0.0").recording("github.com/user/repo", "v1.0.0");
        let resolution = harness.cache.resolve(lookup, harness.respond(200, "PK...")).await.unwrap();
        assert_eq!(served(resolution).1, Source::Upstream);
    }
}
