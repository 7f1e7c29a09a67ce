use crate::TransportHandle;
use crate::error::{ErrorKind, Result};
use crate::response_cache::{ResponseCache, url_hash};
use crate::transport::UpstreamResponse;
use modproxy_keys::{ArtifactKind, ModuleCoordinate};
use std::sync::Arc;
use time::{OffsetDateTime, UtcOffset};
use time::macros::format_description;
use tracing::instrument;

pub const DEFAULT_PROXY_URL: &str = "https://proxy.golang.org";
pub const DEFAULT_INDEX_URL: &str = "https://index.golang.org/index";
pub const DEFAULT_SUMDB_HOSTS: &[&str] = &["sum.golang.org"];

/// Handle to the canonical registry. Cheap to clone.
///
/// Artifact fetches go through a response cache keyed by a hash of the full
/// URL (see the [crate docs](crate)). Non-2xx answers are cached like any
/// other; transport failures are not. The index feed bypasses the cache
/// because every request for it carries a new timestamp.
#[derive(Clone)]
pub struct UpstreamClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TransportHandle,
    proxy_url: String,
    index_url: String,
    sumdb_hosts: Vec<String>,
    cache: ResponseCache,
}

impl UpstreamClient {
    pub fn new(transport: TransportHandle, proxy_url: impl Into<String>, index_url: impl Into<String>) -> Self {
        let sumdb_hosts = DEFAULT_SUMDB_HOSTS.iter().map(|host| host.to_string()).collect();
        Self {
            inner: Arc::new(Inner {
                transport,
                proxy_url: proxy_url.into().trim_end_matches('/').to_string(),
                index_url: index_url.into(),
                sumdb_hosts,
                cache: ResponseCache::new(),
            }),
        }
    }

    /// Replace the checksum database hosts that [`sumdb`](Self::sumdb) may contact.
    ///
    /// Must be called before the client is cloned.
    pub fn with_sumdb_hosts(mut self, hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let hosts = hosts.into_iter().map(Into::into).collect();
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.sumdb_hosts = hosts;
        }
        self
    }

    pub async fn list(&self, coordinate: &ModuleCoordinate) -> Result<UpstreamResponse> {
        self.artifact(coordinate, ArtifactKind::List, None).await
    }

    pub async fn latest(&self, coordinate: &ModuleCoordinate) -> Result<UpstreamResponse> {
        self.artifact(coordinate, ArtifactKind::Latest, None).await
    }

    pub async fn info(&self, coordinate: &ModuleCoordinate, version: &str) -> Result<UpstreamResponse> {
        self.artifact(coordinate, ArtifactKind::Info, Some(version)).await
    }

    /// The `go.mod` file of a version.
    pub async fn module(&self, coordinate: &ModuleCoordinate, version: &str) -> Result<UpstreamResponse> {
        self.artifact(coordinate, ArtifactKind::Mod, Some(version)).await
    }

    /// The source archive of a version.
    pub async fn archive(&self, coordinate: &ModuleCoordinate, version: &str) -> Result<UpstreamResponse> {
        self.artifact(coordinate, ArtifactKind::Zip, Some(version)).await
    }

    /// Fetch any artifact kind. `version` is ignored for unversioned kinds.
    pub async fn artifact(
        &self,
        coordinate: &ModuleCoordinate,
        kind: ArtifactKind,
        version: Option<&str>,
    ) -> Result<UpstreamResponse> {
        let url = self.artifact_url(coordinate, kind, version);
        self.fetch(url).await
    }

    /// Whether [`sumdb`](Self::sumdb) may contact `domain`.
    pub fn allows_sumdb(&self, domain: &str) -> bool {
        self.inner.sumdb_hosts.iter().any(|host| host == domain)
    }

    /// Forward a checksum database request to `https://{domain}/{trail}`.
    pub async fn sumdb(&self, domain: &str, trail: &str) -> Result<UpstreamResponse> {
        if !self.allows_sumdb(domain) {
            exn::bail!(ErrorKind::SumdbNotAllowed(domain.to_string()));
        }
        let url = format!("https://{domain}/{}", trail.trim_start_matches('/'));
        self.fetch(url).await
    }

    /// One page of the index feed: records published at or after `since`.
    #[instrument(skip(self))]
    pub async fn index_page(&self, since: OffsetDateTime) -> Result<UpstreamResponse> {
        let url = self.index_url(since);
        self.inner.transport.get(&url).await
    }

    fn artifact_url(&self, coordinate: &ModuleCoordinate, kind: ArtifactKind, version: Option<&str>) -> String {
        let base = format!("{}/{}", self.inner.proxy_url, coordinate.escaped_path());
        match (kind, version) {
            (ArtifactKind::List, _) => format!("{base}/@v/list"),
            (ArtifactKind::Latest, _) => format!("{base}/@latest"),
            (kind, Some(version)) => format!("{base}/@v/{version}.{}", kind.extension()),
            // A versioned kind without a version can only ever 404 upstream.
            (kind, None) => format!("{base}/@v/.{}", kind.extension()),
        }
    }

    fn index_url(&self, since: OffsetDateTime) -> String {
        let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z");
        // Formatting with a fixed numeric layout only fails for years outside 0..=9999.
        let since = since.to_offset(UtcOffset::UTC).format(&format).unwrap_or_default();
        format!("{}?since={since}", self.inner.index_url)
    }

    #[instrument(skip(self), fields(transport = self.inner.transport.name()))]
    async fn fetch(&self, url: String) -> Result<UpstreamResponse> {
        let key = url_hash(&url);
        if let Some(entry) = self.inner.cache.get(key) {
            if entry.is_stale() {
                self.refresh_in_background(key, url);
            }
            tracing::trace!("served from response cache");
            return Ok(entry.response.clone());
        }
        self.fetch_and_store(key, &url).await
    }

    async fn fetch_and_store(&self, key: u128, url: &str) -> Result<UpstreamResponse> {
        let response = self.inner.transport.get(url).await?;
        if !self.inner.cache.insert(key, &response) {
            tracing::debug!(bytes = response.body.len(), "response too large to memoise");
        }
        Ok(response)
    }

    fn refresh_in_background(&self, key: u128, url: String) {
        if !self.inner.cache.claim_refresh(key) {
            return;
        }
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(err) = client.fetch_and_store(key, &url).await {
                tracing::warn!(url = %url, error = %err, "background refresh failed");
            }
            client.inner.cache.release_refresh(key);
        });
    }
}
