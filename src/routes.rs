//! HTTP surface of the proxy.
//!
//! Module paths contain an arbitrary number of `/` so everything goes through
//! one handler, which parses the path itself.

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use modproxy_config::TtlConfig;
use modproxy_keys::{ArtifactKind, ModuleCoordinate, encode, sumdb_key, unescape_path};
use modproxy_tiers::{Lookup, Resolution, TierCache};
use modproxy_upstream::UpstreamClient;
use std::time::Duration;

const FROM_CACHE: &str = "x-from-cache";
const FROM_CACHE_REASON: &str = "x-from-cache-reason";
const SUMDB_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Everything a request handler needs.
#[derive(Clone)]
pub struct AppState {
    pub tiers: TierCache,
    pub upstream: UpstreamClient,
    pub ttl: TtlConfig,
}

impl AppState {
    fn ttl_for(&self, kind: ArtifactKind) -> Duration {
        match kind {
            ArtifactKind::List => self.ttl.list,
            ArtifactKind::Latest => self.ttl.latest,
            ArtifactKind::Info | ArtifactKind::Mod | ArtifactKind::Zip => self.ttl.artifact,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .fallback(get(proxy))
        .with_state(state)
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Artifact {
        coordinate: ModuleCoordinate,
        kind: ArtifactKind,
        version: Option<String>,
    },
    Sumdb {
        domain: String,
        trail: String,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum RouteError {
    NotFound,
    BadRequest(String),
}

impl Route {
    fn parse(path: &str) -> Result<Self, RouteError> {
        let path = path.trim_start_matches('/');
        if let Some(rest) = path.strip_prefix("sumdb/") {
            return match rest.split_once('/') {
                Some((domain, trail)) if !domain.is_empty() && !trail.is_empty() => Ok(Self::Sumdb {
                    domain: domain.to_string(),
                    trail: trail.to_string(),
                }),
                _ => Err(RouteError::NotFound),
            };
        }
        let (module, kind, version) = if let Some(module) = path.strip_suffix("/@latest") {
            (module, ArtifactKind::Latest, None)
        } else if let Some((module, file)) = path.split_once("/@v/") {
            match file {
                "list" => (module, ArtifactKind::List, None),
                file => {
                    let (version, kind) = versioned_file(file).ok_or(RouteError::NotFound)?;
                    (module, kind, Some(version.to_string()))
                },
            }
        } else {
            return Err(RouteError::NotFound);
        };
        let coordinate = ModuleCoordinate::parse(module).map_err(|err| RouteError::BadRequest(err.to_string()))?;
        Ok(Self::Artifact {
            coordinate,
            kind,
            version,
        })
    }
}

fn versioned_file(file: &str) -> Option<(&str, ArtifactKind)> {
    [ArtifactKind::Info, ArtifactKind::Mod, ArtifactKind::Zip]
        .into_iter()
        .find_map(|kind| {
            let version = file.strip_suffix(kind.extension())?.strip_suffix('.')?;
            Some((version, kind))
        })
        .filter(|(version, _)| !version.is_empty())
}

/// Mutable checksum database resources: the tree head and partial tiles.
fn is_mutable_sumdb(trail: &str) -> bool {
    trail == "latest" || trail.contains(".p/")
}

async fn proxy(State(state): State<AppState>, uri: Uri) -> Response {
    match Route::parse(uri.path()) {
        Ok(Route::Artifact {
            coordinate,
            kind,
            version,
        }) => artifact(state, coordinate, kind, version).await,
        Ok(Route::Sumdb { domain, trail }) => sumdb(state, domain, trail).await,
        Err(RouteError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(RouteError::BadRequest(message)) => (StatusCode::BAD_REQUEST, message).into_response(),
    }
}

async fn artifact(state: AppState, coordinate: ModuleCoordinate, kind: ArtifactKind, version: Option<String>) -> Response {
    let key = match encode(&coordinate, kind, version.as_deref()) {
        Ok(key) => key,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    let mut lookup = Lookup::new(key, state.ttl_for(kind));
    if let Some(version) = &version
        && let (Ok(path), Ok(version)) = (coordinate.module_path(), unescape_path(version))
    {
        lookup = lookup.recording(path, version);
    }
    let upstream = state.upstream.clone();
    let fetch = move || async move { upstream.artifact(&coordinate, kind, version.as_deref()).await };
    respond(state.tiers.resolve(lookup, fetch).await, kind.content_type())
}

async fn sumdb(state: AppState, domain: String, trail: String) -> Response {
    if !state.upstream.allows_sumdb(&domain) {
        return StatusCode::NOT_FOUND.into_response();
    }
    if is_mutable_sumdb(&trail) {
        return match state.upstream.sumdb(&domain, &trail).await {
            Ok(response) if response.is_success() => served(response.body, SUMDB_CONTENT_TYPE, None),
            Ok(response) => relayed(response.status, response.body),
            Err(err) => bad_gateway(&err.to_string()),
        };
    }
    let lookup = Lookup::new(sumdb_key(&domain, &trail), state.ttl.sumdb);
    let upstream = state.upstream.clone();
    let fetch = move || async move { upstream.sumdb(&domain, &trail).await };
    respond(state.tiers.resolve(lookup, fetch).await, SUMDB_CONTENT_TYPE)
}

fn respond(resolution: modproxy_tiers::error::Result<Resolution>, content_type: &'static str) -> Response {
    match resolution {
        Ok(Resolution::Served { body, source }) => {
            served(body, content_type, source.is_cached().then(|| source.to_string()))
        },
        Ok(Resolution::Relayed(response)) => relayed(response.status, response.body),
        Err(err) => bad_gateway(&err.to_string()),
    }
}

fn served(body: Bytes, content_type: &'static str, cached_from: Option<String>) -> Response {
    let mut response = (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response();
    let headers = response.headers_mut();
    headers.insert(FROM_CACHE, HeaderValue::from_static(if cached_from.is_some() { "true" } else { "false" }));
    if let Some(reason) = cached_from.and_then(|reason| HeaderValue::from_str(&reason).ok()) {
        headers.insert(FROM_CACHE_REASON, reason);
    }
    response
}

fn relayed(status: u16, body: Bytes) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    Response::builder()
        .status(status)
        .body(Body::from(body))
        .unwrap_or_else(|_| status.into_response())
}

fn bad_gateway(message: &str) -> Response {
    tracing::warn!(error = message, "upstream unavailable");
    (StatusCode::BAD_GATEWAY, message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use modproxy_storage::BlobStore;
    use modproxy_storage::backend::MockStore;
    use modproxy_tiers::MockSharedTier;
    use modproxy_upstream::MockTransport;
    use rstest::rstest;
    use std::sync::Arc;

    fn state() -> (Arc<MockTransport>, AppState) {
        let transport = Arc::new(MockTransport::default());
        let upstream = UpstreamClient::new(transport.clone(), "https://proxy.test", "https://index.test/index");
        let tiers = TierCache::builder(
            Arc::new(MockSharedTier::default()),
            BlobStore::new(Arc::new(MockStore::default())),
        )
        .build();
        let state = AppState {
            tiers,
            upstream,
            ttl: TtlConfig::default(),
        };
        (transport, state)
    }

    async fn get(state: &AppState, path: &str) -> (StatusCode, Option<String>, Option<String>, Bytes) {
        let response = proxy(State(state.clone()), path.parse().unwrap()).await;
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .map(|value| value.to_str().unwrap().to_string())
        };
        let (from_cache, reason) = (header(FROM_CACHE), header(FROM_CACHE_REASON));
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, from_cache, reason, body)
    }

    fn artifact(path: &str, kind: ArtifactKind, version: Option<&str>) -> Route {
        Route::Artifact {
            coordinate: ModuleCoordinate::parse(path).unwrap(),
            kind,
            version: version.map(str::to_string),
        }
    }

    #[rstest]
    #[case("/github.com/user/repo/@v/list", artifact("github.com/user/repo", ArtifactKind::List, None))]
    #[case("/github.com/user/repo/@latest", artifact("github.com/user/repo", ArtifactKind::Latest, None))]
    #[case(
        "/github.com/user/repo/@v/v1.2.3.info",
        artifact("github.com/user/repo", ArtifactKind::Info, Some("v1.2.3"))
    )]
    #[case(
        "/golang.org/x/tools/gopls/@v/v0.15.0.mod",
        artifact("golang.org/x/tools/gopls", ArtifactKind::Mod, Some("v0.15.0"))
    )]
    #[case("/gopkg.in/yaml.v3/@v/v3.0.1.zip", artifact("gopkg.in/yaml.v3", ArtifactKind::Zip, Some("v3.0.1")))]
    #[case(
        "/sumdb/sum.golang.org/lookup/github.com/user/repo@v1.0.0",
        Route::Sumdb { domain: "sum.golang.org".to_string(), trail: "lookup/github.com/user/repo@v1.0.0".to_string() }
    )]
    fn test_parse_routes(#[case] path: &str, #[case] expected: Route) {
        assert_eq!(Route::parse(path).unwrap(), expected);
    }

    #[rstest]
    #[case("/")]
    #[case("/github.com/user/repo")]
    #[case("/github.com/user/repo/@v/v1.0.0.tar")]
    #[case("/github.com/user/repo/@v/.zip")]
    #[case("/sumdb/sum.golang.org")]
    fn test_unknown_routes(#[case] path: &str) {
        assert_eq!(Route::parse(path).unwrap_err(), RouteError::NotFound);
    }

    #[rstest]
    #[case("/github.com/@v/list")]
    #[case("/github.com/../etc/@v/list")]
    fn test_malformed_module_paths(#[case] path: &str) {
        assert!(matches!(Route::parse(path), Err(RouteError::BadRequest(_))));
    }

    #[rstest]
    #[case("latest", true)]
    #[case("tile/8/0/x001/234.p/5", true)]
    #[case("tile/8/0/x001/234", false)]
    #[case("lookup/github.com/user/repo@v1.0.0", false)]
    fn test_mutable_sumdb_resources(#[case] trail: &str, #[case] expected: bool) {
        assert_eq!(is_mutable_sumdb(trail), expected);
    }

    #[tokio::test]
    async fn test_cache_headers() {
        let (transport, state) = state();
        transport.respond("https://proxy.test/github.com/user/repo/@v/v1.0.0.info", 200, r#"{"Version":"v1.0.0"}"#);

        let (status, from_cache, reason, body) = get(&state, "/github.com/user/repo/@v/v1.0.0.info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(from_cache.as_deref(), Some("false"));
        assert_eq!(reason, None);
        assert_eq!(body, r#"{"Version":"v1.0.0"}"#);

        let (status, from_cache, reason, _) = get(&state, "/github.com/user/repo/@v/v1.0.0.info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(from_cache.as_deref(), Some("true"));
        assert_eq!(reason.as_deref(), Some("memory"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_relayed_unannotated() {
        let (transport, state) = state();
        transport.respond("https://proxy.test/github.com/user/repo/@v/v9.0.0.zip", 410, "gone");
        let (status, from_cache, reason, body) = get(&state, "/github.com/user/repo/@v/v9.0.0.zip").await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!((from_cache, reason), (None, None));
        assert_eq!(body, "gone");
    }

    #[tokio::test]
    async fn test_transport_error_is_bad_gateway() {
        let (transport, state) = state();
        transport.fail("https://proxy.test/github.com/user/repo/@v/list");
        let (status, ..) = get(&state, "/github.com/user/repo/@v/list").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_sumdb_host_must_be_allowed() {
        let (transport, state) = state();
        let (status, ..) = get(&state, "/sumdb/evil.example/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_sumdb_tree_head_bypasses_tiers() {
        let (transport, state) = state();
        transport.respond("https://sum.golang.org/latest", 200, "go.sum database tree\n1\n");
        let (status, from_cache, ..) = get(&state, "/sumdb/sum.golang.org/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(from_cache.as_deref(), Some("false"));
        assert!(state.tiers.blobs().get(sumdb_key("sum.golang.org", "latest").path()).await.is_err());
    }
}
