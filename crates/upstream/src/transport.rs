use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use bytes::Bytes;
use exn::ResultExt;
use std::time::Duration;
use tracing::instrument;

/// Status and body exactly as the registry returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single HTTP `GET`.
///
/// Implementations report a response with *any* status as `Ok`; only failing
/// to get a response at all is an error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name, used in tracing spans.
    fn name(&self) -> &str;

    async fn get(&self, url: &str) -> Result<UpstreamResponse>;
}

/// [`Transport`] over a pooled `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<UpstreamResponse> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => exn::bail!(ErrorKind::Transport(err.to_string())),
        };
        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => exn::bail!(ErrorKind::Transport(err.to_string())),
        };
        tracing::debug!(status, bytes = body.len(), "upstream responded");
        Ok(UpstreamResponse { status, body })
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::{Transport, UpstreamResponse};
    use crate::error::{ErrorKind, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Route {
        Respond(UpstreamResponse),
        Fail,
    }

    /// Scripted transport for testing.
    ///
    /// URLs without a route answer `404`. Every request is counted, whether
    /// or not it succeeds.
    #[derive(Default)]
    pub struct MockTransport {
        routes: Mutex<HashMap<String, Route>>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl MockTransport {
        /// Answer `url` with `status` and `body` from now on.
        pub fn respond(&self, url: impl Into<String>, status: u16, body: impl Into<bytes::Bytes>) {
            let route = Route::Respond(UpstreamResponse::new(status, body));
            self.lock_routes().insert(url.into(), route);
        }

        /// Fail every request for `url` with a transport error from now on.
        pub fn fail(&self, url: impl Into<String>) {
            self.lock_routes().insert(url.into(), Route::Fail);
        }

        /// Number of requests made for `url`.
        pub fn calls(&self, url: &str) -> usize {
            self.lock_calls().get(url).copied().unwrap_or(0)
        }

        /// Number of requests made for any URL.
        pub fn total_calls(&self) -> usize {
            self.lock_calls().values().sum()
        }

        fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Route>> {
            self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        fn lock_calls(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
            self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn name(&self) -> &str {
            "mock"
        }

        async fn get(&self, url: &str) -> Result<UpstreamResponse> {
            *self.lock_calls().entry(url.to_string()).or_default() += 1;
            match self.lock_routes().get(url) {
                Some(Route::Respond(response)) => Ok(response.clone()),
                Some(Route::Fail) => exn::bail!(ErrorKind::Transport(format!("connection refused: {url}"))),
                None => Ok(UpstreamResponse::new(404, "not found")),
            }
        }
    }
}
