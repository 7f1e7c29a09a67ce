//! Client for the canonical module registry.
//!
//! [`UpstreamClient`] builds the registry's URL for each artifact kind and
//! keeps its own short-lived response cache, separate from the tiered cache:
//! responses are fresh for 30 seconds and usable for 60, and a stale hit is
//! served immediately while a single background re-fetch refreshes it.
//!
//! The network itself sits behind the [`Transport`] trait so the client can
//! be exercised without one.

mod client;
pub mod error;
mod response_cache;
mod transport;

pub use crate::client::{DEFAULT_INDEX_URL, DEFAULT_PROXY_URL, DEFAULT_SUMDB_HOSTS, UpstreamClient};
pub use crate::response_cache::{FRESH_FOR, MAX_CACHED_BODY, STALE_AFTER, url_hash};
#[cfg(any(test, feature = "mock"))]
pub use crate::transport::MockTransport;
pub use crate::transport::{HttpTransport, Transport, UpstreamResponse};
use std::sync::Arc;

pub type TransportHandle = Arc<dyn Transport + Send + Sync>;
