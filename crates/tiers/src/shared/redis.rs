use super::SharedTier;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use bytes::Bytes;
use exn::ResultExt;
use redis::AsyncCommands;
use redis::aio::{ConnectionLike, ConnectionManager};
use std::time::Duration;
use tracing::instrument;

/// Shared tier backed by Redis.
///
/// Uses a [`ConnectionManager`], which multiplexes every task over one
/// connection and reconnects transparently after a failure.
#[derive(Clone)]
pub struct RedisTier {
    name: String,
    connection: ConnectionManager,
}

impl RedisTier {
    /// Connect to `url` and verify the server answers a `PING`.
    ///
    /// Fails with [`Connection`](ErrorKind::Connection) if the URL is malformed
    /// or the server can't be reached.
    #[instrument(skip_all, fields(name = %name.as_ref()))]
    pub async fn connect(name: impl AsRef<str>, url: &str) -> Result<Self> {
        let client = redis::Client::open(url).or_raise(|| ErrorKind::Connection)?;
        let mut connection = ConnectionManager::new(client).await.or_raise(|| ErrorKind::Connection)?;
        connection
            .req_packed_command(&redis::cmd("PING"))
            .await
            .or_raise(|| ErrorKind::Connection)?;
        tracing::debug!("connected to shared tier");
        Ok(Self {
            name: name.as_ref().to_string(),
            connection,
        })
    }
}

#[async_trait]
impl SharedTier for RedisTier {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(tier = %self.name))]
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut connection = self.connection.clone();
        match connection.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => Ok(value.map(Bytes::from)),
            Err(err) => exn::bail!(ErrorKind::Shared(err.to_string())),
        }
    }

    #[instrument(skip(self, value), fields(tier = %self.name, bytes = value.len()))]
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let mut connection = self.connection.clone();
        // PSETEX rejects a zero expiry.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        match connection.pset_ex::<_, _, ()>(key, value.as_ref(), millis).await {
            Ok(()) => Ok(()),
            Err(err) => exn::bail!(ErrorKind::Shared(err.to_string())),
        }
    }
}
