//! Startup wiring: connect every backing service and start background work.

use crate::error::{ErrorKind, Result};
use crate::routes::AppState;
use exn::ResultExt;
use modproxy_config::Config;
use modproxy_db::{Database, ModuleRepository};
use modproxy_index::{Synchronizer, Warmer, WorkerPool, work_queue};
use modproxy_storage::BlobStore;
use modproxy_storage::backend::S3Store;
use modproxy_tiers::{RedisTier, TierCache};
use modproxy_upstream::{HttpTransport, UpstreamClient};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The running proxy, minus its HTTP listener.
pub struct Services {
    pub state: AppState,
    database: Database,
    synchronizer: Option<JoinHandle<()>>,
    workers: Option<WorkerPool>,
}

impl Services {
    /// Connect to the object store, shared tier and database, failing if any
    /// of them is unavailable, then start the index synchronizer.
    pub async fn start(config: &Config, token: &CancellationToken) -> Result<Self> {
        let storage = &config.storage;
        let backend = S3Store::new(
            "s3",
            storage.bucket.as_str(),
            storage.prefix.clone(),
            storage.region.as_str(),
            Some(storage.endpoint.as_str()),
            storage.key_id.as_str(),
            storage.key_secret.expose(),
        )
        .or_raise(|| ErrorKind::Startup("object store"))?;
        let blobs = BlobStore::new(Arc::new(backend));
        blobs.ensure_container().await.or_raise(|| ErrorKind::Startup("object store"))?;

        let shared = RedisTier::connect("redis", config.redis.url.expose())
            .await
            .or_raise(|| ErrorKind::Startup("shared tier"))?;

        let database = Database::connect(&config.database.path)
            .await
            .or_raise(|| ErrorKind::Startup("database"))?;
        let records = ModuleRepository::from(&database);

        let transport = HttpTransport::new(config.upstream.timeout).or_raise(|| ErrorKind::Startup("upstream client"))?;
        let upstream = UpstreamClient::new(
            Arc::new(transport),
            config.upstream.proxy_url.as_str(),
            config.upstream.index_url.as_str(),
        )
        .with_sumdb_hosts(config.upstream.sumdb_hosts.iter().cloned());

        let tiers = TierCache::builder(Arc::new(shared), blobs.clone())
            .memory_ttl(config.ttl.memory)
            .records(records.clone())
            .build();

        let (synchronizer, workers) = match config.sync.enabled {
            true => {
                let (sender, receiver) = work_queue(config.sync.queue_capacity);
                let warmer = Warmer::new(upstream.clone(), blobs);
                let workers = WorkerPool::spawn(config.sync.workers, receiver, warmer, token.clone());
                let synchronizer = Synchronizer::new(
                    upstream.clone(),
                    records,
                    sender,
                    config.sync.interval,
                    config.sync.lookback,
                );
                tracing::info!(workers = workers.len(), "index synchronization enabled");
                (Some(tokio::spawn(synchronizer.run(token.clone()))), Some(workers))
            },
            false => {
                tracing::info!("index synchronization disabled");
                (None, None)
            },
        };

        Ok(Self {
            state: AppState {
                tiers,
                upstream,
                ttl: config.ttl,
            },
            database,
            synchronizer,
            workers,
        })
    }

    /// Wait for background tasks to notice cancellation, then close the database.
    pub async fn stop(self) {
        if let Some(synchronizer) = self.synchronizer
            && let Err(err) = synchronizer.await
        {
            tracing::error!(error = %err, "index synchronizer panicked");
        }
        if let Some(workers) = self.workers {
            workers.join().await;
        }
        self.database.close().await;
    }
}
