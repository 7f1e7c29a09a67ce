//! Workers that pre-fetch archives ahead of demand.

use crate::error::{ErrorKind, Result};
use crate::queue::{WorkReceiver, Workload};
use exn::ResultExt;
use modproxy_keys::ArtifactKind;
use modproxy_storage::BlobStore;
use modproxy_upstream::UpstreamClient;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Fetches a module version's source archive and stores it durably.
#[derive(Clone)]
pub struct Warmer {
    client: UpstreamClient,
    blobs: BlobStore,
}

impl Warmer {
    pub fn new(client: UpstreamClient, blobs: BlobStore) -> Self {
        Self { client, blobs }
    }

    #[instrument(skip_all, fields(domain = %workload.domain, module = %workload.module, version = %workload.version))]
    pub async fn warm(&self, workload: &Workload) -> Result<()> {
        let coordinate = workload.coordinate()?;
        let response = self
            .client
            .archive(&coordinate, &workload.version)
            .await
            .or_raise(|| ErrorKind::Upstream)?;
        if !response.is_success() {
            exn::bail!(ErrorKind::UpstreamStatus(response.status));
        }
        let bytes = response.body.len();
        self.blobs
            .put_artifact(&coordinate, ArtifactKind::Zip, Some(&workload.version), response.body)
            .await
            .or_raise(|| ErrorKind::Storage)?;
        tracing::debug!(bytes, "archive warmed");
        Ok(())
    }
}

/// A fixed number of workers draining one [`WorkReceiver`].
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `count` workers. They run until `token` is cancelled or the queue
    /// is closed and drained.
    pub fn spawn(count: usize, receiver: WorkReceiver, warmer: Warmer, token: CancellationToken) -> Self {
        let workers = (0..count.max(1))
            .map(|id| tokio::spawn(work(id, receiver.clone(), warmer.clone(), token.clone())))
            .collect();
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to stop.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "worker panicked");
            }
        }
    }
}

async fn work(id: usize, receiver: WorkReceiver, warmer: Warmer, token: CancellationToken) {
    tracing::debug!(worker = id, "worker started");
    loop {
        let workload = tokio::select! {
            () = token.cancelled() => break,
            workload = receiver.pop() => match workload {
                Some(workload) => workload,
                None => break,
            },
        };
        if let Err(err) = warmer.warm(&workload).await {
            tracing::warn!(worker = id, error = ?err, "failed to warm module");
        }
    }
    tracing::debug!(worker = id, "worker stopped");
}
