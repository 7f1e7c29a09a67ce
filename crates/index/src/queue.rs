//! Bounded queue of cache-warm jobs.

use crate::error::{ErrorKind, Result};
use modproxy_keys::ModuleCoordinate;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// A module version to fetch ahead of demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    /// First segment of the module path.
    pub domain: String,
    /// Everything after the first `/`.
    pub module: String,
    pub version: String,
}

impl Workload {
    /// Split a decoded module path on its first `/`.
    pub fn from_path(path: &str, version: impl Into<String>) -> Result<Self> {
        match path.split_once('/') {
            Some((domain, module)) if !domain.is_empty() && !module.is_empty() => Ok(Self {
                domain: domain.to_string(),
                module: module.to_string(),
                version: version.into(),
            }),
            _ => exn::bail!(ErrorKind::InvalidPath(path.to_string())),
        }
    }

    pub fn coordinate(&self) -> Result<ModuleCoordinate> {
        let path = format!("{}/{}", self.domain, self.module);
        match ModuleCoordinate::from_module_path(&path) {
            Ok(coordinate) => Ok(coordinate),
            Err(_) => exn::bail!(ErrorKind::InvalidPath(path)),
        }
    }
}

/// Create a queue holding at most `capacity` workloads.
pub fn work_queue(capacity: usize) -> (WorkSender, WorkReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        WorkSender { inner: sender },
        WorkReceiver {
            inner: Arc::new(Mutex::new(receiver)),
        },
    )
}

#[derive(Clone)]
pub struct WorkSender {
    inner: mpsc::Sender<Workload>,
}

impl WorkSender {
    /// Enqueue a workload, waiting while the queue is full.
    pub async fn push(&self, workload: Workload) -> Result<()> {
        match self.inner.send(workload).await {
            Ok(()) => Ok(()),
            Err(_) => exn::bail!(ErrorKind::QueueClosed),
        }
    }
}

/// Receiving end, shared by every worker. Cheap to clone.
#[derive(Clone)]
pub struct WorkReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Workload>>>,
}

impl WorkReceiver {
    /// Next workload, or `None` once every sender is gone and the queue is drained.
    pub async fn pop(&self) -> Option<Workload> {
        self.inner.lock().await.recv().await
    }
}
