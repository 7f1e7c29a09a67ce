//! In-memory object store for testing.

use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::{Object, ObjectStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory object store for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. [`tamper`](Self::tamper)
/// gives tests direct access to stored objects to simulate corruption.
///
/// # Examples
///
/// ```
/// use modproxy_storage::{Object, ObjectStore, backend::MockStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::default();
/// store.put("a/b.zip", Object::new(&b"data..."[..])).await?;
/// assert_eq!(store.get("a/b.zip").await?.data, &b"data..."[..]);
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    name: String,
    storage: RwLock<HashMap<String, Object>>,
    bucket: AtomicBool,
    unreachable: bool,
}

impl MockStore {
    /// Change the name of the mock store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A store whose service can never be reached; every call fails with
    /// [`Connection`](ErrorKind::Connection).
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Whether [`ensure_bucket`](ObjectStore::ensure_bucket) has created the bucket.
    pub fn has_bucket(&self) -> bool {
        self.bucket.load(Ordering::SeqCst)
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Mutate a stored object in place, bypassing any checksum bookkeeping.
    ///
    /// Panics if the object does not exist. If test setup is wrong, then
    /// the test should not pass.
    pub async fn tamper(&self, key: &str, f: impl FnOnce(&mut Object)) {
        let mut guard = self.storage.write().await;
        let Some(object) = guard.get_mut(key) else {
            panic!("MockStore::tamper: no object at {key}");
        };
        f(object);
    }

    fn check_reachable(&self) -> Result<()> {
        match self.unreachable {
            true => exn::bail!(ErrorKind::Connection(format!("{} is unreachable", self.name))),
            false => Ok(()),
        }
    }
}
impl Default for MockStore {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(HashMap::new()),
            bucket: AtomicBool::new(false),
            unreachable: false,
        }
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_bucket(&self) -> Result<()> {
        self.check_reachable()?;
        self.bucket.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn put(&self, key: &str, object: Object) -> Result<()> {
        self.check_reachable()?;
        let key = validate_key(key)?;
        self.storage.write().await.insert(key.to_string(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Object> {
        self.check_reachable()?;
        let key = validate_key(key)?;
        self.storage.read().await.get(key).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_reachable()?;
        let key = validate_key(key)?;
        self.storage
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))
    }
}
