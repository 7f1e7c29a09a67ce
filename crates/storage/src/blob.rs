//! Checksum-verified blob storage.

use crate::error::{ErrorKind, Result};
use crate::{BackendHandle, Object};
use bytes::Bytes;
use exn::ResultExt;
use modproxy_keys::{ArtifactKind, CacheKey, ModuleCoordinate, encode};
use tracing::instrument;

/// Object metadata key holding the hex BLAKE3 digest of the payload.
pub const CHECKSUM_METADATA_KEY: &str = "blake3";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Durable object storage with a per-object integrity tag.
///
/// Every [`put`](Self::put) stores the BLAKE3 digest of the payload as object
/// metadata; every [`get`](Self::get) recomputes it and refuses to return
/// bytes that don't match (or that were truncated in transit). A caller never
/// sees corrupt data, only an error it can treat as a miss.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use modproxy_storage::{BlobStore, ObjectStore, error::Result};
///
/// async fn round_trip(backend: Arc<dyn ObjectStore + Send + Sync>) -> Result<()> {
///     let blobs = BlobStore::new(backend);
///     blobs.ensure_container().await?;
///     blobs.put("ab/cd.sum", "checksums".into(), "text/plain").await?;
///     assert_eq!(blobs.get("ab/cd.sum").await?, "checksums");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct BlobStore {
    backend: BackendHandle,
}

impl BlobStore {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    /// Create the backing bucket if it doesn't exist yet.
    ///
    /// Called once at startup; a failure here is fatal for the process.
    pub async fn ensure_container(&self) -> Result<()> {
        self.backend.ensure_bucket().await
    }

    /// Store `data` at `path` along with its integrity tag. Overwrites.
    #[instrument(skip(self, data), fields(store = self.backend.name(), bytes = data.len()))]
    pub async fn put(&self, path: &str, data: Bytes, content_type: &str) -> Result<()> {
        let checksum = blake3::hash(&data).to_hex();
        let object = Object::new(data)
            .with_content_type(content_type)
            .with_metadata(CHECKSUM_METADATA_KEY, checksum.as_str());
        self.backend.put(path, object).await
    }

    /// Read the object at `path`, verifying its size and integrity tag.
    ///
    /// # Errors
    /// - [`NotFound`](ErrorKind::NotFound) if nothing is stored at `path`.
    /// - [`ShortRead`](ErrorKind::ShortRead) if the payload length differs
    ///   from the size the backend declared.
    /// - [`ChecksumMissing`](ErrorKind::ChecksumMissing) if the object has no tag.
    /// - [`ChecksumMismatch`](ErrorKind::ChecksumMismatch) if the tag doesn't
    ///   match the payload.
    #[instrument(skip(self), fields(store = self.backend.name()))]
    pub async fn get(&self, path: &str) -> Result<Bytes> {
        let object = self.backend.get(path).await?;
        let read = object.data.len() as u64;
        if read != object.size {
            exn::bail!(ErrorKind::ShortRead {
                key: path.to_string(),
                expected: object.size,
                read,
            });
        }
        let Some(stored) = object.metadata.get(CHECKSUM_METADATA_KEY) else {
            exn::bail!(ErrorKind::ChecksumMissing(path.to_string()));
        };
        let computed = blake3::hash(&object.data);
        // Hex comparison against the stored tag; case-insensitive since some
        // S3-compatible services normalise metadata values.
        if !stored.eq_ignore_ascii_case(computed.to_hex().as_str()) {
            exn::bail!(ErrorKind::ChecksumMismatch(path.to_string()));
        }
        Ok(object.data)
    }

    /// Delete the object at `path`. Deleting a missing object is not an error.
    pub async fn remove(&self, path: &str) -> Result<()> {
        match self.backend.delete(path).await {
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    /// Look up an artifact by its keys.
    ///
    /// Returns `Ok(None)` when the object is absent, so "not present" can be
    /// told apart from a failure.
    pub async fn get_key(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        match self.get(key.path()).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Store an artifact under its keys, with the content type of its kind.
    pub async fn put_key(&self, key: &CacheKey, data: Bytes) -> Result<()> {
        let content_type = key.kind().map_or(DEFAULT_CONTENT_TYPE, ArtifactKind::content_type);
        self.put(key.path(), data, content_type).await
    }

    /// Look up a module artifact by coordinate.
    pub async fn get_artifact(
        &self,
        coordinate: &ModuleCoordinate,
        kind: ArtifactKind,
        version: Option<&str>,
    ) -> Result<Option<Bytes>> {
        let key = artifact_key(coordinate, kind, version)?;
        self.get_key(&key).await
    }

    /// Store a module artifact by coordinate.
    pub async fn put_artifact(
        &self,
        coordinate: &ModuleCoordinate,
        kind: ArtifactKind,
        version: Option<&str>,
        data: Bytes,
    ) -> Result<()> {
        let key = artifact_key(coordinate, kind, version)?;
        self.put_key(&key, data).await
    }

    /// Remove a module artifact by coordinate.
    pub async fn remove_artifact(
        &self,
        coordinate: &ModuleCoordinate,
        kind: ArtifactKind,
        version: Option<&str>,
    ) -> Result<()> {
        let key = artifact_key(coordinate, kind, version)?;
        self.remove(key.path()).await
    }
}

fn artifact_key(coordinate: &ModuleCoordinate, kind: ArtifactKind, version: Option<&str>) -> Result<CacheKey> {
    encode(coordinate, kind, version).or_raise(|| ErrorKind::InvalidKey(coordinate.escaped_path()))
}
