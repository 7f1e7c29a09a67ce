//! S3-compatible object store.
//!
//! This module provides an object store implementation for S3-compatible
//! services including AWS S3, MinIO, Backblaze B2, Tigris (Fly.io), and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file (or its
//! environment overrides): `key_id` and `key_secret`.

use crate::{
    Object, ObjectStore,
    error::{ErrorKind, Result},
    validate_key,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
///
/// TODO: Adaptive rate limiting based on 429/throttling responses?
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible object store.
///
/// Stores objects in an S3 bucket, optionally under a key prefix. All keys
/// are relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use modproxy_storage::backend::S3Store;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = S3Store::new(
///     "minio",
///     "modules",
///     None,
///     "us-east-1",
///     Some("http://localhost:9000".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Store {
    /// Create a new S3 object store.
    ///
    /// # Arguments
    /// * `name` - A name for this store (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .map(|p| validate_key(&p).map(|_| p.clone()))
            .transpose()?;
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "modproxy-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (MinIO, Backblaze, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a relative key.
    fn full_key(&self, key: &str) -> Result<String> {
        Ok(join_prefix(self.prefix.as_deref(), validate_key(key)?))
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        // The semaphore is never closed; this only fails if that changes.
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }
}

fn join_prefix(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
        None => key.to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self), fields(store = %self.name, bucket = %self.bucket))]
    async fn ensure_bucket(&self) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                tracing::info!("Bucket already exists");
                return Ok(());
            },
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {},
            Err(err) => exn::bail!(ErrorKind::Connection(DisplayErrorContext(&err).to_string())),
        }
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => tracing::info!("Bucket created"),
            // Lost a race with another node creating the same bucket.
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()) =>
            {
                tracing::info!("Bucket already exists");
            },
            Err(err) => exn::bail!(ErrorKind::Connection(DisplayErrorContext(&err).to_string())),
        }
        Ok(())
    }

    async fn put(&self, key: &str, object: Object) -> Result<()> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        let length = i64::try_from(object.size).or_raise(|| ErrorKind::BackendError("object too large".to_string()))?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .content_length(length)
            .body(ByteStream::from(object.data));
        if let Some(content_type) = object.content_type {
            request = request.content_type(content_type);
        }
        for (name, value) in object.metadata {
            request = request.metadata(name, value);
        }
        request
            .send()
            .await
            .map_err(|err| exn::Exn::from(ErrorKind::Network(DisplayErrorContext(&err).to_string())))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Object> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&full_key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(key.to_string()))
            },
            Err(err) => exn::bail!(ErrorKind::Network(DisplayErrorContext(&err).to_string())),
        };
        let size = output
            .content_length()
            .and_then(|length| u64::try_from(length).ok())
            .ok_or_raise(|| ErrorKind::BackendError(format!("no content length for {key}")))?;
        let content_type = output.content_type().map(str::to_string);
        let metadata = output.metadata().cloned().unwrap_or_default();
        let data = output
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Network(format!("reading body of {key}")))?
            .into_bytes();
        Ok(Object {
            data,
            size,
            content_type,
            metadata,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|err| exn::Exn::from(ErrorKind::Network(DisplayErrorContext(&err).to_string())))?;
        Ok(())
    }
}
