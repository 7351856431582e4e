//! S3-compatible object store.
//!
//! This module provides an object store implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file; ambient
//! credential chains are not consulted.

use crate::{
    ObjectStore,
    error::{ErrorKind, Result},
    validate_key,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible object store.
///
/// Stores objects in an S3 bucket, optionally under a key prefix. All keys are
/// relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use ferry_storage::backend::S3Store;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = S3Store::new(
///     "media",
///     "my-bucket",
///     Some("public/".to_string()),
///     "us-east-1",
///     None::<String>,
///     None,
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
    bucket: String,
    region: String,
    prefix: Option<String>,
    /// Base URL objects are served from, when not the bucket's own endpoint.
    public_url: Option<String>,
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
    /// * `public_url` - Base URL that objects are served from
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        public_url: Option<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(validate_key).transpose()?;
        let region = region.into();
        let credentials = Credentials::new(key_id, key_secret, None, None, "ferry-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            // The migration engine owns retries and backoff; a single SDK
            // attempt keeps the attempt counter in the progress file honest.
            .retry_config(RetryConfig::disabled())
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        Ok(Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            region,
            prefix,
            public_url,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a relative key.
    fn full_key(&self, key: &str) -> Result<String> {
        let validated = validate_key(key)?;
        Ok(join_prefix(self.prefix.as_deref(), &validated))
    }

    /// Acquire a permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| exn::Exn::from(ErrorKind::BackendError("S3 request limiter closed".to_string())))
    }
}

fn join_prefix(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
        None => key.to_string(),
    }
}

/// Map an SDK failure onto the store's actionable categories.
fn map_sdk_error<E, R>(err: SdkError<E, R>, key: &str) -> ErrorKind
where
    E: ProvideErrorMetadata + Debug,
    R: Debug,
{
    match &err {
        SdkError::TimeoutError(_) => ErrorKind::Timeout,
        SdkError::DispatchFailure(failure) if failure.is_timeout() => ErrorKind::Timeout,
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => ErrorKind::Network(format!("{err:?}")),
        SdkError::ServiceError(context) => match context.err().code() {
            Some("SlowDown" | "Throttling" | "ThrottlingException" | "RequestLimitExceeded" | "TooManyRequests") => {
                ErrorKind::Throttled(key.to_string())
            },
            Some("InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" | "InvalidToken") => {
                ErrorKind::Unauthenticated(key.to_string())
            },
            Some("AccessDenied" | "AllAccessDisabled") => ErrorKind::PermissionDenied(key.to_string()),
            Some("NoSuchBucket" | "NoSuchKey" | "NotFound") => ErrorKind::NotFound(key.to_string()),
            Some("InternalError" | "ServiceUnavailable" | "RequestTimeout") => ErrorKind::Network(key.to_string()),
            code => ErrorKind::BackendError(code.unwrap_or("unknown S3 error").to_string()),
        },
        _ => ErrorKind::BackendError(format!("{err:?}")),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, key: &str) -> Result<String> {
        let full_key = self.full_key(key)?;
        Ok(match &self.public_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), full_key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, full_key),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&full_key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => Ok(false),
            Err(err) => exn::bail!(map_sdk_error(err, &full_key)),
        }
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .content_type(content_type)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &full_key))?;
        tracing::debug!(store = %self.name, key = %full_key, size = data.len(), "uploaded object");
        self.url(key)
    }
}
