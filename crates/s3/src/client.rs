//! S3 backend implementation
//!
//! Wraps aws-sdk-s3 and implements the `Backend` trait from su-core.

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use su_core::{
    Backend, Error, NamespacePolicy, Result, RetryingUploader, S3Config, UploadSource,
    UploaderConfig, resolve_secret,
};

/// S3 backend
#[derive(Debug, Clone)]
pub struct S3Backend {
    inner: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Backend {
    /// Create a client from target configuration
    ///
    /// Construction errors are fatal and never retried.
    pub async fn new(config: &S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(Error::Init("Bucket name cannot be empty".to_string()));
        }
        if config.region.is_empty() {
            return Err(Error::Init("Region cannot be empty".to_string()));
        }
        if let Some(endpoint) = &config.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(Error::Init(format!(
                "Endpoint must start with http:// or https://: {endpoint}"
            )));
        }

        let secret_key =
            resolve_secret(&config.secret_key).map_err(|e| Error::Init(e.to_string()))?;

        // Build credentials provider
        let credentials = aws_credential_types::Credentials::new(
            config.access_key.clone(),
            secret_key,
            None, // session token
            None, // expiry
            "su-static-credentials",
        );

        // Build SDK config
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        Self::from_sdk_config(&sdk_config, &config.bucket, config.force_path_style)
    }

    /// Create a client from an externally prepared SDK configuration
    pub fn from_sdk_config(
        sdk_config: &aws_config::SdkConfig,
        bucket: &str,
        force_path_style: bool,
    ) -> Result<Self> {
        if bucket.is_empty() {
            return Err(Error::Init("Bucket name cannot be empty".to_string()));
        }
        if sdk_config.region().is_none() {
            return Err(Error::Init("SDK configuration has no region".to_string()));
        }

        // Path-style addressing for S3-compatible services
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(force_path_style)
            .build();

        Ok(Self::from_client(
            aws_sdk_s3::Client::from_conf(s3_config),
            bucket,
        ))
    }

    pub fn from_client(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            inner: client,
            bucket: bucket.into(),
        }
    }

    /// Wrap the backend in a retrying uploader with default retry settings
    pub fn uploader(self, paths: UploaderConfig) -> RetryingUploader<Self> {
        RetryingUploader::new(self, paths)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &aws_sdk_s3::error::SdkError<E>) -> String {
        match error {
            aws_sdk_s3::error::SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {}", err);
                if let Some(code) = meta.headers().get("x-amz-error-code")
                    && let Ok(code_str) = std::str::from_utf8(code.as_bytes())
                {
                    msg.push_str(&format!(" (code: {})", code_str));
                }
                msg
            }
            aws_sdk_s3::error::SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {:?}", err)
            }
            aws_sdk_s3::error::SdkError::TimeoutError(_) => "Request timeout".to_string(),
            aws_sdk_s3::error::SdkError::DispatchFailure(err) => {
                format!("Network dispatch error: {:?}", err)
            }
            aws_sdk_s3::error::SdkError::ResponseError(err) => {
                format!("Response error: {:?}", err)
            }
            _ => error.to_string(),
        }
    }
}

#[async_trait]
impl Backend for S3Backend {
    type Session = ();

    fn name(&self) -> &'static str {
        "s3"
    }

    fn namespace(&self) -> NamespacePolicy {
        NamespacePolicy::Flat
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_namespace(&self, _session: &mut (), _dir: &str) -> Result<()> {
        Ok(())
    }

    async fn transfer(
        &self,
        _session: &mut (),
        source: &mut dyn UploadSource,
        path: &str,
    ) -> Result<u64> {
        let mut data = Vec::new();
        source.read_to_end(&mut data).await.map_err(Error::Source)?;
        let size = data.len() as u64;

        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        let response = self
            .inner
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(body)
            .content_disposition("attachment")
            .send()
            .await
            .map_err(|e| Error::Transfer(Self::format_sdk_error(&e)))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = path,
            size,
            etag = response.e_tag().unwrap_or_default().trim_matches('"'),
            "Object stored"
        );

        Ok(size)
    }

    async fn release(&self, _session: ()) {}
}
