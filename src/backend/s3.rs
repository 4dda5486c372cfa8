//! S3 backend implementation
//!
//! Implements the connection contract on top of the official AWS SDK. Works
//! against AWS S3 and S3-compatible services (MinIO, LocalStack) through a
//! custom endpoint.

use super::error::{is_auth_status, BackendError, BackendResult};
use super::types::{CompletedPart, Credentials, MultipartSession};
use super::{Connection, ConnectionFactory};
use crate::config::S3BackendConfig;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials as AwsCredentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart as AwsCompletedPart,
    CreateBucketConfiguration,
};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Error codes S3 uses when it rejects the caller's identity
const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "AllAccessDisabled",
];

/// Builds S3 connections from per-job credentials
///
/// # Example
///
/// ```no_run
/// use orbit_portability::backend::{ConnectionFactory, Credentials, S3ConnectionFactory};
/// use orbit_portability::config::S3BackendConfig;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let factory = S3ConnectionFactory::new(S3BackendConfig::default());
///     let credentials = Credentials::new("AKIA...", "secret", "icpsr");
///     let connection = factory.create_connection(&credentials).await?;
///     let buckets = connection.list_buckets().await?;
///     println!("{} buckets visible", buckets.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct S3ConnectionFactory {
    config: S3BackendConfig,
}

impl S3ConnectionFactory {
    pub fn new(config: S3BackendConfig) -> Self {
        Self { config }
    }

    /// Build the AWS SDK S3 client for one set of credentials
    async fn build_aws_client(&self, credentials: &Credentials) -> AwsS3Client {
        let region_provider = if let Some(region_str) = &self.config.region {
            RegionProviderChain::first_try(Region::new(region_str.clone()))
        } else {
            RegionProviderChain::default_provider()
        };

        let aws_credentials = AwsCredentials::new(
            &credentials.key_id,
            credentials.expose_secret(),
            None,
            None,
            "orbit-portability",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .credentials_provider(aws_credentials)
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(endpoint) = self.config.endpoint_for(&credentials.routing_hint) {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        // Required for MinIO, LocalStack
        if self.config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(self.config.timeout_seconds))
            .build();
        s3_config_builder = s3_config_builder.timeout_config(timeout_config);

        AwsS3Client::from_conf(s3_config_builder.build())
    }
}

#[async_trait]
impl ConnectionFactory for S3ConnectionFactory {
    async fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> BackendResult<Arc<dyn Connection>> {
        let client = self.build_aws_client(credentials).await;
        debug!(
            routing_hint = %credentials.routing_hint,
            key_id = %credentials.key_id,
            "Created S3 connection"
        );
        Ok(Arc::new(S3Connection {
            client,
            region: self.config.region.clone(),
        }))
    }
}

/// Live S3 connection
///
/// The SDK client is internally reference counted and safe to share between
/// concurrent uploads.
#[derive(Clone)]
pub struct S3Connection {
    client: AwsS3Client,
    region: Option<String>,
}

impl S3Connection {
    /// Bucket location constraint; us-east-1 must be left unset
    fn location_constraint(&self) -> Option<CreateBucketConfiguration> {
        let region = self.region.as_deref()?;
        if region == "us-east-1" {
            return None;
        }
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        )
    }
}

#[async_trait]
impl Connection for S3Connection {
    async fn list_buckets(&self) -> BackendResult<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify("ListBuckets", e))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(|n| n.to_string()))
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> BackendResult<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if let Some(configuration) = self.location_constraint() {
            request = request.create_bucket_configuration(configuration);
        }

        request.send().await.map_err(|e| {
            if e.as_service_error()
                .is_some_and(CreateBucketError::is_bucket_already_exists)
            {
                BackendError::BucketAlreadyExists {
                    bucket: bucket.to_string(),
                }
            } else {
                classify("CreateBucket", e)
            }
        })?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> BackendResult<Option<String>> {
        let response = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify("PutObject", e))?;

        Ok(response.version_id().map(|s| s.to_string()))
    }

    async fn start_multipart(&self, bucket: &str, key: &str) -> BackendResult<MultipartSession> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("CreateMultipartUpload", e))?;

        let upload_id = response
            .upload_id()
            .ok_or_else(|| BackendError::MissingField {
                operation: "CreateMultipartUpload".to_string(),
                field: "UploadId".to_string(),
            })?
            .to_string();

        Ok(MultipartSession {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
        })
    }

    async fn upload_part(
        &self,
        session: &MultipartSession,
        part_number: i32,
        data: Bytes,
    ) -> BackendResult<CompletedPart> {
        let response = self
            .client
            .upload_part()
            .bucket(&session.bucket)
            .key(&session.key)
            .upload_id(&session.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify("UploadPart", e))?;

        let etag = response.e_tag().ok_or_else(|| BackendError::MissingField {
            operation: "UploadPart".to_string(),
            field: "ETag".to_string(),
        })?;

        Ok(CompletedPart::new(part_number, etag))
    }

    async fn complete_multipart(
        &self,
        session: &MultipartSession,
        parts: &[CompletedPart],
    ) -> BackendResult<Option<String>> {
        let completed_parts: Vec<AwsCompletedPart> = parts
            .iter()
            .map(|p| {
                AwsCompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&session.bucket)
            .key(&session.key)
            .upload_id(&session.upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await
            .map_err(|e| classify("CompleteMultipartUpload", e))?;

        Ok(response.version_id().map(|s| s.to_string()))
    }

    async fn close(&self) {
        // The SDK client releases its connection pool on drop
        debug!("Closing S3 connection");
    }
}

/// Convert an SDK error into a backend error, separating auth failures
fn classify<E>(operation: &str, error: SdkError<E, HttpResponse>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = error.raw_response().map(|r| r.status().as_u16());
    match &error {
        SdkError::ServiceError(context) => {
            let code = context.err().code().unwrap_or("Unknown").to_string();
            let message = context
                .err()
                .message()
                .map(|m| m.to_string())
                .unwrap_or_else(|| DisplayErrorContext(&error).to_string());

            if status.is_some_and(is_auth_status) || AUTH_ERROR_CODES.contains(&code.as_str()) {
                BackendError::Forbidden {
                    operation: operation.to_string(),
                    message: format!("{}: {}", code, message),
                }
            } else {
                BackendError::Service { code, message }
            }
        }
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            BackendError::Network(format!(
                "{} failed: {}",
                operation,
                DisplayErrorContext(&error)
            ))
        }
        _ => BackendError::service("Unknown", DisplayErrorContext(&error).to_string()),
    }
}
