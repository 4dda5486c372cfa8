//! Upload client: bucket provisioning and upload strategy selection

use super::parts::{part_count, partition};
use crate::backend::{BackendError, CompletedPart, Connection, ConnectionFactory, Credentials};
use crate::config::UploadConfig;
use crate::error::{Result, TransferError};
use bytes::Bytes;
use std::fmt;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

/// Lifecycle stage of an [`UploadClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Constructed, `init` not yet successful
    Uninitialized,
    /// Bucket provisioned, uploads allowed
    Initialized,
    /// Credentials rejected; terminal
    Closed,
}

enum ClientState {
    Uninitialized,
    Initialized {
        connection: Arc<dyn Connection>,
        bucket: String,
    },
    Closed,
}

/// Uploads payloads into a per-service bucket
///
/// Payloads up to the configured threshold are written in one request;
/// larger payloads go through a sequential multipart session.
///
/// # Example
///
/// ```no_run
/// use orbit_portability::backend::{Credentials, S3ConnectionFactory};
/// use orbit_portability::config::{S3BackendConfig, UploadConfig};
/// use orbit_portability::upload::UploadClient;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let factory = Arc::new(S3ConnectionFactory::new(S3BackendConfig::default()));
///     let mut client = UploadClient::new(factory, UploadConfig::default())?;
///     client.init(&Credentials::new("key-id", "secret", "icpsr")).await?;
///
///     let version = client.upload_file("Video Transfer/42.mp4", Path::new("42.mp4")).await?;
///     println!("Stored version {:?}", version);
///     Ok(())
/// }
/// ```
pub struct UploadClient {
    factory: Arc<dyn ConnectionFactory>,
    config: UploadConfig,
    state: ClientState,
}

impl UploadClient {
    /// Create an uninitialized client
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Configuration` if the part size is zero.
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: UploadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            factory,
            config,
            state: ClientState::Uninitialized,
        })
    }

    /// Upload strategy parameters
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Current lifecycle stage
    pub fn status(&self) -> ClientStatus {
        match self.state {
            ClientState::Uninitialized => ClientStatus::Uninitialized,
            ClientState::Initialized { .. } => ClientStatus::Initialized,
            ClientState::Closed => ClientStatus::Closed,
        }
    }

    /// Destination bucket, once initialized
    pub fn bucket(&self) -> Option<&str> {
        match &self.state {
            ClientState::Initialized { bucket, .. } => Some(bucket.as_str()),
            _ => None,
        }
    }

    /// Connect with the given credentials and make sure the bucket exists
    ///
    /// Listing the buckets doubles as credential validation. If the bucket
    /// for the routing hint is already listed nothing is created.
    ///
    /// # Errors
    ///
    /// - `TransferError::Credentials` if the backend rejects the identity.
    ///   The connection is closed and the client becomes unusable.
    /// - `TransferError::Service` for any other listing or creation failure,
    ///   including a bucket name owned by another account. `init` may be
    ///   called again.
    /// - `TransferError::Closed` if a previous `init` was rejected.
    pub async fn init(&mut self, credentials: &Credentials) -> Result<()> {
        if matches!(self.state, ClientState::Closed) {
            return Err(TransferError::Closed);
        }

        let connection = self
            .factory
            .create_connection(credentials)
            .await
            .map_err(|e| TransferError::service("Failed to create backend connection", e))?;

        let buckets = match connection.list_buckets().await {
            Ok(buckets) => buckets,
            Err(e) if e.is_auth_error() => {
                connection.close().await;
                debug!(
                    routing_hint = %credentials.routing_hint,
                    key_id = %credentials.key_id,
                    error = %e,
                    "Credentials rejected while listing buckets; connection closed"
                );
                self.state = ClientState::Closed;
                return Err(TransferError::Credentials {
                    routing_hint: credentials.routing_hint.clone(),
                    source: e,
                });
            }
            Err(e) => return Err(TransferError::service("Failed to list buckets", e)),
        };

        let bucket = credentials.bucket_name();
        if buckets.iter().any(|b| *b == bucket) {
            debug!(bucket = %bucket, "Bucket already exists");
        } else {
            match connection.create_bucket(&bucket).await {
                Ok(()) => info!(bucket = %bucket, "Created bucket"),
                Err(e) if e.is_bucket_collision() => {
                    info!(
                        bucket = %bucket,
                        "Bucket name is already owned by another account"
                    );
                    return Err(TransferError::service(
                        format!("Bucket {} is not available", bucket),
                        e,
                    ));
                }
                Err(e) => {
                    return Err(TransferError::service(
                        format!("Failed to create bucket {}", bucket),
                        e,
                    ))
                }
            }
        }

        self.state = ClientState::Initialized { connection, bucket };
        Ok(())
    }

    /// Upload a local file under `key`, returning the stored version id
    ///
    /// Safe to call concurrently once initialized. Every failure is reported
    /// as `TransferError::Service`; a failed multipart upload leaves its
    /// session open.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::NotInitialized` before a successful `init`.
    pub async fn upload_file(&self, key: &str, path: &Path) -> Result<Option<String>> {
        let ClientState::Initialized { connection, bucket } = &self.state else {
            return Err(TransferError::NotInitialized);
        };

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| {
                TransferError::service(
                    format!("Failed to read size of {}", path.display()),
                    BackendError::Io(e),
                )
            })?
            .len();

        if size <= self.config.size_threshold_bytes {
            self.upload_single(connection.as_ref(), bucket, key, path, size)
                .await
        } else {
            self.upload_multipart(connection.as_ref(), bucket, key, path, size)
                .await
        }
    }

    async fn upload_single(
        &self,
        connection: &dyn Connection,
        bucket: &str,
        key: &str,
        path: &Path,
        size: u64,
    ) -> Result<Option<String>> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            TransferError::service(
                format!("Failed to read {}", path.display()),
                BackendError::Io(e),
            )
        })?;

        debug!(bucket, key, size, "Uploading in a single request");
        connection
            .put_object(bucket, key, Bytes::from(data))
            .await
            .map_err(|e| TransferError::service(format!("Failed to upload {}", key), e))
    }

    async fn upload_multipart(
        &self,
        connection: &dyn Connection,
        bucket: &str,
        key: &str,
        path: &Path,
        size: u64,
    ) -> Result<Option<String>> {
        let part_size = self.config.part_size_bytes;
        let io_error = |e: std::io::Error| {
            TransferError::service(
                format!("Failed to read {}", path.display()),
                BackendError::Io(e),
            )
        };

        let mut file = File::open(path).await.map_err(io_error)?;

        let session = connection.start_multipart(bucket, key).await.map_err(|e| {
            TransferError::service(format!("Failed to start multipart upload of {}", key), e)
        })?;

        let total_parts = part_count(size, part_size);
        debug!(
            bucket,
            key,
            size,
            parts = total_parts,
            upload_id = %session.upload_id,
            "Started multipart upload"
        );

        let mut completed: Vec<CompletedPart> = Vec::with_capacity(total_parts as usize);
        for part in partition(size, part_size) {
            file.seek(SeekFrom::Start(part.offset))
                .await
                .map_err(io_error)?;
            let mut buffer = vec![0u8; part.length as usize];
            file.read_exact(&mut buffer).await.map_err(io_error)?;

            let receipt = connection
                .upload_part(&session, part.part_number(), Bytes::from(buffer))
                .await
                .map_err(|e| {
                    TransferError::service(
                        format!(
                            "Failed to upload part {}/{} of {}",
                            part.index, total_parts, key
                        ),
                        e,
                    )
                })?;
            completed.push(receipt);
        }

        let version = connection
            .complete_multipart(&session, &completed)
            .await
            .map_err(|e| {
                TransferError::service(format!("Failed to complete multipart upload of {}", key), e)
            })?;

        info!(bucket, key, size, parts = total_parts, "Completed multipart upload");
        Ok(version)
    }
}

impl fmt::Debug for UploadClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadClient")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("bucket", &self.bucket())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockCall, MockFactory, MockFailure};
    use crate::logging::testing::CapturedLogs;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tracing::Level;

    const KEY_ID: &str = "keyId";
    const APP_KEY: &str = "appKey";
    const EXPORT_SERVICE: &str = "exp-serv";
    const FILE_KEY: &str = "fileKey";
    const VALID_BUCKET_NAME: &str = "exp-serv-data-transfer-bucket";

    fn credentials() -> Credentials {
        Credentials::new(KEY_ID, APP_KEY, EXPORT_SERVICE)
    }

    fn client_for(backend: &MockBackend, threshold: u64, part_size: u64) -> UploadClient {
        let factory = Arc::new(MockFactory::new(backend.clone()));
        UploadClient::new(factory, UploadConfig::new(threshold, part_size).unwrap()).unwrap()
    }

    fn default_client(backend: &MockBackend) -> UploadClient {
        client_for(backend, 1000, 500)
    }

    fn payload(len: usize) -> (NamedTempFile, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        (file, data)
    }

    fn is_create(call: &MockCall) -> bool {
        matches!(call, MockCall::CreateBucket(_))
    }

    fn is_part(call: &MockCall) -> bool {
        matches!(call, MockCall::UploadPart { .. })
    }

    fn is_multipart(call: &MockCall) -> bool {
        matches!(
            call,
            MockCall::StartMultipart { .. }
                | MockCall::UploadPart { .. }
                | MockCall::CompleteMultipart { .. }
        )
    }

    #[test]
    fn test_wrong_part_size() {
        let factory = Arc::new(MockFactory::default());
        let config = UploadConfig {
            size_threshold_bytes: 10,
            part_size_bytes: 0,
        };
        let err = UploadClient::new(factory, config).unwrap_err();
        assert!(matches!(err, TransferError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_init_bucket_name_matches() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        let mut client = default_client(&backend);

        client.init(&credentials()).await.unwrap();

        assert_eq!(backend.count(is_create), 0);
        assert_eq!(client.status(), ClientStatus::Initialized);
        assert_eq!(client.bucket(), Some(VALID_BUCKET_NAME));
    }

    #[tokio::test]
    async fn test_init_bucket_created() {
        let backend = MockBackend::with_buckets(["invalid-name"]);
        let mut client = default_client(&backend);

        client.init(&credentials()).await.unwrap();

        assert_eq!(backend.count(is_create), 1);
        assert!(backend.buckets().contains(&VALID_BUCKET_NAME.to_string()));
        assert_eq!(client.status(), ClientStatus::Initialized);
    }

    #[tokio::test]
    async fn test_init_bucket_name_exists() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let backend = MockBackend::new();
        backend.fail_create(MockFailure::BucketCollision);
        let mut client = default_client(&backend);

        let err = client.init(&credentials()).await.unwrap_err();

        assert!(matches!(err, TransferError::Service { .. }));
        assert!(!err.is_credentials_error());
        assert!(logs.count(Level::INFO) >= 1);
        assert_eq!(client.status(), ClientStatus::Uninitialized);
        assert_eq!(backend.count(|c| *c == MockCall::Close), 0);
    }

    #[tokio::test]
    async fn test_init_error_creating_bucket() {
        let backend = MockBackend::new();
        backend.fail_create(MockFailure::Service);
        let mut client = default_client(&backend);

        let err = client.init(&credentials()).await.unwrap_err();

        assert!(matches!(err, TransferError::Service { .. }));
        assert_eq!(client.status(), ClientStatus::Uninitialized);
    }

    #[tokio::test]
    async fn test_init_list_bucket_forbidden() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let backend = MockBackend::new();
        backend.fail_list(MockFailure::Forbidden);
        let mut client = default_client(&backend);

        let err = client.init(&credentials()).await.unwrap_err();

        assert!(err.is_credentials_error());
        assert_eq!(backend.count(|c| *c == MockCall::Close), 1);
        assert!(logs.count(Level::DEBUG) >= 1);
        assert_eq!(client.status(), ClientStatus::Closed);
        assert_eq!(backend.count(is_create), 0);
    }

    #[tokio::test]
    async fn test_init_after_close_rejected() {
        let backend = MockBackend::new();
        backend.fail_list(MockFailure::Forbidden);
        let mut client = default_client(&backend);

        assert!(client.init(&credentials()).await.is_err());
        let err = client.init(&credentials()).await.unwrap_err();

        assert!(matches!(err, TransferError::Closed));
        assert_eq!(backend.connections(), 1);
    }

    #[tokio::test]
    async fn test_init_list_service_error_allows_retry() {
        let backend = MockBackend::new();
        backend.fail_list(MockFailure::Service);
        let mut client = default_client(&backend);

        let err = client.init(&credentials()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(client.status(), ClientStatus::Uninitialized);
        assert_eq!(backend.count(|c| *c == MockCall::Close), 0);
    }

    #[tokio::test]
    async fn test_upload_file_non_initialized() {
        let backend = MockBackend::new();
        let client = default_client(&backend);
        let (file, _) = payload(10);

        let err = client.upload_file(FILE_KEY, file.path()).await.unwrap_err();

        assert!(matches!(err, TransferError::NotInitialized));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_file_after_failed_init() {
        let backend = MockBackend::new();
        backend.fail_list(MockFailure::Forbidden);
        let mut client = default_client(&backend);
        let _ = client.init(&credentials()).await;
        let (file, _) = payload(10);

        let err = client.upload_file(FILE_KEY, file.path()).await.unwrap_err();
        assert!(matches!(err, TransferError::NotInitialized));
    }

    #[tokio::test]
    async fn test_upload_file_single() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        backend.set_version_id("123");
        let mut client = default_client(&backend);
        client.init(&credentials()).await.unwrap();
        let (file, data) = payload(1000);

        let version = client.upload_file(FILE_KEY, file.path()).await.unwrap();

        assert_eq!(version.as_deref(), Some("123"));
        assert_eq!(backend.count(|c| matches!(c, MockCall::PutObject { .. })), 1);
        assert_eq!(backend.count(is_multipart), 0);
        assert_eq!(
            backend.object(VALID_BUCKET_NAME, FILE_KEY).unwrap().as_ref(),
            data.as_slice()
        );
    }

    #[tokio::test]
    async fn test_upload_file_single_exception() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        backend.fail_put(MockFailure::Service);
        let mut client = default_client(&backend);
        client.init(&credentials()).await.unwrap();
        let (file, _) = payload(10);

        let err = client.upload_file(FILE_KEY, file.path()).await.unwrap_err();
        assert!(matches!(err, TransferError::Service { .. }));
    }

    #[tokio::test]
    async fn test_upload_file_single_forbidden_is_service_error() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        backend.fail_put(MockFailure::Forbidden);
        let mut client = default_client(&backend);
        client.init(&credentials()).await.unwrap();
        let (file, _) = payload(10);

        let err = client.upload_file(FILE_KEY, file.path()).await.unwrap_err();
        assert!(matches!(err, TransferError::Service { .. }));
        assert_eq!(client.status(), ClientStatus::Initialized);
    }

    #[tokio::test]
    async fn test_upload_file_multipart() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        backend.set_version_id("123");
        let mut client = client_for(&backend, 500, 10);
        client.init(&credentials()).await.unwrap();
        let (file, data) = payload(1005);

        let version = client.upload_file(FILE_KEY, file.path()).await.unwrap();

        assert_eq!(version.as_deref(), Some("123"));
        assert_eq!(
            backend.count(|c| matches!(c, MockCall::StartMultipart { .. })),
            1
        );
        assert_eq!(backend.count(is_part), 101);
        assert_eq!(
            backend.count(|c| matches!(c, MockCall::CompleteMultipart { .. })),
            1
        );
        assert_eq!(backend.count(|c| matches!(c, MockCall::PutObject { .. })), 0);
        assert_eq!(
            backend.object(VALID_BUCKET_NAME, FILE_KEY).unwrap().as_ref(),
            data.as_slice()
        );
    }

    #[tokio::test]
    async fn test_multipart_part_sizes_and_order() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        let mut client = client_for(&backend, 500, 10);
        client.init(&credentials()).await.unwrap();
        let (file, _) = payload(1005);

        client.upload_file(FILE_KEY, file.path()).await.unwrap();

        let calls = backend.calls();
        let parts: Vec<(i32, usize)> = calls
            .iter()
            .filter_map(|c| match c {
                MockCall::UploadPart { part_number, len } => Some((*part_number, *len)),
                _ => None,
            })
            .collect();
        assert_eq!(parts.first(), Some(&(1, 10)));
        assert_eq!(parts.last(), Some(&(101, 5)));

        let completed = calls
            .iter()
            .find_map(|c| match c {
                MockCall::CompleteMultipart { parts } => Some(parts.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(completed, (1..=101).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn test_upload_file_multipart_exact_multiple() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        let mut client = client_for(&backend, 500, 10);
        client.init(&credentials()).await.unwrap();
        let (file, _) = payload(1000);

        client.upload_file(FILE_KEY, file.path()).await.unwrap();
        assert_eq!(backend.count(is_part), 100);
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        let mut client = client_for(&backend, 100, 10);
        client.init(&credentials()).await.unwrap();

        let (at_threshold, _) = payload(100);
        client.upload_file("a", at_threshold.path()).await.unwrap();
        assert_eq!(backend.count(is_multipart), 0);

        let (over_threshold, _) = payload(101);
        client.upload_file("b", over_threshold.path()).await.unwrap();
        assert_eq!(backend.count(is_part), 11);
    }

    #[tokio::test]
    async fn test_upload_file_multipart_exception() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        backend.fail_part(3);
        let mut client = client_for(&backend, 500, 125);
        client.init(&credentials()).await.unwrap();
        let (file, _) = payload(1000);

        let err = client.upload_file(FILE_KEY, file.path()).await.unwrap_err();

        assert!(matches!(err, TransferError::Service { .. }));
        assert_eq!(backend.count(is_part), 3);
        assert_eq!(
            backend.count(|c| matches!(c, MockCall::CompleteMultipart { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_service_error() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        let mut client = default_client(&backend);
        client.init(&credentials()).await.unwrap();

        let err = client
            .upload_file(FILE_KEY, Path::new("/nonexistent/payload.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Service { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_uploads_share_client() {
        let backend = MockBackend::with_buckets([VALID_BUCKET_NAME]);
        let mut client = client_for(&backend, 50, 10);
        client.init(&credentials()).await.unwrap();
        let client = Arc::new(client);

        let mut files = Vec::new();
        let mut tasks = Vec::new();
        for i in 0..8 {
            let (file, _) = payload(40 + i * 5);
            let path = file.path().to_path_buf();
            files.push(file);
            let client = Arc::clone(&client);
            tasks.push(tokio::spawn(async move {
                client.upload_file(&format!("item-{}", i), &path).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for i in 0..8 {
            let stored = backend
                .object(VALID_BUCKET_NAME, &format!("item-{}", i))
                .unwrap();
            assert_eq!(stored.len(), 40 + i * 5);
        }
    }
}
