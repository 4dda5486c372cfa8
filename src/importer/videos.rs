//! Video importer

use super::executor::{IdempotentExecutor, ItemImportResult};
use super::source::{ItemSource, TempFileStore};
use super::{ContainerResource, Importer, VideoModel};
use crate::backend::{BackendError, Credentials};
use crate::error::{Result, TransferError};
use crate::upload::{ClientCache, JobId, UploadClient};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

/// Folder every imported video lands in
const VIDEO_FOLDER: &str = "Video Transfer";

/// Object key for an imported video
pub fn video_key(data_id: &str) -> String {
    format!("{}/{}.mp4", VIDEO_FOLDER, data_id)
}

/// Uploads videos into the job's transfer bucket
pub struct VideosImporter {
    cache: Arc<ClientCache>,
    source: Arc<dyn ItemSource>,
    temp_store: TempFileStore,
}

impl VideosImporter {
    pub fn new(cache: Arc<ClientCache>, source: Arc<dyn ItemSource>) -> Self {
        Self::with_temp_store(cache, source, TempFileStore::new())
    }

    pub fn with_temp_store(
        cache: Arc<ClientCache>,
        source: Arc<dyn ItemSource>,
        temp_store: TempFileStore,
    ) -> Self {
        Self {
            cache,
            source,
            temp_store,
        }
    }

    async fn import_video(
        &self,
        job_id: JobId,
        client: &UploadClient,
        video: &VideoModel,
    ) -> Result<ItemImportResult> {
        let stream = match self.source.open(job_id, video).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(job_id = %job_id, item_id = %video.data_id, "Video resource was missing");
                return Err(TransferError::ItemResourceMissing {
                    item_id: video.data_id.clone(),
                    source: e,
                });
            }
            Err(e) => {
                return Err(TransferError::service(
                    format!("Failed to open video {}", video.data_id),
                    BackendError::Io(e),
                ))
            }
        };

        let staged = self
            .temp_store
            .materialize(stream, &video.data_id, ".mp4")
            .await
            .map_err(|e| {
                TransferError::service(
                    format!("Failed to stage video {}", video.data_id),
                    BackendError::Io(e),
                )
            })?;

        let bytes = tokio::fs::metadata(&staged)
            .await
            .map_err(|e| {
                TransferError::service(
                    format!("Failed to stat staged video {}", video.data_id),
                    BackendError::Io(e),
                )
            })?
            .len();

        let key = video_key(&video.data_id);
        let version_id = client.upload_file(&key, &staged).await?;
        debug!(job_id = %job_id, key = %key, bytes, "Imported video");

        Ok(ItemImportResult { version_id, bytes })
    }
}

#[async_trait]
impl Importer for VideosImporter {
    async fn import_item(
        &self,
        job_id: JobId,
        executor: &dyn IdempotentExecutor,
        credentials: &Credentials,
        data: Option<&ContainerResource>,
    ) -> Result<()> {
        let container = match data {
            Some(ContainerResource::Videos(container)) if !container.is_empty() => container,
            _ => return Ok(()),
        };

        let client = self.cache.get_or_create(job_id, credentials).await?;

        for video in &container.videos {
            executor
                .import_and_swallow_errors(
                    &video.data_id,
                    &video.name,
                    Box::pin(self.import_video(job_id, &client, video)),
                )
                .await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockCall, MockFactory, MockFailure};
    use crate::config::UploadConfig;
    use crate::importer::{DirectoryItemSource, InMemoryIdempotentExecutor, VideosContainer};
    use crate::logging::testing::CapturedLogs;
    use tempfile::TempDir;
    use tracing::Level;
    use uuid::Uuid;

    const BUCKET: &str = "icpsr-data-transfer-bucket";

    struct Fixture {
        backend: MockBackend,
        source_dir: TempDir,
        staging_dir: TempDir,
        importer: VideosImporter,
    }

    fn fixture(config: UploadConfig) -> Fixture {
        let backend = MockBackend::new();
        let cache = ClientCache::with_config(Arc::new(MockFactory::new(backend.clone())), config)
            .unwrap();
        let source_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let importer = VideosImporter::with_temp_store(
            Arc::new(cache),
            Arc::new(DirectoryItemSource::new(source_dir.path())),
            TempFileStore::in_dir(staging_dir.path()),
        );
        Fixture {
            backend,
            source_dir,
            staging_dir,
            importer,
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("keyId", "appKey", "icpsr")
    }

    fn videos(ids: &[&str]) -> ContainerResource {
        ContainerResource::Videos(VideosContainer::new(
            ids.iter()
                .map(|id| VideoModel::new(*id, format!("Video {}", id)))
                .collect(),
        ))
    }

    #[test]
    fn test_video_key() {
        assert_eq!(video_key("abc"), "Video Transfer/abc.mp4");
    }

    #[tokio::test]
    async fn test_empty_container_is_noop() {
        let f = fixture(UploadConfig::default());
        let executor = InMemoryIdempotentExecutor::new();

        f.importer
            .import_item(Uuid::new_v4(), &executor, &credentials(), None)
            .await
            .unwrap();
        f.importer
            .import_item(Uuid::new_v4(), &executor, &credentials(), Some(&videos(&[])))
            .await
            .unwrap();

        assert!(f.backend.calls().is_empty());
        assert_eq!(f.backend.connections(), 0);
    }

    #[tokio::test]
    async fn test_imports_videos() {
        let f = fixture(UploadConfig::default());
        f.backend.set_version_id("v-1");
        std::fs::write(f.source_dir.path().join("a"), b"first video").unwrap();
        std::fs::write(f.source_dir.path().join("b"), b"second").unwrap();
        let executor = InMemoryIdempotentExecutor::new();
        let job = Uuid::new_v4();

        f.importer
            .import_item(job, &executor, &credentials(), Some(&videos(&["a", "b"])))
            .await
            .unwrap();

        assert_eq!(
            f.backend.object(BUCKET, "Video Transfer/a.mp4").unwrap(),
            &b"first video"[..]
        );
        assert_eq!(
            f.backend.object(BUCKET, "Video Transfer/b.mp4").unwrap(),
            &b"second"[..]
        );
        assert!(executor.is_key_cached("a").await);
        assert!(executor.is_key_cached("b").await);
        assert!(executor.errors().await.is_empty());
        assert_eq!(f.backend.connections(), 1);

        // Staged files are removed once uploaded
        assert_eq!(std::fs::read_dir(f.staging_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_large_video_uses_multipart() {
        let f = fixture(UploadConfig::new(10, 4).unwrap());
        std::fs::write(f.source_dir.path().join("big"), b"0123456789abcd").unwrap();
        let executor = InMemoryIdempotentExecutor::new();

        f.importer
            .import_item(Uuid::new_v4(), &executor, &credentials(), Some(&videos(&["big"])))
            .await
            .unwrap();

        assert_eq!(f.backend.count(|c| matches!(c, MockCall::UploadPart { .. })), 4);
        assert_eq!(
            f.backend.object(BUCKET, "Video Transfer/big.mp4").unwrap(),
            &b"0123456789abcd"[..]
        );
    }

    #[tokio::test]
    async fn test_missing_video_recorded_and_job_continues() {
        let f = fixture(UploadConfig::default());
        std::fs::write(f.source_dir.path().join("present"), b"ok").unwrap();
        let executor = InMemoryIdempotentExecutor::new();
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        f.importer
            .import_item(
                Uuid::new_v4(),
                &executor,
                &credentials(),
                Some(&videos(&["gone", "present"])),
            )
            .await
            .unwrap();

        let errors = executor.errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, "gone");
        assert!(!errors[0].retryable);
        assert!(executor.is_key_cached("present").await);
        assert!(f.backend.object(BUCKET, "Video Transfer/present.mp4").is_some());
        assert!(logs
            .messages()
            .iter()
            .any(|m| m == "Video resource was missing"));
        assert!(logs.count(Level::INFO) >= 1);
    }

    #[tokio::test]
    async fn test_upload_failure_recorded_as_retryable() {
        let f = fixture(UploadConfig::default());
        f.backend.fail_put(MockFailure::Service);
        std::fs::write(f.source_dir.path().join("a"), b"bytes").unwrap();
        let executor = InMemoryIdempotentExecutor::new();

        f.importer
            .import_item(Uuid::new_v4(), &executor, &credentials(), Some(&videos(&["a"])))
            .await
            .unwrap();

        let errors = executor.errors().await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].retryable);
    }

    #[tokio::test]
    async fn test_init_failure_fails_job() {
        let f = fixture(UploadConfig::default());
        f.backend.fail_list(MockFailure::Forbidden);
        std::fs::write(f.source_dir.path().join("a"), b"bytes").unwrap();
        let executor = InMemoryIdempotentExecutor::new();

        let err = f
            .importer
            .import_item(Uuid::new_v4(), &executor, &credentials(), Some(&videos(&["a"])))
            .await
            .unwrap_err();

        assert!(err.is_credentials_error());
        assert!(executor.errors().await.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_skips_imported_videos() {
        let f = fixture(UploadConfig::default());
        std::fs::write(f.source_dir.path().join("a"), b"bytes").unwrap();
        let executor = InMemoryIdempotentExecutor::new();
        let job = Uuid::new_v4();
        let data = videos(&["a"]);

        for _ in 0..2 {
            f.importer
                .import_item(job, &executor, &credentials(), Some(&data))
                .await
                .unwrap();
        }

        assert_eq!(f.backend.count(|c| matches!(c, MockCall::PutObject { .. })), 1);
        assert_eq!(f.backend.count(|c| *c == MockCall::ListBuckets), 1);
    }
}
