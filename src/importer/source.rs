//! Per-item byte sources and temporary file materialization

use super::VideoModel;
use crate::upload::JobId;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Readable stream of one item's bytes
pub type ItemStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens the byte stream behind an item
///
/// Returns an `io::ErrorKind::NotFound` error when the item has vanished
/// at the source; importers record that item as missing and move on.
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn open(&self, job_id: JobId, video: &VideoModel) -> io::Result<ItemStream>;
}

/// Item source reading `content_url` as a path under a local directory
#[derive(Debug, Clone)]
pub struct DirectoryItemSource {
    root: PathBuf,
}

impl DirectoryItemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, video: &VideoModel) -> PathBuf {
        let relative = video.content_url.as_deref().unwrap_or(&video.data_id);
        self.root.join(relative.trim_start_matches('/'))
    }
}

#[async_trait]
impl ItemSource for DirectoryItemSource {
    async fn open(&self, _job_id: JobId, video: &VideoModel) -> io::Result<ItemStream> {
        let file = tokio::fs::File::open(self.resolve(video)).await?;
        Ok(Box::new(file))
    }
}

/// Writes item streams to temporary files so their exact size is known
///
/// Files are deleted when the returned [`TempPath`] is dropped.
#[derive(Debug, Clone, Default)]
pub struct TempFileStore {
    dir: Option<PathBuf>,
}

impl TempFileStore {
    /// Store temporary files in the system temp directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Store temporary files under `dir`
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Directory files are created in, if not the system default
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Drain `stream` into a new temporary file named after the item
    pub async fn materialize(
        &self,
        mut stream: ItemStream,
        data_id: &str,
        suffix: &str,
    ) -> io::Result<TempPath> {
        // Item ids may contain path separators
        let prefix: String = data_id
            .chars()
            .map(|c| if std::path::is_separator(c) { '_' } else { c })
            .collect();

        let mut builder = Builder::new();
        builder.prefix(&prefix).suffix(suffix);
        let temp = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let (std_file, path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);
        tokio::io::copy(&mut stream, &mut file).await?;
        file.flush().await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_materialize_writes_stream() {
        let dir = TempDir::new().unwrap();
        let store = TempFileStore::in_dir(dir.path());
        let stream: ItemStream = Box::new(&b"video bytes"[..]);

        let path = store.materialize(stream, "vid-1", ".mp4").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"video bytes");
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("vid-1"));
        assert!(name.ends_with(".mp4"));

        let kept = path.to_path_buf();
        drop(path);
        assert!(!kept.exists());
    }

    #[tokio::test]
    async fn test_materialize_sanitizes_prefix() {
        let dir = TempDir::new().unwrap();
        let store = TempFileStore::in_dir(dir.path());
        let stream: ItemStream = Box::new(&b"x"[..]);

        let path = store.materialize(stream, "albums/7", ".mp4").await.unwrap();
        assert_eq!(path.parent().unwrap(), dir.path());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("albums_7"));
    }

    #[tokio::test]
    async fn test_directory_source_missing_item() {
        let dir = TempDir::new().unwrap();
        let source = DirectoryItemSource::new(dir.path());
        let video = VideoModel::new("absent", "Absent");

        let err = source.open(Uuid::new_v4(), &video).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_directory_source_resolves_content_url() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"abc").unwrap();
        let source = DirectoryItemSource::new(dir.path());
        let video = VideoModel::new("v1", "Clip").with_content_url("/clip.mp4");

        let mut stream = source.open(Uuid::new_v4(), &video).await.unwrap();
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut buf)
            .await
            .unwrap();
        assert_eq!(buf, b"abc");
    }
}
