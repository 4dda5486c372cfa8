//! Importers moving portability items into object storage
//!
//! An importer receives a container of items for a job, pulls each item's
//! bytes from an [`ItemSource`], stages them in a temporary file and hands
//! the file to the job's [`UploadClient`](crate::upload::UploadClient).
//! Per-item work runs through an [`IdempotentExecutor`] so retried jobs skip
//! items that already landed and one bad item does not sink the job.

mod executor;
mod source;
mod videos;

pub use executor::{
    IdempotentExecutor, InMemoryIdempotentExecutor, ItemError, ItemFuture, ItemImportResult,
};
pub use source::{DirectoryItemSource, ItemSource, ItemStream, TempFileStore};
pub use videos::{video_key, VideosImporter};

use crate::backend::Credentials;
use crate::error::Result;
use crate::upload::JobId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single video in a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoModel {
    pub data_id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Where the source keeps the bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
}

impl VideoModel {
    pub fn new(data_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data_id: data_id.into(),
            name: name.into(),
            description: None,
            content_url: None,
            encoding_format: None,
            album_id: None,
        }
    }

    pub fn with_content_url(mut self, url: impl Into<String>) -> Self {
        self.content_url = Some(url.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named collection of videos
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAlbum {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Videos handed to an importer in one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideosContainer {
    #[serde(default)]
    pub albums: Vec<VideoAlbum>,
    #[serde(default)]
    pub videos: Vec<VideoModel>,
}

impl VideosContainer {
    pub fn new(videos: Vec<VideoModel>) -> Self {
        Self {
            albums: Vec::new(),
            videos,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

/// Payload of an import call, one variant per supported vertical
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContainerResource {
    Videos(VideosContainer),
}

/// Imports one vertical's items for a job
#[async_trait]
pub trait Importer: Send + Sync {
    /// Import every item in `data`
    ///
    /// Per-item failures are recorded in `executor`; only failures that
    /// affect the whole job, such as the upload client failing to
    /// initialize, are returned.
    async fn import_item(
        &self,
        job_id: JobId,
        executor: &dyn IdempotentExecutor,
        credentials: &Credentials,
        data: Option<&ContainerResource>,
    ) -> Result<()>;
}
