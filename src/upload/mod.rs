//! Adaptive upload client and per-job client cache
//!
//! [`UploadClient`] provisions the destination bucket for a routing hint and
//! uploads files with a single write or a multipart session depending on
//! size. [`ClientCache`] keeps one initialized client per job so the bucket
//! check and credential validation happen once, not once per item.
//!
//! # Example
//!
//! ```no_run
//! use orbit_portability::backend::{Credentials, S3ConnectionFactory};
//! use orbit_portability::config::S3BackendConfig;
//! use orbit_portability::upload::ClientCache;
//! use std::path::Path;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = ClientCache::new(Arc::new(S3ConnectionFactory::new(S3BackendConfig::default())));
//!     let credentials = Credentials::new("key-id", "secret", "icpsr");
//!
//!     let client = cache.get_or_create(Uuid::new_v4(), &credentials).await?;
//!     client.upload_file("Video Transfer/1.mp4", Path::new("1.mp4")).await?;
//!     Ok(())
//! }
//! ```

mod cache;
mod client;
mod parts;

pub use cache::{ClientCache, JobId};
pub use client::{ClientStatus, UploadClient};
pub use parts::{part_count, partition, UploadPart};
