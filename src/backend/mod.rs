//! Object-storage backend abstraction
//!
//! The upload client never talks to a storage SDK directly. It asks a
//! [`ConnectionFactory`] for a [`Connection`] built from per-job credentials
//! and drives the bucket and upload protocol through that trait object.
//!
//! # Implementations
//!
//! - [`S3ConnectionFactory`]: AWS S3 and S3-compatible services (feature `s3-native`)
//! - [`mock::MockFactory`]: in-memory backend that records every call (tests)
//!
//! # Example Implementation
//!
//! ```ignore
//! use orbit_portability::backend::{Connection, ConnectionFactory, BackendResult, Credentials};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct MyFactory;
//!
//! #[async_trait]
//! impl ConnectionFactory for MyFactory {
//!     async fn create_connection(
//!         &self,
//!         credentials: &Credentials,
//!     ) -> BackendResult<Arc<dyn Connection>> {
//!         // Build a client for credentials.routing_hint
//!     }
//! }
//! ```

pub mod error;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

#[cfg(feature = "s3-native")]
mod s3;

pub use error::{BackendError, BackendResult};
pub use types::{bucket_name_for, CompletedPart, Credentials, MultipartSession, BUCKET_SUFFIX};

#[cfg(feature = "s3-native")]
pub use s3::{S3Connection, S3ConnectionFactory};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Live handle to an object-storage backend
///
/// # Thread Safety
///
/// Uploads for one job run concurrently against a single shared connection,
/// so implementors must tolerate concurrent calls.
#[async_trait]
pub trait Connection: Send + Sync {
    /// List the names of all buckets visible to this connection
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Forbidden` if the identity is rejected.
    async fn list_buckets(&self) -> BackendResult<Vec<String>>;

    /// Create a bucket
    ///
    /// # Errors
    ///
    /// Returns `BackendError::BucketAlreadyExists` if another account owns the name.
    async fn create_bucket(&self, bucket: &str) -> BackendResult<()>;

    /// Write a whole object in one request, returning its version id
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes)
        -> BackendResult<Option<String>>;

    /// Open a multipart upload session for `key`
    async fn start_multipart(&self, bucket: &str, key: &str) -> BackendResult<MultipartSession>;

    /// Upload one part of an open session
    async fn upload_part(
        &self,
        session: &MultipartSession,
        part_number: i32,
        data: Bytes,
    ) -> BackendResult<CompletedPart>;

    /// Assemble the uploaded parts, returning the version id of the object
    ///
    /// `parts` must be in part-number order.
    async fn complete_multipart(
        &self,
        session: &MultipartSession,
        parts: &[CompletedPart],
    ) -> BackendResult<Option<String>>;

    /// Release the connection
    async fn close(&self);
}

/// Produces backend connections from per-job credentials
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Build a live connection for the given credentials
    async fn create_connection(&self, credentials: &Credentials)
        -> BackendResult<Arc<dyn Connection>>;
}
