//! In-memory backend for testing
//!
//! Stores buckets and objects in memory, records every call in order and can
//! be told to fail specific operations. Used by unit tests to count backend
//! round-trips without a real object store.

use super::error::{BackendError, BackendResult};
use super::types::{CompletedPart, Credentials, MultipartSession};
use super::{Connection, ConnectionFactory};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// A call received by the mock backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListBuckets,
    CreateBucket(String),
    PutObject { bucket: String, key: String, len: usize },
    StartMultipart { bucket: String, key: String },
    UploadPart { part_number: i32, len: usize },
    CompleteMultipart { parts: Vec<i32> },
    Close,
}

/// Failure the mock can inject into an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Identity rejected (HTTP 403 class)
    Forbidden,
    /// Bucket name owned by another account
    BucketCollision,
    /// Any other service failure
    Service,
}

impl MockFailure {
    fn to_error(self, operation: &str, bucket: &str) -> BackendError {
        match self {
            MockFailure::Forbidden => BackendError::Forbidden {
                operation: operation.to_string(),
                message: "403 Forbidden".to_string(),
            },
            MockFailure::BucketCollision => BackendError::BucketAlreadyExists {
                bucket: bucket.to_string(),
            },
            MockFailure::Service => {
                BackendError::service("InternalError", format!("{} failed", operation))
            }
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    buckets: Vec<String>,
    objects: HashMap<String, Bytes>,
    sessions: HashMap<String, (String, BTreeMap<i32, Bytes>)>,
    calls: Vec<MockCall>,
    connections: usize,
    next_upload_id: u64,
    fail_list: Option<MockFailure>,
    fail_create: Option<MockFailure>,
    fail_put: Option<MockFailure>,
    fail_part: Option<i32>,
    version_id: Option<String>,
}

/// In-memory object store that records calls
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create an empty backend with no buckets
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that already lists the given buckets
    pub fn with_buckets<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        backend.state.lock().unwrap().buckets = buckets.into_iter().map(Into::into).collect();
        backend
    }

    /// Make `list_buckets` fail
    pub fn fail_list(&self, failure: MockFailure) -> &Self {
        self.state.lock().unwrap().fail_list = Some(failure);
        self
    }

    /// Make `create_bucket` fail
    pub fn fail_create(&self, failure: MockFailure) -> &Self {
        self.state.lock().unwrap().fail_create = Some(failure);
        self
    }

    /// Make `put_object` fail
    pub fn fail_put(&self, failure: MockFailure) -> &Self {
        self.state.lock().unwrap().fail_put = Some(failure);
        self
    }

    /// Make `upload_part` fail for the given part number
    pub fn fail_part(&self, part_number: i32) -> &Self {
        self.state.lock().unwrap().fail_part = Some(part_number);
        self
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.fail_list = None;
        state.fail_create = None;
        state.fail_put = None;
        state.fail_part = None;
        drop(state);
        self
    }

    /// Version id reported by writes and completions
    pub fn set_version_id(&self, version_id: impl Into<String>) -> &Self {
        self.state.lock().unwrap().version_id = Some(version_id.into());
        self
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    /// Number of connections handed out by the factory
    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// Bucket names currently stored
    pub fn buckets(&self) -> Vec<String> {
        self.state.lock().unwrap().buckets.clone()
    }

    /// Stored object data, keyed by `bucket/key`
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&format!("{}/{}", bucket, key))
            .cloned()
    }

    fn record(&self, call: MockCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Connection for MockBackend {
    async fn list_buckets(&self) -> BackendResult<Vec<String>> {
        self.record(MockCall::ListBuckets);
        let state = self.state.lock().unwrap();
        if let Some(failure) = state.fail_list {
            return Err(failure.to_error("ListBuckets", ""));
        }
        Ok(state.buckets.clone())
    }

    async fn create_bucket(&self, bucket: &str) -> BackendResult<()> {
        self.record(MockCall::CreateBucket(bucket.to_string()));
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.fail_create {
            return Err(failure.to_error("CreateBucket", bucket));
        }
        state.buckets.push(bucket.to_string());
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> BackendResult<Option<String>> {
        self.record(MockCall::PutObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            len: data.len(),
        });
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.fail_put {
            return Err(failure.to_error("PutObject", bucket));
        }
        state.objects.insert(format!("{}/{}", bucket, key), data);
        Ok(state.version_id.clone())
    }

    async fn start_multipart(&self, bucket: &str, key: &str) -> BackendResult<MultipartSession> {
        self.record(MockCall::StartMultipart {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        state.next_upload_id += 1;
        let upload_id = format!("upload-{}", state.next_upload_id);
        state
            .sessions
            .insert(upload_id.clone(), (format!("{}/{}", bucket, key), BTreeMap::new()));
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
        self.record(MockCall::UploadPart {
            part_number,
            len: data.len(),
        });
        let mut state = self.state.lock().unwrap();
        if state.fail_part == Some(part_number) {
            return Err(MockFailure::Service.to_error("UploadPart", &session.bucket));
        }
        let (_, parts) = state
            .sessions
            .get_mut(&session.upload_id)
            .ok_or_else(|| BackendError::service("NoSuchUpload", session.upload_id.clone()))?;
        parts.insert(part_number, data);
        Ok(CompletedPart::new(part_number, format!("etag-{}", part_number)))
    }

    async fn complete_multipart(
        &self,
        session: &MultipartSession,
        parts: &[CompletedPart],
    ) -> BackendResult<Option<String>> {
        self.record(MockCall::CompleteMultipart {
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        let mut state = self.state.lock().unwrap();
        let (object_key, stored) = state
            .sessions
            .remove(&session.upload_id)
            .ok_or_else(|| BackendError::service("NoSuchUpload", session.upload_id.clone()))?;

        let mut assembled = BytesMut::new();
        for part in parts {
            let data = stored.get(&part.part_number).ok_or_else(|| {
                BackendError::service("InvalidPart", format!("part {}", part.part_number))
            })?;
            assembled.extend_from_slice(data);
        }
        state.objects.insert(object_key, assembled.freeze());
        Ok(state.version_id.clone())
    }

    async fn close(&self) {
        self.record(MockCall::Close);
    }
}

/// Factory handing out connections to a shared [`MockBackend`]
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    backend: MockBackend,
}

impl MockFactory {
    pub fn new(backend: MockBackend) -> Self {
        Self { backend }
    }

    /// The backend every connection talks to
    pub fn backend(&self) -> &MockBackend {
        &self.backend
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create_connection(
        &self,
        _credentials: &Credentials,
    ) -> BackendResult<Arc<dyn Connection>> {
        self.backend.state.lock().unwrap().connections += 1;
        Ok(Arc::new(self.backend.clone()))
    }
}
