//! Error types for object-storage backend connections
//!
//! Every backend implementation reports failures through [`BackendError`].
//! The upload client only needs two answers from an error: did the backend
//! reject the identity, and did bucket creation collide with a name owned by
//! someone else. Everything else is carried through opaquely for diagnostics.

use std::io;
use thiserror::Error;

/// Result type alias for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors reported by a backend connection
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend rejected the identity or its permissions (HTTP 401/403 class)
    #[error("Access forbidden on {operation}: {message}")]
    Forbidden { operation: String, message: String },

    /// Bucket name is already claimed by a different owner
    #[error("Bucket already exists and is owned by another account: {bucket}")]
    BucketAlreadyExists { bucket: String },

    /// Backend service error with its error code
    #[error("Service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Request never produced a service response
    #[error("Network error: {0}")]
    Network(String),

    /// Backend response lacked a field the protocol requires
    #[error("Missing field in {operation} response: {field}")]
    MissingField { operation: String, field: String },

    /// Local I/O error while preparing a request
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    /// Create a service error with an explicit code
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Check if the backend refused the caller's identity or permissions
    pub fn is_auth_error(&self) -> bool {
        matches!(self, BackendError::Forbidden { .. })
    }

    /// Check if bucket creation hit a name owned by another account
    pub fn is_bucket_collision(&self) -> bool {
        matches!(self, BackendError::BucketAlreadyExists { .. })
    }
}

/// Check if an HTTP status belongs to the auth/forbidden class
pub(crate) fn is_auth_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}
