/*!
 * Error types for Orbit portability uploads
 */

use crate::backend::BackendError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Failures surfaced by the upload client, the client cache and importers
///
/// Backend failures are translated into exactly one of these kinds at the
/// upload client boundary. Only [`TransferError::Service`] is worth retrying.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Invalid construction parameters or configuration file
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend rejected the credentials; the client has been closed
    #[error("Invalid credentials for {routing_hint}: {source}")]
    Credentials {
        routing_hint: String,
        #[source]
        source: BackendError,
    },

    /// Any other backend or transfer failure
    #[error("{context}: {source}")]
    Service {
        context: String,
        #[source]
        source: BackendError,
    },

    /// Upload attempted before a successful `init`
    #[error("Upload client is not initialized")]
    NotInitialized,

    /// `init` attempted on a client closed by a credentials failure
    #[error("Upload client is closed after a credentials failure")]
    Closed,

    /// The source item for an upload could not be found
    #[error("Resource missing for item {item_id}: {source}")]
    ItemResourceMissing {
        item_id: String,
        #[source]
        source: io::Error,
    },

    /// An extension was asked for an importer it does not provide
    #[error("{service} does not support {vertical}")]
    UnsupportedVertical { service: String, vertical: String },
}

impl TransferError {
    /// Wrap a backend failure as a service error with context
    pub fn service<S: Into<String>>(context: S, source: BackendError) -> Self {
        TransferError::Service {
            context: context.into(),
            source,
        }
    }

    /// Check if the caller may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Service { .. })
    }

    /// Check if fresh credentials are needed before retrying
    pub fn is_credentials_error(&self) -> bool {
        matches!(self, TransferError::Credentials { .. })
    }
}
