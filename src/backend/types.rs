//! Types shared across backend implementations

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Per-job access credentials for an object-storage backend
///
/// The routing hint is the destination service name. It selects the
/// bucket (see [`bucket_name_for`]) and may select connection parameters.
#[derive(Clone)]
pub struct Credentials {
    /// Access key id
    pub key_id: String,

    /// Secret access key
    pub secret: SecretString,

    /// Destination service name
    pub routing_hint: String,
}

impl Credentials {
    /// Create credentials from their parts
    pub fn new(
        key_id: impl Into<String>,
        secret: impl Into<String>,
        routing_hint: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            secret: SecretString::from(secret.into()),
            routing_hint: routing_hint.into(),
        }
    }

    /// Expose the secret for handing to a backend SDK
    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Bucket this job's uploads go to
    pub fn bucket_name(&self) -> String {
        bucket_name_for(&self.routing_hint)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("secret", &"[REDACTED]")
            .field("routing_hint", &self.routing_hint)
            .finish()
    }
}

/// Suffix appended to the routing hint to name the destination bucket
pub const BUCKET_SUFFIX: &str = "-data-transfer-bucket";

/// Derive the destination bucket name for a routing hint
///
/// Pre-existing buckets are matched by this exact name, so the format must
/// not change.
pub fn bucket_name_for(routing_hint: &str) -> String {
    format!("{}{}", routing_hint, BUCKET_SUFFIX)
}

/// Handle to an open multipart upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartSession {
    /// Destination bucket
    pub bucket: String,

    /// Destination object key
    pub key: String,

    /// Backend-issued session token
    pub upload_id: String,
}

/// Receipt for one uploaded part, needed to complete the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number (1-based)
    pub part_number: i32,

    /// Backend tag identifying the stored part
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: i32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}
