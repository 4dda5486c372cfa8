//! Service provider descriptors
//!
//! A provider is described by its OAuth configuration, which tells the
//! transfer host which scopes to request per data vertical, and by a
//! transfer extension, which hands out importers once initialized.

use crate::error::{Result, TransferError};
use crate::importer::{Importer, ItemSource, TempFileStore, VideosImporter};
use crate::upload::ClientCache;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error};

/// Category of user data moved in a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataVertical {
    Photos,
    Videos,
    SocialPosts,
    Notes,
    Calendar,
}

impl DataVertical {
    pub const ALL: [DataVertical; 5] = [
        DataVertical::Photos,
        DataVertical::Videos,
        DataVertical::SocialPosts,
        DataVertical::Notes,
        DataVertical::Calendar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataVertical::Photos => "PHOTOS",
            DataVertical::Videos => "VIDEOS",
            DataVertical::SocialPosts => "SOCIAL_POSTS",
            DataVertical::Notes => "NOTES",
            DataVertical::Calendar => "CALENDAR",
        }
    }
}

impl fmt::Display for DataVertical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a transfer, used to pick OAuth scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Export,
    Import,
}

/// OAuth endpoints and scopes for a service
pub trait OAuthConfig: Send + Sync {
    /// Name of the service, used to look up app credentials
    fn service_name(&self) -> &str;

    fn auth_url(&self) -> &str;

    fn token_url(&self) -> &str;

    /// Scopes needed to export each vertical
    fn export_scopes(&self) -> BTreeMap<DataVertical, BTreeSet<String>>;

    /// Scopes needed to import each vertical
    fn import_scopes(&self) -> BTreeMap<DataVertical, BTreeSet<String>>;

    /// Scopes for one vertical in one direction; empty if unsupported
    fn scopes_for(&self, vertical: DataVertical, direction: TransferDirection) -> BTreeSet<String> {
        let scopes = match direction {
            TransferDirection::Export => self.export_scopes(),
            TransferDirection::Import => self.import_scopes(),
        };
        scopes.get(&vertical).cloned().unwrap_or_default()
    }
}

const ICPSR_SERVICE: &str = "ICPSR";

/// OAuth configuration for ICPSR
#[derive(Debug, Clone, Copy, Default)]
pub struct IcpsrOAuthConfig;

impl IcpsrOAuthConfig {
    fn scopes(scope: &str) -> BTreeMap<DataVertical, BTreeSet<String>> {
        DataVertical::ALL
            .iter()
            .map(|v| (*v, BTreeSet::from([scope.to_string()])))
            .collect()
    }
}

impl OAuthConfig for IcpsrOAuthConfig {
    fn service_name(&self) -> &str {
        ICPSR_SERVICE
    }

    fn auth_url(&self) -> &str {
        "https://www.icpsr.com/auth"
    }

    fn token_url(&self) -> &str {
        "https://auth.icpsr.com/api/auth"
    }

    fn export_scopes(&self) -> BTreeMap<DataVertical, BTreeSet<String>> {
        Self::scopes("db.read")
    }

    fn import_scopes(&self) -> BTreeMap<DataVertical, BTreeSet<String>> {
        Self::scopes("db.write")
    }
}

/// Shared services handed to an extension on initialization
#[derive(Clone)]
pub struct ExtensionContext {
    pub cache: Arc<ClientCache>,
    pub source: Arc<dyn ItemSource>,
    pub temp_store: TempFileStore,
}

impl ExtensionContext {
    pub fn new(cache: Arc<ClientCache>, source: Arc<dyn ItemSource>) -> Self {
        Self {
            cache,
            source,
            temp_store: TempFileStore::new(),
        }
    }

    pub fn with_temp_store(mut self, temp_store: TempFileStore) -> Self {
        self.temp_store = temp_store;
        self
    }
}

/// Plugs a service's importers into the transfer host
pub trait TransferExtension: Send + Sync {
    fn service_id(&self) -> &str;

    /// Wire the extension to shared services; later calls are ignored
    fn initialize(&self, context: ExtensionContext);

    /// Importer for a vertical
    ///
    /// # Errors
    ///
    /// `TransferError::Configuration` before `initialize`, and
    /// `TransferError::UnsupportedVertical` for verticals the service does
    /// not import.
    fn importer_for(&self, vertical: DataVertical) -> Result<Arc<dyn Importer>>;
}

/// Transfer extension for ICPSR; imports videos only
#[derive(Default)]
pub struct IcpsrTransferExtension {
    videos: OnceLock<Arc<VideosImporter>>,
}

impl IcpsrTransferExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.videos.get().is_some()
    }
}

impl TransferExtension for IcpsrTransferExtension {
    fn service_id(&self) -> &str {
        ICPSR_SERVICE
    }

    fn initialize(&self, context: ExtensionContext) {
        let importer = VideosImporter::with_temp_store(
            context.cache,
            context.source,
            context.temp_store,
        );
        if self.videos.set(Arc::new(importer)).is_err() {
            error!(service = ICPSR_SERVICE, "Transfer extension already initialized");
            return;
        }
        debug!(service = ICPSR_SERVICE, "Transfer extension initialized");
    }

    fn importer_for(&self, vertical: DataVertical) -> Result<Arc<dyn Importer>> {
        let videos = self.videos.get().ok_or_else(|| {
            TransferError::Configuration(format!(
                "{} transfer extension is not initialized",
                ICPSR_SERVICE
            ))
        })?;

        match vertical {
            DataVertical::Videos => Ok(Arc::clone(videos) as Arc<dyn Importer>),
            other => Err(TransferError::UnsupportedVertical {
                service: ICPSR_SERVICE.to_string(),
                vertical: other.to_string(),
            }),
        }
    }
}
