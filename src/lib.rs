/*!
 * Orbit Portability - adaptive object-storage uploads for data transfer jobs
 *
 * - Per-service destination buckets provisioned on first use
 * - Single-request uploads for small files, multipart above a size threshold
 * - One initialized upload client per transfer job
 * - Video importer with idempotent per-item execution
 *
 * Version: 0.6.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod backend;
pub mod config;
pub mod error;
pub mod importer;
pub mod logging;
pub mod provider;
pub mod upload;

// Re-export commonly used types
pub use backend::{Connection, ConnectionFactory, Credentials};
pub use config::{PortabilityConfig, UploadConfig};
pub use error::{Result, TransferError};
pub use importer::{Importer, VideosImporter};
pub use provider::{DataVertical, IcpsrTransferExtension, TransferExtension};
pub use upload::{ClientCache, JobId, UploadClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
