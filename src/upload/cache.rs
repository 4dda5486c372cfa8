//! Per-job upload client cache

use super::client::UploadClient;
use crate::backend::{ConnectionFactory, Credentials};
use crate::config::UploadConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;
use uuid::Uuid;

/// Identifier of a transfer job
pub type JobId = Uuid;

/// Hands out one initialized [`UploadClient`] per job
///
/// The first request for a job builds and initializes a client; later
/// requests return the same instance without touching the backend. Each job
/// has its own once-cell, so concurrent first requests run `init` once and
/// a failed `init` leaves nothing behind for the next attempt to trip over.
pub struct ClientCache {
    factory: Arc<dyn ConnectionFactory>,
    config: UploadConfig,
    clients: Mutex<HashMap<JobId, Arc<OnceCell<Arc<UploadClient>>>>>,
}

impl ClientCache {
    /// Create a cache using the default upload configuration (20 MiB / 5 MiB)
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            config: UploadConfig::default(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Create a cache with an explicit upload configuration
    pub fn with_config(factory: Arc<dyn ConnectionFactory>, config: UploadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            factory,
            config,
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// Upload configuration given to every new client
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Get the job's client, creating and initializing it on first use
    ///
    /// # Errors
    ///
    /// Propagates the `init` failure (credentials or service) unchanged.
    /// Nothing is cached on failure, so a later call may retry.
    pub async fn get_or_create(
        &self,
        job_id: JobId,
        credentials: &Credentials,
    ) -> Result<Arc<UploadClient>> {
        let cell = Arc::clone(self.clients.lock().await.entry(job_id).or_default());

        let client = cell
            .get_or_try_init(|| async {
                let mut client = UploadClient::new(Arc::clone(&self.factory), self.config)?;
                client.init(credentials).await?;
                info!(
                    job_id = %job_id,
                    bucket = client.bucket().unwrap_or_default(),
                    "Initialized upload client for job"
                );
                Ok::<_, crate::error::TransferError>(Arc::new(client))
            })
            .await?;

        Ok(Arc::clone(client))
    }

    /// Cached client for a job, if one has been initialized
    pub async fn get(&self, job_id: &JobId) -> Option<Arc<UploadClient>> {
        self.clients
            .lock()
            .await
            .get(job_id)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of initialized clients
    pub async fn len(&self) -> usize {
        self.clients
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Check if no client has been initialized
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
