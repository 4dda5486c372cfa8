//! Idempotent per-item execution

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::Mutex;
use tracing::warn;

/// Outcome of importing one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemImportResult {
    /// Version id of the stored object, if the backend reported one
    pub version_id: Option<String>,

    /// Bytes transferred
    pub bytes: u64,
}

/// Failure recorded for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub id: String,
    pub title: String,
    pub message: String,
    pub retryable: bool,
}

/// Deferred import of a single item
pub type ItemFuture<'a> = Pin<Box<dyn Future<Output = Result<ItemImportResult>> + Send + 'a>>;

/// Runs item imports at most once per id and keeps going past failures
#[async_trait]
pub trait IdempotentExecutor: Send + Sync {
    /// Run `import` unless `id` already succeeded; record failures instead of returning them
    async fn import_and_swallow_errors<'a>(
        &self,
        id: &str,
        title: &str,
        import: ItemFuture<'a>,
    ) -> Option<ItemImportResult>;

    /// Check if `id` already imported successfully
    async fn is_key_cached(&self, id: &str) -> bool;

    /// Failures recorded so far
    async fn errors(&self) -> Vec<ItemError>;
}

/// Idempotent executor keeping results in memory for one job
#[derive(Debug, Default)]
pub struct InMemoryIdempotentExecutor {
    completed: Mutex<HashMap<String, ItemImportResult>>,
    errors: Mutex<HashMap<String, ItemError>>,
}

impl InMemoryIdempotentExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotentExecutor for InMemoryIdempotentExecutor {
    async fn import_and_swallow_errors<'a>(
        &self,
        id: &str,
        title: &str,
        import: ItemFuture<'a>,
    ) -> Option<ItemImportResult> {
        if let Some(previous) = self.completed.lock().await.get(id) {
            return Some(previous.clone());
        }

        match import.await {
            Ok(result) => {
                self.errors.lock().await.remove(id);
                self.completed
                    .lock()
                    .await
                    .insert(id.to_string(), result.clone());
                Some(result)
            }
            Err(e) => {
                warn!(item_id = id, title, error = %e, "Item import failed");
                self.errors.lock().await.insert(
                    id.to_string(),
                    ItemError {
                        id: id.to_string(),
                        title: title.to_string(),
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    },
                );
                None
            }
        }
    }

    async fn is_key_cached(&self, id: &str) -> bool {
        self.completed.lock().await.contains_key(id)
    }

    async fn errors(&self) -> Vec<ItemError> {
        let mut errors: Vec<ItemError> = self.errors.lock().await.values().cloned().collect();
        errors.sort_by(|a, b| a.id.cmp(&b.id));
        errors
    }
}
