//! Logging wrapper for blob stores

use super::{BlobStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Logs every store operation with its key, duration and outcome
pub struct LoggingStore {
    inner: Arc<dyn BlobStore>,
    backend: &'static str,
}

impl LoggingStore {
    pub fn new(inner: Arc<dyn BlobStore>, backend: &'static str) -> Self {
        Self { inner, backend }
    }

    fn record<T>(&self, op: &str, key: &str, start: Instant, result: &Result<T, StoreError>) {
        let duration = start.elapsed();
        match result {
            Ok(_) => {
                tracing::debug!(
                    backend = self.backend,
                    op,
                    key = %key,
                    duration_ms = %duration.as_millis(),
                    "Blob store operation completed"
                );
            }
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(
                    backend = self.backend,
                    op,
                    key = %key,
                    duration_ms = %duration.as_millis(),
                    "Blob not found"
                );
            }
            Err(e) => {
                tracing::error!(
                    backend = self.backend,
                    op,
                    key = %key,
                    duration_ms = %duration.as_millis(),
                    error = %e,
                    "Blob store operation failed"
                );
            }
        }
    }
}

#[async_trait]
impl BlobStore for LoggingStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        self.record("get", key, start, &result);
        result
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.put(key, data).await;
        self.record("put", key, start, &result);
        result
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.inner.delete(key).await;
        self.record("delete", key, start, &result);
        result
    }
}
