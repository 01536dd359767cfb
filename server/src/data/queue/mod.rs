//! Message queue module
//!
//! Durable append-only streams with pluggable backends:
//! - In-memory (default) - single process, used for development and tests
//! - Redis - Redis Streams, for multi-node deployment

mod backend;
mod error;
mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use backend::{QueueBackend, QueueMessage, QueueStats};
pub use error::QueueError;

use memory::MemoryQueueBackend;

use crate::core::config::QueueBackendType;

/// Queue service providing typed access to the queue backend.
///
/// Wraps the underlying backend and exposes both a raw-bytes API and an
/// envelope-level API (JSON) on top of it, plus the structural stream
/// operations used by the registry and pre-fill controller.
pub struct QueueService {
    backend: Arc<dyn QueueBackend>,
}

impl std::fmt::Debug for QueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl QueueService {
    pub async fn new(kind: QueueBackendType, redis_url: &str) -> Result<Self, QueueError> {
        let backend: Arc<dyn QueueBackend> = match kind {
            QueueBackendType::Memory => {
                tracing::debug!("initializing in-memory queue backend");
                Arc::new(MemoryQueueBackend::new())
            }
            QueueBackendType::Redis => {
                if redis_url.is_empty() {
                    return Err(QueueError::Config("redis_url required for Redis backend".into()));
                }
                Arc::new(redis::RedisQueueBackend::new(redis_url).await?)
            }
        };
        Ok(Self { backend })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Release any held resources. Connection pools drop themselves;
    /// this exists as a stable shutdown hook and a final health probe.
    pub async fn close(&self) {
        if let Err(e) = self.backend.health_check().await {
            tracing::debug!(error = %e, "queue backend unreachable during shutdown");
        }
    }

    pub async fn create_stream(&self, stream: &str) -> Result<(), QueueError> {
        self.backend.create_stream(stream).await
    }

    pub async fn delete_stream(&self, stream: &str) -> Result<(), QueueError> {
        self.backend.delete_stream(stream).await
    }

    pub async fn publish_bytes(&self, stream: &str, payload: &[u8]) -> Result<u64, QueueError> {
        self.backend.publish(stream, payload).await
    }

    pub async fn publish_envelope<T: Serialize + Sync>(
        &self,
        stream: &str,
        value: &T,
    ) -> Result<u64, QueueError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| QueueError::Operation(e.to_string()))?;
        self.backend.publish(stream, &bytes).await
    }

    pub async fn fetch_bytes(
        &self,
        stream: &str,
        durable: &str,
        max_count: usize,
        timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.backend.fetch(stream, durable, max_count, timeout).await
    }

    pub async fn fetch_envelopes<T: DeserializeOwned>(
        &self,
        stream: &str,
        durable: &str,
        max_count: usize,
        timeout: Duration,
    ) -> Result<Vec<(u64, T)>, QueueError> {
        let messages = self.backend.fetch(stream, durable, max_count, timeout).await?;
        messages
            .into_iter()
            .map(|m| {
                let value = serde_json::from_slice(&m.payload)
                    .map_err(|e| QueueError::Operation(e.to_string()))?;
                Ok((m.seq, value))
            })
            .collect()
    }

    pub async fn ack(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError> {
        self.backend.ack(stream, durable, seq).await
    }

    pub async fn in_progress(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError> {
        self.backend.in_progress(stream, durable, seq).await
    }

    pub async fn nak(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError> {
        self.backend.nak(stream, durable, seq).await
    }

    pub async fn reclaim(
        &self,
        stream: &str,
        durable: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.backend.reclaim(stream, durable, min_idle, count).await
    }

    pub async fn delete_message(&self, stream: &str, seq: u64) -> Result<(), QueueError> {
        self.backend.delete_message(stream, seq).await
    }

    pub async fn stats(&self, stream: &str, durable: &str) -> Result<QueueStats, QueueError> {
        self.backend.stats(stream, durable).await
    }

    pub async fn health_check(&self) -> Result<(), QueueError> {
        self.backend.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_round_trips_envelope() {
        let svc = QueueService::new(QueueBackendType::Memory, "")
            .await
            .unwrap();
        svc.create_stream("incoming").await.unwrap();
        svc.publish_envelope("incoming", &serde_json::json!({"realm": "udm", "topic": "users"}))
            .await
            .unwrap();

        let batch: Vec<(u64, serde_json::Value)> = svc
            .fetch_envelopes("incoming", "dispatcher", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].1["realm"], "udm");
    }

    #[tokio::test]
    async fn redis_backend_requires_url() {
        let err = QueueService::new(QueueBackendType::Redis, "").await.unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
    }
}
