//! KV store module
//!
//! Versioned key-value storage with pluggable backends:
//! - In-memory (default) - single process, used for development and tests
//! - Redis - for multi-node deployment

mod backend;
mod error;
mod memory;
mod redis;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use backend::{KvBackend, KvEntry, WatchEvent, WatchOp, WatchStream};
pub use error::KvError;

use memory::MemoryKvBackend;

use crate::core::config::KvBackendType;

/// KV service providing typed access to the KV backend.
pub struct KvService {
    backend: Arc<dyn KvBackend>,
}

impl std::fmt::Debug for KvService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvService")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl KvService {
    pub async fn new(kind: KvBackendType, redis_url: &str) -> Result<Self, KvError> {
        let backend: Arc<dyn KvBackend> = match kind {
            KvBackendType::Memory => {
                tracing::debug!("initializing in-memory kv backend");
                Arc::new(MemoryKvBackend::new())
            }
            KvBackendType::Redis => {
                if redis_url.is_empty() {
                    return Err(KvError::Config("redis_url required for Redis backend".into()));
                }
                Arc::new(redis::RedisKvBackend::new(redis_url).await?)
            }
        };
        Ok(Self { backend })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub async fn close(&self) {
        if let Err(e) = self.backend.health_check().await {
            tracing::debug!(error = %e, "kv backend unreachable during shutdown");
        }
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.backend.get(key).await
    }

    pub async fn put_raw(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError> {
        self.backend.put(key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.backend.delete(key).await
    }

    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>, KvError> {
        self.backend.list_prefix(prefix).await
    }

    pub async fn watch(&self, prefix: &str, resume_after: u64) -> Result<WatchStream, KvError> {
        self.backend.watch(prefix, resume_after).await
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        match self.get_raw(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| KvError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<u64, KvError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| KvError::Serialization(e.to_string()))?;
        self.put_raw(key, bytes).await
    }

    pub async fn health_check(&self) -> Result<(), KvError> {
        self.backend.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Record {
        name: String,
    }

    #[tokio::test]
    async fn typed_put_then_get_round_trips() {
        let svc = KvService::new(KvBackendType::Memory, "").await.unwrap();
        svc.put("subscription:alice", &Record { name: "alice".into() })
            .await
            .unwrap();

        let value: Option<Record> = svc.get("subscription:alice").await.unwrap();
        assert_eq!(value, Some(Record { name: "alice".into() }));
    }

    #[tokio::test]
    async fn watch_delivers_put_events() {
        let svc = KvService::new(KvBackendType::Memory, "").await.unwrap();
        svc.put_raw("subscription:a", b"1".to_vec()).await.unwrap();

        let mut stream = svc.watch("subscription:", 0).await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.key, "subscription:a");
        assert_eq!(event.op, WatchOp::Put);
    }

    #[tokio::test]
    async fn redis_backend_requires_url() {
        let err = KvService::new(KvBackendType::Redis, "").await.unwrap_err();
        assert!(matches!(err, KvError::Config(_)));
    }
}
