//! In-process KV backend
//!
//! A versioned map guarded by a lock, broadcasting change events to active
//! watchers. Suitable for local development, single-node deployments and
//! the test suite; state does not survive a process restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::backend::{KvBackend, KvEntry, WatchEvent, WatchOp, WatchStream};
use super::error::KvError;

const EVENT_CHANNEL_CAPACITY: usize = 4096;

struct SharedState {
    entries: RwLock<HashMap<String, (u64, Vec<u8>)>>,
    revision: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

pub struct MemoryKvBackend {
    state: Arc<SharedState>,
}

impl Default for MemoryKvBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(SharedState {
                entries: RwLock::new(HashMap::new()),
                revision: AtomicU64::new(0),
                events,
            }),
        }
    }

    fn snapshot_after(
        state: &SharedState,
        prefix: &str,
        resume_after: u64,
    ) -> Vec<(String, u64, Vec<u8>)> {
        let entries = state.entries.read();
        let mut matched: Vec<_> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter(|(_, (rev, _))| *rev > resume_after)
            .map(|(k, (rev, val))| (k.clone(), *rev, val.clone()))
            .collect();
        matched.sort_by_key(|(_, rev, _)| *rev);
        matched
    }
}

#[async_trait]
impl KvBackend for MemoryKvBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.state.entries.read().get(key).map(|(_, v)| v.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError> {
        let revision = self.state.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .entries
            .write()
            .insert(key.to_string(), (revision, value.clone()));
        let _ = self.state.events.send(WatchEvent {
            key: key.to_string(),
            op: WatchOp::Put,
            value: Some(value),
            revision,
        });
        Ok(revision)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let revision = self.state.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.entries.write().remove(key);
        let _ = self.state.events.send(WatchEvent {
            key: key.to_string(),
            op: WatchOp::Delete,
            value: None,
            revision,
        });
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>, KvError> {
        let entries = self.state.entries.read();
        Ok(entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, (rev, val))| KvEntry {
                key: k.clone(),
                value: val.clone(),
                revision: *rev,
            })
            .collect())
    }

    async fn watch(&self, prefix: &str, resume_after: u64) -> Result<WatchStream, KvError> {
        let state = Arc::clone(&self.state);
        let prefix = prefix.to_string();
        let mut rx = self.state.events.subscribe();

        let s = stream! {
            let mut last_revision = resume_after;
            for (key, rev, val) in MemoryKvBackend::snapshot_after(&state, &prefix, resume_after) {
                last_revision = last_revision.max(rev);
                yield Ok(WatchEvent { key, op: WatchOp::Put, value: Some(val), revision: rev });
            }

            loop {
                match rx.recv().await {
                    Ok(ev) if ev.key.starts_with(&prefix) && ev.revision > last_revision => {
                        last_revision = ev.revision;
                        yield Ok(ev);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Missed events while lagging: deletions of keys that no
                        // longer exist can't be reconstructed, only current state.
                        for (key, rev, val) in MemoryKvBackend::snapshot_after(&state, &prefix, last_revision) {
                            last_revision = last_revision.max(rev);
                            yield Ok(WatchEvent { key, op: WatchOp::Put, value: Some(val), revision: rev });
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(s))
    }

    async fn health_check(&self) -> Result<(), KvError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let backend = MemoryKvBackend::new();
        backend.put("subscription:alice", b"record-v1".to_vec()).await.unwrap();
        let value = backend.get("subscription:alice").await.unwrap();
        assert_eq!(value, Some(b"record-v1".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let backend = MemoryKvBackend::new();
        backend.put("k", b"v".to_vec()).await.unwrap();
        backend.delete("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_prefix_filters_by_prefix() {
        let backend = MemoryKvBackend::new();
        backend.put("subscription:a", b"1".to_vec()).await.unwrap();
        backend.put("subscription:b", b"2".to_vec()).await.unwrap();
        backend.put("realm:udm:users", b"3".to_vec()).await.unwrap();

        let entries = backend.list_prefix("subscription:").await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn watch_replays_history_then_tails_live_updates() {
        let backend = MemoryKvBackend::new();
        backend.put("subscription:a", b"1".to_vec()).await.unwrap();

        let mut stream = backend.watch("subscription:", 0).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.key, "subscription:a");
        assert_eq!(first.op, WatchOp::Put);

        backend.put("subscription:b", b"2".to_vec()).await.unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.key, "subscription:b");
    }

    #[tokio::test]
    async fn watch_resumes_after_given_revision() {
        let backend = MemoryKvBackend::new();
        let rev1 = backend.put("subscription:a", b"1".to_vec()).await.unwrap();
        backend.put("subscription:b", b"2".to_vec()).await.unwrap();

        let mut stream = backend.watch("subscription:", rev1).await.unwrap();
        let only = stream.next().await.unwrap().unwrap();
        assert_eq!(only.key, "subscription:b");
    }
}
