//! In-process queue backend
//!
//! Backs local development, single-node deployments and the test suite.
//! A process crash loses all queued messages; for durability across
//! restarts or multiple processes, use the Redis backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::backend::{QueueBackend, QueueMessage, QueueStats};
use super::error::QueueError;

struct Entry {
    seq: u64,
    payload: Vec<u8>,
}

/// Per-durable cursor and in-flight tracking for one stream.
#[derive(Default)]
struct DurableState {
    /// Smallest sequence number not yet delivered for the first time.
    next_seq: u64,
    /// Delivered but not yet acked: seq -> delivery time.
    pending: HashMap<u64, Instant>,
    /// Nak'd sequence numbers queued for immediate redelivery, in order.
    redeliver: VecDeque<u64>,
}

#[derive(Default)]
struct StreamState {
    messages: VecDeque<Entry>,
    next_seq: u64,
    durables: HashMap<String, DurableState>,
}

struct SharedState {
    streams: RwLock<HashMap<String, StreamState>>,
    notifiers: RwLock<HashMap<String, Arc<Notify>>>,
}

/// In-memory implementation of [`QueueBackend`].
pub struct MemoryQueueBackend {
    state: Arc<SharedState>,
}

impl Default for MemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueueBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState {
                streams: RwLock::new(HashMap::new()),
                notifiers: RwLock::new(HashMap::new()),
            }),
        }
    }

    fn notifier(&self, stream: &str) -> Arc<Notify> {
        if let Some(n) = self.state.notifiers.read().get(stream) {
            return Arc::clone(n);
        }
        let mut notifiers = self.state.notifiers.write();
        Arc::clone(
            notifiers
                .entry(stream.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Try to deliver up to `max_count` messages without blocking.
    /// Returns an empty vec if nothing is currently ready.
    fn try_fetch(&self, stream: &str, durable: &str, max_count: usize) -> Vec<QueueMessage> {
        let mut streams = self.state.streams.write();
        let Some(stream_state) = streams.get_mut(stream) else {
            return vec![];
        };
        let durable_state = stream_state.durables.entry(durable.to_string()).or_default();
        let now = Instant::now();
        let mut out = Vec::new();

        while out.len() < max_count {
            let Some(seq) = durable_state.redeliver.pop_front() else {
                break;
            };
            if let Some(entry) = stream_state.messages.iter().find(|e| e.seq == seq) {
                durable_state.pending.insert(seq, now);
                out.push(QueueMessage {
                    seq,
                    payload: entry.payload.clone(),
                });
            }
        }

        if out.len() < max_count {
            for entry in &stream_state.messages {
                if out.len() >= max_count {
                    break;
                }
                if entry.seq < durable_state.next_seq {
                    continue;
                }
                if durable_state.pending.contains_key(&entry.seq) {
                    continue;
                }
                durable_state.pending.insert(entry.seq, now);
                durable_state.next_seq = entry.seq + 1;
                out.push(QueueMessage {
                    seq: entry.seq,
                    payload: entry.payload.clone(),
                });
            }
        }

        out
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn create_stream(&self, stream: &str) -> Result<(), QueueError> {
        self.state
            .streams
            .write()
            .entry(stream.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_stream(&self, stream: &str) -> Result<(), QueueError> {
        self.state.streams.write().remove(stream);
        self.state.notifiers.write().remove(stream);
        Ok(())
    }

    async fn publish(&self, stream: &str, payload: &[u8]) -> Result<u64, QueueError> {
        let seq = {
            let mut streams = self.state.streams.write();
            let stream_state = streams.entry(stream.to_string()).or_default();
            let seq = stream_state.next_seq;
            stream_state.next_seq += 1;
            stream_state.messages.push_back(Entry {
                seq,
                payload: payload.to_vec(),
            });
            seq
        };
        self.notifier(stream).notify_waiters();
        Ok(seq)
    }

    async fn fetch(
        &self,
        stream: &str,
        durable: &str,
        max_count: usize,
        timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let batch = self.try_fetch(stream, durable, max_count);
            if !batch.is_empty() {
                return Ok(batch);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(vec![]);
            }
            let notifier = self.notifier(stream);
            let notified = notifier.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return Ok(vec![]),
            }
        }
    }

    async fn ack(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError> {
        let mut streams = self.state.streams.write();
        if let Some(stream_state) = streams.get_mut(stream)
            && let Some(durable_state) = stream_state.durables.get_mut(durable)
        {
            durable_state.pending.remove(&seq);
        }
        Ok(())
    }

    async fn in_progress(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError> {
        let mut streams = self.state.streams.write();
        if let Some(stream_state) = streams.get_mut(stream)
            && let Some(durable_state) = stream_state.durables.get_mut(durable)
            && let Some(delivered_at) = durable_state.pending.get_mut(&seq)
        {
            *delivered_at = Instant::now();
        }
        Ok(())
    }

    async fn nak(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError> {
        let mut streams = self.state.streams.write();
        if let Some(stream_state) = streams.get_mut(stream)
            && let Some(durable_state) = stream_state.durables.get_mut(durable)
            && durable_state.pending.remove(&seq).is_some()
        {
            durable_state.redeliver.push_back(seq);
        }
        drop(streams);
        self.notifier(stream).notify_waiters();
        Ok(())
    }

    async fn reclaim(
        &self,
        stream: &str,
        durable: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let mut streams = self.state.streams.write();
        let Some(stream_state) = streams.get_mut(stream) else {
            return Ok(vec![]);
        };
        let Some(durable_state) = stream_state.durables.get_mut(durable) else {
            return Ok(vec![]);
        };

        let now = Instant::now();
        let idle_seqs: Vec<u64> = durable_state
            .pending
            .iter()
            .filter(|(_, delivered_at)| now.duration_since(**delivered_at) >= min_idle)
            .map(|(&seq, _)| seq)
            .take(count)
            .collect();

        let mut claimed = Vec::new();
        for seq in idle_seqs {
            if let Some(entry) = stream_state.messages.iter().find(|e| e.seq == seq) {
                durable_state.pending.insert(seq, now);
                claimed.push(QueueMessage {
                    seq,
                    payload: entry.payload.clone(),
                });
            }
        }
        Ok(claimed)
    }

    async fn delete_message(&self, stream: &str, seq: u64) -> Result<(), QueueError> {
        let mut streams = self.state.streams.write();
        if let Some(stream_state) = streams.get_mut(stream) {
            stream_state.messages.retain(|e| e.seq != seq);
            for durable_state in stream_state.durables.values_mut() {
                durable_state.pending.remove(&seq);
            }
        }
        Ok(())
    }

    async fn stats(&self, stream: &str, durable: &str) -> Result<QueueStats, QueueError> {
        let streams = self.state.streams.read();
        let Some(stream_state) = streams.get(stream) else {
            return Ok(QueueStats::default());
        };
        let Some(durable_state) = stream_state.durables.get(durable) else {
            return Ok(QueueStats {
                length: stream_state.messages.len() as u64,
                ..Default::default()
            });
        };
        let now = Instant::now();
        let oldest_pending_ms = durable_state
            .pending
            .values()
            .map(|delivered_at| now.duration_since(*delivered_at).as_millis() as u64)
            .max();
        Ok(QueueStats {
            length: stream_state.messages.len() as u64,
            pending: durable_state.pending.len() as u64,
            oldest_pending_ms,
        })
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_fetch_delivers_in_order() {
        let backend = MemoryQueueBackend::new();
        backend.publish("incoming", b"one").await.unwrap();
        backend.publish("incoming", b"two").await.unwrap();

        let batch = backend
            .fetch("incoming", "core", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, b"one");
        assert_eq!(batch[1].payload, b"two");
    }

    #[tokio::test]
    async fn fetch_returns_empty_on_timeout() {
        let backend = MemoryQueueBackend::new();
        let batch = backend
            .fetch("empty", "core", 10, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn ack_is_idempotent() {
        let backend = MemoryQueueBackend::new();
        backend.publish("s", b"m").await.unwrap();
        let batch = backend
            .fetch("s", "d", 1, Duration::from_millis(50))
            .await
            .unwrap();
        let seq = batch[0].seq;
        backend.ack("s", "d", seq).await.unwrap();
        backend.ack("s", "d", seq).await.unwrap();
    }

    #[tokio::test]
    async fn nak_requeues_for_immediate_redelivery() {
        let backend = MemoryQueueBackend::new();
        backend.publish("s", b"m").await.unwrap();
        let batch = backend
            .fetch("s", "d", 1, Duration::from_millis(50))
            .await
            .unwrap();
        let seq = batch[0].seq;
        backend.nak("s", "d", seq).await.unwrap();

        let redelivered = backend
            .fetch("s", "d", 1, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].seq, seq);
    }

    #[tokio::test]
    async fn unacked_message_is_reclaimable_after_min_idle() {
        let backend = MemoryQueueBackend::new();
        backend.publish("s", b"m").await.unwrap();
        backend
            .fetch("s", "d", 1, Duration::from_millis(50))
            .await
            .unwrap();

        let claimed = backend
            .reclaim("s", "d", Duration::from_millis(0), 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
    }

    #[tokio::test]
    async fn delete_message_removes_from_stream_and_pending() {
        let backend = MemoryQueueBackend::new();
        backend.publish("s", b"m").await.unwrap();
        let batch = backend
            .fetch("s", "d", 1, Duration::from_millis(50))
            .await
            .unwrap();
        backend.delete_message("s", batch[0].seq).await.unwrap();

        let stats = backend.stats("s", "d").await.unwrap();
        assert_eq!(stats.length, 0);
        assert_eq!(stats.pending, 0);
    }
}
