//! Queue backend trait definition
//!
//! A durable append-only log with per-stream sequence numbers and a
//! single named durable reader per stream. Unlike a general consumer-group
//! fanout, relaybus streams (`incoming`, `subscription:<name>`,
//! `prefill:<name>`) each have exactly one logical reader — the durable
//! name identifies that reader's cursor so it survives process restarts.

use std::time::Duration;

use async_trait::async_trait;

use super::error::QueueError;

/// A message delivered from a stream, tagged with its sequence number for
/// acknowledgement.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Monotonic sequence number, unique within its stream.
    pub seq: u64,
    /// Opaque payload bytes (a serialized message envelope).
    pub payload: Vec<u8>,
}

/// Point-in-time counters for a stream/durable pair, used by health and
/// admin endpoints.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// Total messages currently retained in the stream.
    pub length: u64,
    /// Messages delivered to the durable but not yet acked.
    pub pending: u64,
    /// Age in milliseconds of the oldest unacked message, if any.
    pub oldest_pending_ms: Option<u64>,
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Create the stream if it doesn't already exist. Idempotent.
    async fn create_stream(&self, stream: &str) -> Result<(), QueueError>;

    /// Delete a stream and all of its durable cursors.
    async fn delete_stream(&self, stream: &str) -> Result<(), QueueError>;

    /// Append a message, returning its sequence number. At-least-once and
    /// totally ordered per stream.
    async fn publish(&self, stream: &str, payload: &[u8]) -> Result<u64, QueueError>;

    /// Pull up to `max_count` undelivered (or nak'd/redeliverable) messages
    /// for `durable`, waiting up to `timeout` for at least one to become
    /// available. Returns an empty list on deadline, never an error.
    async fn fetch(
        &self,
        stream: &str,
        durable: &str,
        max_count: usize,
        timeout: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge successful processing. Idempotent — acking an already
    /// acked or unknown sequence number is a silent no-op.
    async fn ack(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError>;

    /// Extend the in-flight deadline for a delivered message without
    /// consuming it, for long-running handlers.
    async fn in_progress(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError>;

    /// Negative-acknowledge a delivered message, making it immediately
    /// eligible for redelivery to the same durable.
    async fn nak(&self, stream: &str, durable: &str, seq: u64) -> Result<(), QueueError>;

    /// Reclaim messages that have been pending longer than `min_idle`,
    /// for recovery after a crashed or stalled handler.
    async fn reclaim(
        &self,
        stream: &str,
        durable: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete a single message by sequence number, regardless of ack state.
    async fn delete_message(&self, stream: &str, seq: u64) -> Result<(), QueueError>;

    /// Statistics for monitoring and the health endpoint.
    async fn stats(&self, stream: &str, durable: &str) -> Result<QueueStats, QueueError>;

    /// Health check (validates connectivity).
    async fn health_check(&self) -> Result<(), QueueError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}
