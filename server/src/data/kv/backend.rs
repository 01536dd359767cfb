//! KV backend trait definition
//!
//! A versioned key→bytes store with per-key change history. Every write
//! carries a monotonically increasing revision number; `watch` replays all
//! matching entries with revision greater than the resume point before
//! switching to live tailing, so a caller that persists the last revision
//! it saw can resume without missing or duplicating updates.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::KvError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub key: String,
    pub op: WatchOp,
    pub value: Option<Vec<u8>>,
    pub revision: u64,
}

#[derive(Debug, Clone)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
}

pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent, KvError>> + Send>>;

#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Write a value, returning the new revision.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// List all entries whose key starts with `prefix`, used by the
    /// subscription registry's full-rescan reconciliation.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>, KvError>;

    /// Historical-then-live-tailing watch over all keys starting with
    /// `prefix`. `resume_after` is the last revision the caller already
    /// processed (0 to see the entire history).
    async fn watch(&self, prefix: &str, resume_after: u64) -> Result<WatchStream, KvError>;

    async fn health_check(&self) -> Result<(), KvError>;

    fn backend_name(&self) -> &'static str;
}
