//! Subscription Registry
//!
//! Owns subscription records and the realm:topic index in the KV store, and
//! keeps the dispatcher's in-memory routing table current via a periodic
//! full rescan (see `reconcile`) in addition to the live KV watch the
//! dispatcher consumes directly.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::constants::{
    KV_SUBSCRIPTION_PREFIX, STREAM_PREFILL_PREFIX, STREAM_SUBSCRIPTION_PREFIX,
};
use crate::data::error::RelayError;
use crate::data::kv::KvService;
use crate::data::queue::QueueService;
use crate::domain::{NewSubscription, PrefillStatus, Subscription};
use crate::utils::crypto::sha256_hex;

/// Key holding the sorted set of subscription names for a given
/// `realm:topic` pair, e.g. `index:udm:users/user`.
fn index_key(realm_topic: &str) -> String {
    format!("index:{realm_topic}")
}

fn subscription_key(name: &str) -> String {
    format!("{KV_SUBSCRIPTION_PREFIX}{name}")
}

fn subscription_stream(name: &str) -> String {
    format!("{STREAM_SUBSCRIPTION_PREFIX}{name}")
}

fn prefill_stream(name: &str) -> String {
    format!("{STREAM_PREFILL_PREFIX}{name}")
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct IndexEntry {
    names: BTreeSet<String>,
}

pub struct SubscriptionRegistry {
    kv: Arc<KvService>,
    queue: Arc<QueueService>,
}

impl SubscriptionRegistry {
    pub fn new(kv: Arc<KvService>, queue: Arc<QueueService>) -> Self {
        Self { kv, queue }
    }

    pub async fn create(&self, new_sub: NewSubscription) -> Result<Subscription, RelayError> {
        let key = subscription_key(&new_sub.name);
        if self.kv.get_raw(&key).await?.is_some() {
            return Err(RelayError::AlreadyExists(new_sub.name));
        }

        let sub = Subscription {
            name: new_sub.name.clone(),
            realms_topics: new_sub.realms_topics.clone(),
            request_prefill: new_sub.request_prefill,
            prefill_queue_status: PrefillStatus::Pending,
            password_hash: sha256_hex(&new_sub.password),
            created_at: Utc::now().to_rfc3339(),
        };

        self.kv.put(&key, &sub).await?;

        for realm_topic in sub.realm_topic_strings() {
            self.add_to_index(&realm_topic, &sub.name).await?;
        }

        self.queue.create_stream(&subscription_stream(&sub.name)).await?;
        if sub.request_prefill {
            self.queue.create_stream(&prefill_stream(&sub.name)).await?;
        }

        tracing::info!(subscription = %sub.name, prefill = sub.request_prefill, "subscription created");
        Ok(sub)
    }

    pub async fn get(&self, name: &str) -> Result<Subscription, RelayError> {
        self.kv
            .get(&subscription_key(name))
            .await?
            .ok_or_else(|| RelayError::NotFound(name.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Subscription>, RelayError> {
        let entries = self.kv.list_prefix(KV_SUBSCRIPTION_PREFIX).await?;
        let mut subs = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Ok(sub) = serde_json::from_slice::<Subscription>(&entry.value) {
                subs.push(sub);
            }
        }
        Ok(subs)
    }

    pub async fn delete(&self, name: &str) -> Result<(), RelayError> {
        let sub = self.get(name).await?;

        for realm_topic in sub.realm_topic_strings() {
            self.remove_from_index(&realm_topic, name).await?;
        }

        self.kv.delete(&subscription_key(name)).await?;
        self.queue.delete_stream(&subscription_stream(name)).await?;
        self.queue.delete_stream(&prefill_stream(name)).await?;

        tracing::info!(subscription = %name, "subscription deleted");
        Ok(())
    }

    pub async fn set_prefill_status(
        &self,
        name: &str,
        status: PrefillStatus,
    ) -> Result<Subscription, RelayError> {
        let mut sub = self.get(name).await?;
        sub.prefill_queue_status = sub.prefill_queue_status.advance_to(status)?;
        self.kv.put(&subscription_key(name), &sub).await?;
        Ok(sub)
    }

    /// All subscription names registered against an exact `realm:topic` pair.
    pub async fn subscribers_for(&self, realm_topic: &str) -> Result<Vec<String>, RelayError> {
        let entry: Option<IndexEntry> = self.kv.get(&index_key(realm_topic)).await?;
        Ok(entry.map(|e| e.names.into_iter().collect()).unwrap_or_default())
    }

    /// Full snapshot of the realm:topic routing table, used both to seed the
    /// dispatcher at startup and to repair it on a periodic rescan.
    pub async fn routing_snapshot(&self) -> Result<Vec<(String, Vec<String>)>, RelayError> {
        let subs = self.list().await?;
        let mut table: std::collections::HashMap<String, BTreeSet<String>> =
            std::collections::HashMap::new();
        for sub in subs {
            for realm_topic in sub.realm_topic_strings() {
                table.entry(realm_topic).or_default().insert(sub.name.clone());
            }
        }
        Ok(table
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect())
    }

    async fn add_to_index(&self, realm_topic: &str, name: &str) -> Result<(), RelayError> {
        let key = index_key(realm_topic);
        let mut entry: IndexEntry = self.kv.get(&key).await?.unwrap_or_default();
        entry.names.insert(name.to_string());
        self.kv.put(&key, &entry).await?;
        Ok(())
    }

    async fn remove_from_index(&self, realm_topic: &str, name: &str) -> Result<(), RelayError> {
        let key = index_key(realm_topic);
        let Some(mut entry) = self.kv.get::<IndexEntry>(&key).await? else {
            return Ok(());
        };
        entry.names.remove(name);
        if entry.names.is_empty() {
            self.kv.delete(&key).await?;
        } else {
            self.kv.put(&key, &entry).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{KvBackendType, QueueBackendType};

    async fn registry() -> SubscriptionRegistry {
        let kv = Arc::new(KvService::new(KvBackendType::Memory, "").await.unwrap());
        let queue = Arc::new(QueueService::new(QueueBackendType::Memory, "").await.unwrap());
        SubscriptionRegistry::new(kv, queue)
    }

    fn new_sub(name: &str) -> NewSubscription {
        NewSubscription {
            name: name.to_string(),
            realms_topics: vec![("udm".into(), "users/user".into())],
            request_prefill: true,
            password: "hunter2".into(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let reg = registry().await;
        let created = reg.create(new_sub("alice")).await.unwrap();
        assert_eq!(created.prefill_queue_status, PrefillStatus::Pending);

        let fetched = reg.get("alice").await.unwrap();
        assert_eq!(fetched.name, "alice");
        assert_ne!(fetched.password_hash, "hunter2");
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let reg = registry().await;
        reg.create(new_sub("alice")).await.unwrap();
        let err = reg.create(new_sub("alice")).await.unwrap_err();
        assert!(matches!(err, RelayError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn delete_removes_index_entry() {
        let reg = registry().await;
        reg.create(new_sub("alice")).await.unwrap();
        assert_eq!(reg.subscribers_for("udm:users/user").await.unwrap(), vec!["alice".to_string()]);

        reg.delete("alice").await.unwrap();
        assert!(reg.subscribers_for("udm:users/user").await.unwrap().is_empty());
        assert!(matches!(reg.get("alice").await.unwrap_err(), RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn index_shared_across_subscriptions() {
        let reg = registry().await;
        reg.create(new_sub("alice")).await.unwrap();
        reg.create(new_sub("bob")).await.unwrap();

        let mut names = reg.subscribers_for("udm:users/user").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);

        reg.delete("alice").await.unwrap();
        assert_eq!(reg.subscribers_for("udm:users/user").await.unwrap(), vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn prefill_status_is_forward_only() {
        let reg = registry().await;
        reg.create(new_sub("alice")).await.unwrap();
        reg.set_prefill_status("alice", PrefillStatus::Running).await.unwrap();
        let sub = reg.set_prefill_status("alice", PrefillStatus::Done).await.unwrap();
        assert_eq!(sub.prefill_queue_status, PrefillStatus::Done);

        let err = reg.set_prefill_status("alice", PrefillStatus::Running).await.unwrap_err();
        assert!(matches!(err, RelayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn routing_snapshot_reflects_all_subscriptions() {
        let reg = registry().await;
        reg.create(new_sub("alice")).await.unwrap();
        let snapshot = reg.routing_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, "udm:users/user");
        assert_eq!(snapshot[0].1, vec!["alice".to_string()]);
    }
}
