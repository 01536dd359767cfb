//! Pre-fill Controller
//!
//! Drains the directory collaborator once per subscription that asked for
//! `request_prefill`, synthesizing `udm-pre-fill` envelopes onto that
//! subscription's `prefill:<name>` stream in the same order its
//! `realms_topics` list was given in, then marks the subscription `done` (or
//! `failed` on an unrecoverable directory error) so the Message Service
//! starts serving live traffic alongside the backlog.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::watch;

use crate::core::constants::STREAM_PREFILL_PREFIX;
use crate::data::queue::QueueService;
use crate::domain::{Envelope, PrefillStatus, Subscription};
use crate::registry::SubscriptionRegistry;

const PREFILL_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum PrefillError {
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("directory returned malformed data: {0}")]
    Malformed(String),
}

/// Collaborator that holds the directory's current objects. Separate from
/// the queue/KV connections: the directory is reached over its own HTTP
/// endpoint with its own timeout budget.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn list_objects(&self, realm: &str, topic: &str) -> Result<Vec<serde_json::Value>, PrefillError>;
}

pub struct HttpDirectoryClient {
    client: Client,
    base_url: String,
}

impl HttpDirectoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PrefillError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn list_objects(&self, realm: &str, topic: &str) -> Result<Vec<serde_json::Value>, PrefillError> {
        let url = format!("{}/{realm}/{topic}", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let objects: Vec<serde_json::Value> = response.json().await?;
        Ok(objects)
    }
}

pub struct PrefillController {
    queue: Arc<QueueService>,
    registry: Arc<SubscriptionRegistry>,
    directory: Arc<dyn DirectoryClient>,
}

impl PrefillController {
    pub fn new(
        queue: Arc<QueueService>,
        registry: Arc<SubscriptionRegistry>,
        directory: Arc<dyn DirectoryClient>,
    ) -> Self {
        Self { queue, registry, directory }
    }

    /// Runs until `shutdown_rx` reports shutdown, polling the registry for
    /// subscriptions still in `pending` and draining each one in turn.
    pub async fn run_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            match self.registry.list().await {
                Ok(subs) => {
                    for sub in subs {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                        if sub.request_prefill && sub.prefill_queue_status == PrefillStatus::Pending {
                            self.drain(&sub).await;
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to list subscriptions for pre-fill sweep"),
            }

            tokio::select! {
                _ = tokio::time::sleep(PREFILL_POLL_INTERVAL) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    async fn drain(&self, sub: &Subscription) {
        if let Err(e) = self
            .registry
            .set_prefill_status(&sub.name, PrefillStatus::Running)
            .await
        {
            tracing::warn!(subscription = %sub.name, error = %e, "failed to mark pre-fill running");
            return;
        }

        let stream = format!("{STREAM_PREFILL_PREFIX}{}", sub.name);
        let outcome = self.drain_into(&stream, sub).await;

        let next_status = match outcome {
            Ok(count) => {
                tracing::info!(subscription = %sub.name, objects = count, "pre-fill drained");
                PrefillStatus::Done
            }
            Err(e) => {
                tracing::error!(subscription = %sub.name, error = %e, "pre-fill failed");
                PrefillStatus::Failed
            }
        };

        if let Err(e) = self.registry.set_prefill_status(&sub.name, next_status).await {
            tracing::warn!(subscription = %sub.name, error = %e, "failed to record pre-fill outcome");
        }
    }

    async fn drain_into(&self, stream: &str, sub: &Subscription) -> Result<usize, PrefillError> {
        let mut total = 0usize;
        let ts = Utc::now().to_rfc3339();

        for (realm, topic) in &sub.realms_topics {
            let objects = self.directory.list_objects(realm, topic).await?;
            for object in objects {
                let envelope = Envelope::pre_fill(realm, topic, object, &ts);
                self.queue
                    .publish_envelope(stream, &envelope)
                    .await
                    .map_err(|e| PrefillError::Malformed(e.to_string()))?;
                total += 1;
            }
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{KvBackendType, QueueBackendType};
    use crate::data::kv::KvService;
    use crate::domain::NewSubscription;

    struct FakeDirectory {
        objects: Vec<serde_json::Value>,
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn list_objects(&self, _realm: &str, _topic: &str) -> Result<Vec<serde_json::Value>, PrefillError> {
            Ok(self.objects.clone())
        }
    }

    struct FailingDirectory;

    #[async_trait]
    impl DirectoryClient for FailingDirectory {
        async fn list_objects(&self, _realm: &str, _topic: &str) -> Result<Vec<serde_json::Value>, PrefillError> {
            Err(PrefillError::Malformed("boom".into()))
        }
    }

    async fn setup() -> (Arc<QueueService>, Arc<SubscriptionRegistry>, Subscription) {
        let kv = Arc::new(KvService::new(KvBackendType::Memory, "").await.unwrap());
        let queue = Arc::new(QueueService::new(QueueBackendType::Memory, "").await.unwrap());
        let registry = Arc::new(SubscriptionRegistry::new(kv, queue.clone()));
        let sub = registry
            .create(NewSubscription {
                name: "alice".into(),
                realms_topics: vec![("udm".into(), "users/user".into())],
                request_prefill: true,
                password: "pw".into(),
            })
            .await
            .unwrap();
        (queue, registry, sub)
    }

    #[tokio::test]
    async fn drain_publishes_objects_and_marks_done() {
        let (queue, registry, sub) = setup().await;
        let directory: Arc<dyn DirectoryClient> = Arc::new(FakeDirectory {
            objects: vec![serde_json::json!({"dn": "cn=a"}), serde_json::json!({"dn": "cn=b"})],
        });
        let controller = PrefillController::new(queue.clone(), registry.clone(), directory);

        controller.drain(&sub).await;

        let reloaded = registry.get("alice").await.unwrap();
        assert_eq!(reloaded.prefill_queue_status, PrefillStatus::Done);

        let delivered = queue
            .fetch_envelopes::<Envelope>("prefill:alice", "consumer", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].1.body["old"].is_null());
    }

    #[tokio::test]
    async fn directory_failure_marks_failed() {
        let (queue, registry, sub) = setup().await;
        let directory: Arc<dyn DirectoryClient> = Arc::new(FailingDirectory);
        let controller = PrefillController::new(queue, registry.clone(), directory);

        controller.drain(&sub).await;

        let reloaded = registry.get("alice").await.unwrap();
        assert_eq!(reloaded.prefill_queue_status, PrefillStatus::Failed);
    }
}
