//! Dispatcher: fans envelopes published to `incoming` out to every
//! subscription whose `realms_topics` list contains an exact `realm:topic`
//! match.
//!
//! Holds an in-memory routing table `M: realm:topic -> set<subscription>`
//! kept current two ways: a watcher task consuming the registry's KV watch
//! on the subscription prefix for low-latency updates, and a periodic full
//! rescan (`registry::routing_snapshot`) that repairs any divergence a
//! missed watch event could cause. The dispatch loop itself only ever reads
//! the table; it never blocks on a registry call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};

use crate::core::constants::{
    STREAM_INCOMING, STREAM_SUBSCRIPTION_PREFIX, KV_SUBSCRIPTION_PREFIX,
};
use crate::data::queue::QueueService;
use crate::domain::Envelope;
use crate::registry::SubscriptionRegistry;

const DISPATCHER_DURABLE: &str = "dispatcher";
const DISPATCH_FETCH_MAX: usize = 100;
const DISPATCH_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RoutingTable {
    by_realm_topic: HashMap<String, Vec<String>>,
}

pub struct Dispatcher {
    queue: Arc<QueueService>,
    registry: Arc<SubscriptionRegistry>,
    table: Arc<RwLock<RoutingTable>>,
    rescan_interval: Duration,
}

impl Dispatcher {
    pub async fn new(
        queue: Arc<QueueService>,
        registry: Arc<SubscriptionRegistry>,
        rescan_interval: Duration,
    ) -> Result<Self, crate::data::error::RelayError> {
        queue.create_stream(STREAM_INCOMING).await?;
        let dispatcher = Self {
            queue,
            registry,
            table: Arc::new(RwLock::new(RoutingTable::default())),
            rescan_interval,
        };
        dispatcher.rescan().await?;
        Ok(dispatcher)
    }

    async fn rescan(&self) -> Result<(), crate::data::error::RelayError> {
        let snapshot = self.registry.routing_snapshot().await?;
        let mut table = self.table.write().await;
        table.by_realm_topic = snapshot.into_iter().collect();
        Ok(())
    }

    async fn subscribers_for(&self, realm_topic: &str) -> Vec<String> {
        let table = self.table.read().await;
        eprintln!("DEBUG subscribers_for({realm_topic}) table={:?}", table.by_realm_topic);
        table
            .by_realm_topic
            .get(realm_topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Runs until `shutdown_rx` reports shutdown. Pulls from `incoming`,
    /// fans each envelope to every matching subscription stream, and acks
    /// only once every fan-out publish has succeeded.
    pub async fn run_dispatch_loop(&self, shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let batch = match self
                .queue
                .fetch_envelopes::<Envelope>(
                    STREAM_INCOMING,
                    DISPATCHER_DURABLE,
                    DISPATCH_FETCH_MAX,
                    DISPATCH_FETCH_TIMEOUT,
                )
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(error = %e, "dispatch fetch failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
            };

            for (seq, envelope) in batch {
                self.dispatch_one(seq, envelope).await;
            }
        }
    }

    async fn dispatch_one(&self, seq: u64, envelope: Envelope) {
        let realm_topic = envelope.realm_topic();
        let targets = self.subscribers_for(&realm_topic).await;

        if targets.is_empty() {
            tracing::debug!(realm_topic = %realm_topic, "no subscription matches, acking silently");
            let _ = self.queue.ack(STREAM_INCOMING, DISPATCHER_DURABLE, seq).await;
            return;
        }

        let span = tracing::debug_span!("fan_out", realm = %envelope.realm, topic = %envelope.topic, matched_count = targets.len());
        let _enter = span.enter();

        let mut all_ok = true;
        for name in &targets {
            let stream = format!("{STREAM_SUBSCRIPTION_PREFIX}{name}");
            if let Err(e) = self.queue.publish_envelope(&stream, &envelope).await {
                tracing::warn!(subscription = %name, error = %e, "fan-out publish failed");
                all_ok = false;
            }
        }

        if all_ok {
            let _ = self.queue.ack(STREAM_INCOMING, DISPATCHER_DURABLE, seq).await;
        } else {
            // Leave unacked: the source message becomes redeliverable and is
            // fanned out again in full. Downstream duplicates are tolerated.
            let _ = self.queue.nak(STREAM_INCOMING, DISPATCHER_DURABLE, seq).await;
        }
    }

    /// Consumes the registry's KV watch on the subscription prefix, applying
    /// incremental routing-table updates as subscriptions are created or
    /// removed. Runs alongside `run_dispatch_loop` and `run_rescan_loop`.
    pub async fn run_watch_loop(&self, kv: Arc<crate::data::kv::KvService>, mut shutdown_rx: watch::Receiver<bool>) {
        use futures::StreamExt;

        let mut stream = match kv.watch(KV_SUBSCRIPTION_PREFIX, 0).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to start subscription watch, relying on periodic rescan only");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                event = stream.next() => {
                    let Some(event) = event else { return };
                    match event {
                        Ok(_) => {
                            if let Err(e) = self.rescan().await {
                                tracing::warn!(error = %e, "rescan after watch event failed");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "subscription watch error"),
                    }
                }
            }
        }
    }

    /// Periodic full-rescan safety net (Open Question decision: the watch
    /// loop above and this loop both keep the table current; this one wins
    /// any race since it always reflects the registry's current full state).
    pub async fn run_rescan_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.rescan_interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.rescan().await {
                        tracing::warn!(error = %e, "periodic registry rescan failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{KvBackendType, QueueBackendType};
    use crate::data::kv::KvService;
    use crate::domain::{KnownPublisher, NewSubscription, PublisherName};

    async fn setup() -> (Dispatcher, Arc<QueueService>, Arc<SubscriptionRegistry>) {
        let kv = Arc::new(KvService::new(KvBackendType::Memory, "").await.unwrap());
        let queue = Arc::new(QueueService::new(QueueBackendType::Memory, "").await.unwrap());
        let registry = Arc::new(SubscriptionRegistry::new(kv, queue.clone()));
        registry
            .create(NewSubscription {
                name: "alice".into(),
                realms_topics: vec![("udm".into(), "users/user".into())],
                request_prefill: false,
                password: "pw".into(),
            })
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(queue.clone(), registry.clone(), Duration::from_secs(300))
            .await
            .unwrap();
        (dispatcher, queue, registry)
    }

    fn envelope() -> Envelope {
        Envelope {
            publisher_name: PublisherName::Known(KnownPublisher::UdmListener),
            ts: "2026-01-01T00:00:00Z".into(),
            realm: "udm".into(),
            topic: "users/user".into(),
            body: serde_json::json!({"old": null, "new": {"dn": "cn=a"}}),
        }
    }

    #[tokio::test]
    async fn matching_event_is_fanned_out_and_acked() {
        let (dispatcher, queue, _registry) = setup().await;
        queue.publish_envelope(STREAM_INCOMING, &envelope()).await.unwrap();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let batch = queue
            .fetch_envelopes::<Envelope>(STREAM_INCOMING, DISPATCHER_DURABLE, 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        let (seq, env) = batch.into_iter().next().unwrap();
        dispatcher.dispatch_one(seq, env).await;
        drop(shutdown_rx);

        let delivered = queue
            .fetch_envelopes::<Envelope>("subscription:alice", "consumer", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);

        let stats = queue.stats(STREAM_INCOMING, DISPATCHER_DURABLE).await.unwrap();
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn non_matching_event_is_silently_acked() {
        let (dispatcher, queue, _registry) = setup().await;
        let mut env = envelope();
        env.topic = "groups/group".into();
        queue.publish_envelope(STREAM_INCOMING, &env).await.unwrap();

        let batch = queue
            .fetch_envelopes::<Envelope>(STREAM_INCOMING, DISPATCHER_DURABLE, 10, Duration::from_millis(50))
            .await
            .unwrap();
        let (seq, env) = batch.into_iter().next().unwrap();
        dispatcher.dispatch_one(seq, env).await;

        let stats = queue.stats(STREAM_INCOMING, DISPATCHER_DURABLE).await.unwrap();
        assert_eq!(stats.pending, 0);

        let delivered = queue
            .fetch_envelopes::<Envelope>("subscription:alice", "consumer", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(delivered.is_empty());
    }

    #[tokio::test]
    async fn rescan_picks_up_new_subscription() {
        let (dispatcher, queue, registry) = setup().await;
        registry
            .create(NewSubscription {
                name: "bob".into(),
                realms_topics: vec![("udm".into(), "groups/group".into())],
                request_prefill: false,
                password: "pw".into(),
            })
            .await
            .unwrap();
        dispatcher.rescan().await.unwrap();

        let mut env = envelope();
        env.topic = "groups/group".into();
        queue.publish_envelope(STREAM_INCOMING, &env).await.unwrap();
        let batch = queue
            .fetch_envelopes::<Envelope>(STREAM_INCOMING, DISPATCHER_DURABLE, 10, Duration::from_millis(50))
            .await
            .unwrap();
        let (seq, env) = batch.into_iter().next().unwrap();
        dispatcher.dispatch_one(seq, env).await;

        let delivered = queue
            .fetch_envelopes::<Envelope>("subscription:bob", "consumer", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
    }
}
