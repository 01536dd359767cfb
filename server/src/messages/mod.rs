//! Message Service: serves messages out of a subscription's streams,
//! preferring the pre-fill backlog while it's still being drained, and
//! applies ack/nak status reports back to the right stream.

use std::time::Duration;

use crate::core::constants::{STREAM_PREFILL_PREFIX, STREAM_SUBSCRIPTION_PREFIX};
use crate::data::error::RelayError;
use crate::data::queue::QueueService;
use crate::domain::{DeliveredEnvelope, Envelope, PrefillStatus, PublisherName};
use crate::registry::SubscriptionRegistry;

const CONSUMER_DURABLE: &str = "consumer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub publisher_name: PublisherName,
    pub sequence_number: u64,
    pub status: AckStatus,
}

pub struct MessageService {
    queue: std::sync::Arc<QueueService>,
    registry: std::sync::Arc<SubscriptionRegistry>,
}

impl MessageService {
    pub fn new(queue: std::sync::Arc<QueueService>, registry: std::sync::Arc<SubscriptionRegistry>) -> Self {
        Self { queue, registry }
    }

    fn main_stream(name: &str) -> String {
        format!("{STREAM_SUBSCRIPTION_PREFIX}{name}")
    }

    fn prefill_stream(name: &str) -> String {
        format!("{STREAM_PREFILL_PREFIX}{name}")
    }

    /// Implements the 4-step source-selection rule:
    /// 1. pre-fill done and its stream still has messages: serve from there,
    ///    topping up from the main stream if the pre-fill backlog runs short.
    /// 2. pre-fill done and its stream is exhausted: serve from the main
    ///    stream directly (and drop the now-empty pre-fill stream on pop).
    /// 3. pre-fill pending or running: no messages yet, return empty.
    /// 4. pre-fill failed: the caller gets an error, not an empty result.
    pub async fn get_messages(
        &self,
        subscription_name: &str,
        count: usize,
        timeout: Duration,
        pop: bool,
        skip_prefill: bool,
    ) -> Result<Vec<DeliveredEnvelope>, RelayError> {
        let sub = self.registry.get(subscription_name).await?;

        if skip_prefill || !sub.request_prefill {
            return self.get_from_main(subscription_name, count, timeout, pop).await;
        }

        match sub.prefill_queue_status {
            PrefillStatus::Failed => Err(RelayError::PrefillFailed(subscription_name.to_string())),
            PrefillStatus::Pending | PrefillStatus::Running => Ok(Vec::new()),
            PrefillStatus::Done => {
                self.get_from_prefill_then_main(subscription_name, count, timeout, pop).await
            }
        }
    }

    async fn get_from_main(
        &self,
        subscription_name: &str,
        count: usize,
        timeout: Duration,
        pop: bool,
    ) -> Result<Vec<DeliveredEnvelope>, RelayError> {
        let stream = Self::main_stream(subscription_name);
        self.fetch_and_maybe_ack(&stream, count, timeout, pop).await
    }

    async fn get_from_prefill_then_main(
        &self,
        subscription_name: &str,
        count: usize,
        timeout: Duration,
        pop: bool,
    ) -> Result<Vec<DeliveredEnvelope>, RelayError> {
        let prefill_stream = Self::prefill_stream(subscription_name);
        let mut delivered = self
            .fetch_and_maybe_ack(&prefill_stream, count, timeout, pop)
            .await?;

        if delivered.len() < count {
            let remaining = count - delivered.len();
            let mut from_main = self
                .get_from_main(subscription_name, remaining, timeout, pop)
                .await?;
            delivered.append(&mut from_main);

            if pop {
                let stats = self.queue.stats(&prefill_stream, CONSUMER_DURABLE).await?;
                if stats.length == 0 && stats.pending == 0 {
                    self.queue.delete_stream(&prefill_stream).await?;
                }
            }
        }

        Ok(delivered)
    }

    async fn fetch_and_maybe_ack(
        &self,
        stream: &str,
        count: usize,
        timeout: Duration,
        pop: bool,
    ) -> Result<Vec<DeliveredEnvelope>, RelayError> {
        let batch = self
            .queue
            .fetch_envelopes::<Envelope>(stream, CONSUMER_DURABLE, count, timeout)
            .await?;

        let mut delivered = Vec::with_capacity(batch.len());
        for (seq, envelope) in batch {
            if pop {
                self.queue.ack(stream, CONSUMER_DURABLE, seq).await?;
            }
            delivered.push(DeliveredEnvelope { envelope, sequence_number: seq });
        }
        Ok(delivered)
    }

    /// Applies a batch of status reports, acking successes and nak'ing
    /// failures, routed to the stream that matches the report's publisher.
    pub async fn post_status_reports(
        &self,
        subscription_name: &str,
        reports: &[StatusReport],
    ) -> Result<(), RelayError> {
        for report in reports {
            let stream = if report.publisher_name.is_pre_fill() {
                Self::prefill_stream(subscription_name)
            } else {
                Self::main_stream(subscription_name)
            };

            match report.status {
                AckStatus::Ok => {
                    self.queue.ack(&stream, CONSUMER_DURABLE, report.sequence_number).await?
                }
                AckStatus::Failed => {
                    self.queue.nak(&stream, CONSUMER_DURABLE, report.sequence_number).await?
                }
            }
        }
        Ok(())
    }

    /// Deletes a single message by `(publisher_name, sequence_number)`,
    /// routing to the pre-fill or main stream based on publisher identity.
    pub async fn remove_message(
        &self,
        subscription_name: &str,
        publisher_name: &PublisherName,
        sequence_number: u64,
    ) -> Result<(), RelayError> {
        let stream = if publisher_name.is_pre_fill() {
            Self::prefill_stream(subscription_name)
        } else {
            Self::main_stream(subscription_name)
        };
        self.queue.delete_message(&stream, sequence_number).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{KvBackendType, QueueBackendType};
    use crate::data::kv::KvService;
    use crate::domain::{KnownPublisher, NewSubscription};
    use std::sync::Arc;

    async fn setup(request_prefill: bool) -> (MessageService, Arc<QueueService>, Arc<SubscriptionRegistry>) {
        let kv = Arc::new(KvService::new(KvBackendType::Memory, "").await.unwrap());
        let queue = Arc::new(QueueService::new(QueueBackendType::Memory, "").await.unwrap());
        let registry = Arc::new(SubscriptionRegistry::new(kv, queue.clone()));
        registry
            .create(NewSubscription {
                name: "alice".into(),
                realms_topics: vec![("udm".into(), "users/user".into())],
                request_prefill,
                password: "pw".into(),
            })
            .await
            .unwrap();
        let service = MessageService::new(queue.clone(), registry.clone());
        (service, queue, registry)
    }

    fn event(topic: &str) -> Envelope {
        Envelope {
            publisher_name: PublisherName::Known(KnownPublisher::UdmListener),
            ts: "2026-01-01T00:00:00Z".into(),
            realm: "udm".into(),
            topic: topic.into(),
            body: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn pending_prefill_returns_empty() {
        let (service, _queue, _registry) = setup(true).await;
        let result = service
            .get_messages("alice", 10, Duration::from_millis(10), false, false)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn failed_prefill_is_an_error() {
        let (service, _queue, registry) = setup(true).await;
        registry.set_prefill_status("alice", PrefillStatus::Running).await.unwrap();
        registry.set_prefill_status("alice", PrefillStatus::Failed).await.unwrap();

        let err = service
            .get_messages("alice", 10, Duration::from_millis(10), false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::PrefillFailed(_)));
    }

    #[tokio::test]
    async fn done_prefill_tops_up_from_main_stream() {
        let (service, queue, registry) = setup(true).await;
        registry.set_prefill_status("alice", PrefillStatus::Running).await.unwrap();
        registry.set_prefill_status("alice", PrefillStatus::Done).await.unwrap();

        queue.publish_envelope("prefill:alice", &event("users/user")).await.unwrap();
        queue.publish_envelope("subscription:alice", &event("users/user")).await.unwrap();

        let result = service
            .get_messages("alice", 2, Duration::from_millis(50), true, false)
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn no_prefill_goes_straight_to_main() {
        let (service, queue, _registry) = setup(false).await;
        queue.publish_envelope("subscription:alice", &event("users/user")).await.unwrap();

        let result = service
            .get_messages("alice", 10, Duration::from_millis(50), true, false)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn remove_message_routes_by_publisher() {
        let (service, queue, registry) = setup(true).await;
        registry.set_prefill_status("alice", PrefillStatus::Running).await.unwrap();
        registry.set_prefill_status("alice", PrefillStatus::Done).await.unwrap();

        let seq = queue
            .publish_envelope(
                "prefill:alice",
                &Envelope {
                    publisher_name: PublisherName::pre_fill(),
                    ts: "2026-01-01T00:00:00Z".into(),
                    realm: "udm".into(),
                    topic: "users/user".into(),
                    body: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        service.remove_message("alice", &PublisherName::pre_fill(), seq).await.unwrap();

        let remaining = queue
            .fetch_envelopes::<Envelope>("prefill:alice", CONSUMER_DURABLE, 10, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }
}
