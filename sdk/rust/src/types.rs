//! Wire types shared with the server's HTTP surface.
//!
//! These mirror `relaybus-server`'s `domain` and `api::handlers` DTOs field
//! for field rather than depending on that crate directly: the two crates
//! are workspace siblings with no shared dependency edge between them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublisherName {
    Known(KnownPublisher),
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnownPublisher {
    UdmListener,
    UdmPreFill,
}

impl std::fmt::Display for PublisherName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublisherName::Known(KnownPublisher::UdmListener) => write!(f, "udm-listener"),
            PublisherName::Known(KnownPublisher::UdmPreFill) => write!(f, "udm-pre-fill"),
            PublisherName::Custom(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefillStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// Body for `POST /internal/admin/v1/subscriptions`.
#[derive(Debug, Clone, Serialize)]
pub struct NewSubscription {
    pub name: String,
    pub realms_topics: Vec<(String, String)>,
    pub request_prefill: bool,
    pub password: String,
}

/// What `create_subscription`/`get_subscription` hand back. No password
/// hash: the server never returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub name: String,
    pub realms_topics: Vec<(String, String)>,
    pub request_prefill: bool,
    pub prefill_queue_status: PrefillStatus,
    pub created_at: String,
}

/// Body for `POST /v1/events`.
#[derive(Debug, Clone, Serialize)]
pub struct NewEvent {
    pub publisher_name: PublisherName,
    pub ts: String,
    pub realm: String,
    pub topic: String,
    pub body: serde_json::Value,
}

/// One message as delivered by `GET .../messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub publisher_name: PublisherName,
    pub ts: String,
    pub realm: String,
    pub topic: String,
    pub body: serde_json::Value,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// One entry of the body for `POST .../messages-status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub publisher_name: PublisherName,
    #[serde(rename = "message_seq_num")]
    pub sequence_number: u64,
    pub status: AckStatus,
}

impl StatusReport {
    pub fn ok(publisher_name: PublisherName, sequence_number: u64) -> Self {
        Self { publisher_name, sequence_number, status: AckStatus::Ok }
    }

    pub fn failed(publisher_name: PublisherName, sequence_number: u64) -> Self {
        Self { publisher_name, sequence_number, status: AckStatus::Error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_name_displays_kebab_case() {
        assert_eq!(PublisherName::Known(KnownPublisher::UdmPreFill).to_string(), "udm-pre-fill");
        assert_eq!(PublisherName::Custom("acme-events".into()).to_string(), "acme-events");
    }

    #[test]
    fn new_event_serializes_publisher_name_untagged() {
        let event = NewEvent {
            publisher_name: PublisherName::Custom("acme-events".into()),
            ts: "2026-01-01T00:00:00Z".into(),
            realm: "udm".into(),
            topic: "users/user".into(),
            body: serde_json::json!({"dn": "x"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["publisher_name"], "acme-events");
    }
}
