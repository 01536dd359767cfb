//! Message envelope: the unit published to `incoming` and fanned out to
//! per-subscription streams.

use serde::{Deserialize, Serialize};

use crate::data::error::RelayError;

/// Identifies who produced an envelope.
///
/// `Listener` and `PreFill` are the two internal publishers; `Events`
/// carries whatever identifier the events-API caller presented.
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

impl PublisherName {
    pub fn pre_fill() -> Self {
        PublisherName::Known(KnownPublisher::UdmPreFill)
    }

    /// `remove_message` routes acks to the pre-fill stream only for this publisher.
    pub fn is_pre_fill(&self) -> bool {
        matches!(self, PublisherName::Known(KnownPublisher::UdmPreFill))
    }
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

/// Immutable once published. Body shape is left opaque (`serde_json::Value`)
/// except for the realm's own convention of `old`/`new` sub-objects — the
/// service doesn't interpret the body, only routes on `realm`/`topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub publisher_name: PublisherName,
    pub ts: String,
    pub realm: String,
    pub topic: String,
    pub body: serde_json::Value,
}

impl Envelope {
    pub fn realm_topic(&self) -> String {
        format!("{}:{}", self.realm, self.topic)
    }

    /// Envelope bodies are duck-typed JSON; the one constraint enforced is
    /// that they're an object, not a bare scalar or array.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.body.is_object() {
            Ok(())
        } else {
            Err(RelayError::BadRequest("event body must be a JSON object".into()))
        }
    }

    /// Synthesize a pre-fill "create" message for one directory object.
    pub fn pre_fill(realm: &str, topic: &str, object: serde_json::Value, ts: &str) -> Self {
        Self {
            publisher_name: PublisherName::pre_fill(),
            ts: ts.to_string(),
            realm: realm.to_string(),
            topic: topic.to_string(),
            body: serde_json::json!({ "old": null, "new": object }),
        }
    }
}

/// An envelope as handed back to a consumer, carrying the coordinates
/// needed to later reference it in a status report or delete call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredEnvelope {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub sequence_number: u64,
}
