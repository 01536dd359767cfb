//! Subscription record and pre-fill status state machine.

use serde::{Deserialize, Serialize};

use crate::data::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefillStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl PrefillStatus {
    /// Enforces invariant (iii): `pending → running → done|failed`, forward-only.
    pub fn advance_to(self, next: PrefillStatus) -> Result<PrefillStatus, RelayError> {
        let allowed = matches!(
            (self, next),
            (PrefillStatus::Pending, PrefillStatus::Running)
                | (PrefillStatus::Running, PrefillStatus::Done)
                | (PrefillStatus::Running, PrefillStatus::Failed)
        );
        if allowed {
            Ok(next)
        } else {
            Err(RelayError::BadRequest(format!(
                "cannot advance pre-fill status from {self:?} to {next:?}"
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub name: String,
    pub realms_topics: Vec<(String, String)>,
    pub request_prefill: bool,
    pub prefill_queue_status: PrefillStatus,
    pub password_hash: String,
    pub created_at: String,
}

impl Subscription {
    pub fn realm_topic_strings(&self) -> Vec<String> {
        self.realms_topics
            .iter()
            .map(|(realm, topic)| format!("{realm}:{topic}"))
            .collect()
    }
}

/// Request body for `POST /internal/admin/v1/subscriptions`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSubscription {
    pub name: String,
    pub realms_topics: Vec<(String, String)>,
    pub request_prefill: bool,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_running_to_done_is_allowed() {
        let s = PrefillStatus::Pending.advance_to(PrefillStatus::Running).unwrap();
        assert_eq!(s, PrefillStatus::Running);
        let s = s.advance_to(PrefillStatus::Done).unwrap();
        assert_eq!(s, PrefillStatus::Done);
    }

    #[test]
    fn done_is_terminal() {
        assert!(PrefillStatus::Done.advance_to(PrefillStatus::Running).is_err());
        assert!(PrefillStatus::Failed.advance_to(PrefillStatus::Running).is_err());
    }

    #[test]
    fn skipping_running_is_rejected() {
        assert!(PrefillStatus::Pending.advance_to(PrefillStatus::Done).is_err());
    }

    #[test]
    fn realm_topic_strings_are_colon_joined() {
        let sub = Subscription {
            name: "s1".into(),
            realms_topics: vec![("udm".into(), "users/user".into())],
            request_prefill: false,
            prefill_queue_status: PrefillStatus::Done,
            password_hash: "x".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        assert_eq!(sub.realm_topic_strings(), vec!["udm:users/user".to_string()]);
    }
}
