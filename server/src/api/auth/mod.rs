//! Two-tier authentication: a static bearer token unlocks the admin API,
//! HTTP Basic credentials (subscription name/password, or the configured
//! publisher name/password) unlock everything else.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::core::config::AppConfig;
use crate::data::error::RelayError;
use crate::registry::SubscriptionRegistry;
use crate::utils::crypto::{constant_time_eq, sha256_hex};

/// Credentials presented on a request, before they're checked against
/// anything. Parsed once per request and reused by whichever authorization
/// rule the route needs.
pub enum Credentials {
    Bearer(String),
    Basic { username: String, password: String },
    None,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
            return Credentials::None;
        };

        if let Some(token) = value.strip_prefix("Bearer ") {
            return Credentials::Bearer(token.trim().to_string());
        }

        if let Some(encoded) = value.strip_prefix("Basic ")
            && let Ok(decoded) = BASE64.decode(encoded.trim())
            && let Ok(decoded) = String::from_utf8(decoded)
            && let Some((username, password)) = decoded.split_once(':')
        {
            return Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            };
        }

        Credentials::None
    }

    fn is_admin(&self, config: &AppConfig) -> bool {
        matches!(self, Credentials::Bearer(token) if constant_time_eq(token, &config.auth.admin_token))
    }
}

/// `POST /internal/admin/v1/subscriptions` — admin bearer token only.
pub fn require_admin(creds: &Credentials, config: &AppConfig) -> Result<(), RelayError> {
    if creds.is_admin(config) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized)
    }
}

/// `GET`/`DELETE /v1/subscriptions/{name}` — admin, or the subscription's
/// own Basic credential.
pub async fn require_admin_or_self(
    creds: &Credentials,
    config: &AppConfig,
    registry: &SubscriptionRegistry,
    subscription_name: &str,
) -> Result<(), RelayError> {
    if creds.is_admin(config) {
        return Ok(());
    }
    verify_subscription_credential(creds, registry, subscription_name).await
}

/// `GET /v1/subscriptions/{name}/messages`, `POST .../messages-status` —
/// the subscription's own Basic credential only (never the admin token,
/// which has no password to check against a subscription record).
pub async fn require_subscription(
    creds: &Credentials,
    registry: &SubscriptionRegistry,
    subscription_name: &str,
) -> Result<(), RelayError> {
    verify_subscription_credential(creds, registry, subscription_name).await
}

async fn verify_subscription_credential(
    creds: &Credentials,
    registry: &SubscriptionRegistry,
    subscription_name: &str,
) -> Result<(), RelayError> {
    let Credentials::Basic { username, password } = creds else {
        return Err(RelayError::Unauthorized);
    };
    if username != subscription_name {
        return Err(RelayError::Unauthorized);
    }

    // A missing subscription must authenticate identically to a wrong
    // password: never let an auth failure reveal whether the name exists.
    let hash = match registry.get(subscription_name).await {
        Ok(sub) => sub.password_hash,
        Err(_) => sha256_hex("no-such-subscription"),
    };

    if constant_time_eq(&sha256_hex(password), &hash) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized)
    }
}

/// `POST /v1/events` — the configured publisher Basic credential.
pub fn require_publisher(creds: &Credentials, config: &AppConfig) -> Result<(), RelayError> {
    let Credentials::Basic { username, password } = creds else {
        return Err(RelayError::Unauthorized);
    };
    let expected_name = config.auth.publisher_name.as_deref().unwrap_or("");
    let expected_password = config.auth.publisher_password.as_deref().unwrap_or("");

    if constant_time_eq(username, expected_name) && constant_time_eq(password, expected_password) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cli::CliConfig;
    use crate::core::config::{KvBackendType, QueueBackendType};
    use crate::data::kv::KvService;
    use crate::data::queue::QueueService;
    use crate::domain::NewSubscription;
    use std::sync::Arc;

    fn basic_header(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = BASE64.encode(format!("{user}:{pass}"));
        headers.insert(AUTHORIZATION, format!("Basic {encoded}").parse().unwrap());
        headers
    }

    fn bearer_header(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        headers
    }

    async fn registry() -> SubscriptionRegistry {
        let kv = Arc::new(KvService::new(KvBackendType::Memory, "").await.unwrap());
        let queue = Arc::new(QueueService::new(QueueBackendType::Memory, "").await.unwrap());
        SubscriptionRegistry::new(kv, queue)
    }

    fn config() -> AppConfig {
        let mut cli = CliConfig::default();
        cli.admin_token = Some("admin-secret".into());
        cli.publisher_name = Some("events-publisher".into());
        cli.publisher_password = Some("events-secret".into());
        AppConfig::load(&cli).unwrap()
    }

    #[test]
    fn bearer_token_parses_as_admin_credential() {
        let creds = Credentials::from_headers(&bearer_header("admin-secret"));
        assert!(creds.is_admin(&config()));
    }

    #[tokio::test]
    async fn subscription_credential_matches_its_own_password() {
        let registry = registry().await;
        registry
            .create(NewSubscription {
                name: "alice".into(),
                realms_topics: vec![],
                request_prefill: false,
                password: "hunter2".into(),
            })
            .await
            .unwrap();

        let creds = Credentials::from_headers(&basic_header("alice", "hunter2"));
        require_subscription(&creds, &registry, "alice").await.unwrap();

        let wrong = Credentials::from_headers(&basic_header("alice", "wrong"));
        assert!(require_subscription(&wrong, &registry, "alice").await.is_err());
    }

    #[tokio::test]
    async fn missing_subscription_fails_like_wrong_password() {
        let registry = registry().await;
        let creds = Credentials::from_headers(&basic_header("ghost", "anything"));
        let err = require_subscription(&creds, &registry, "ghost").await.unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized));
    }

    #[test]
    fn publisher_credential_checked_against_config() {
        let creds = Credentials::from_headers(&basic_header("events-publisher", "events-secret"));
        require_publisher(&creds, &config()).unwrap();

        let wrong = Credentials::from_headers(&basic_header("events-publisher", "nope"));
        assert!(require_publisher(&wrong, &config()).is_err());
    }
}
