//! Thin async HTTP client for the provisioning bus.
//!
//! Grounded in `AsyncClient` from the original Python SDK: one
//! `reqwest::Client` per instance, Basic auth carried per request rather
//! than baked into a session, since the admin API uses a bearer token while
//! every other route uses a subscription's own credential.

use std::time::Duration;

use reqwest::{Client as HttpClient, StatusCode};

use crate::error::{ClientError, Result};
use crate::types::{Message, NewEvent, NewSubscription, StatusReport, Subscription};

/// Query parameters for `GET .../messages`. All optional; the server fills
/// in its own defaults for anything left `None`.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub count: Option<usize>,
    pub timeout: Option<Duration>,
    pub pop: Option<bool>,
    pub skip_prefill: Option<bool>,
}

impl FetchOptions {
    fn into_query(self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(count) = self.count {
            params.push(("count", count.to_string()));
        }
        if let Some(timeout) = self.timeout {
            params.push(("timeout", timeout.as_secs().to_string()));
        }
        if let Some(pop) = self.pop {
            params.push(("pop", pop.to_string()));
        }
        if let Some(skip_prefill) = self.skip_prefill {
            params.push(("skip_prefill", skip_prefill.to_string()));
        }
        params
    }
}

/// Client for the admin API: creating and managing subscriptions.
///
/// Separate from [`Client`] the way the original split `AsyncClient`'s
/// admin-only methods out with a `# TODO: move this to the AdminClient`
/// marker — here the split is load-bearing since the two APIs use
/// different credentials (bearer token vs. per-subscription Basic).
pub struct AdminClient {
    http: HttpClient,
    base_url: String,
    admin_token: String,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>, admin_token: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self { http: HttpClient::new(), base_url, admin_token: admin_token.into() })
    }

    pub async fn create_subscription(&self, new_sub: &NewSubscription) -> Result<Subscription> {
        let url = format!("{}/internal/admin/v1/subscriptions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.admin_token)
            .json(new_sub)
            .send()
            .await?;
        into_json(response).await
    }

    pub async fn get_subscription(&self, name: &str) -> Result<Subscription> {
        let url = format!("{}/v1/subscriptions/{name}", self.base_url);
        let response = self.http.get(&url).bearer_auth(&self.admin_token).send().await?;
        into_json(response).await
    }

    pub async fn delete_subscription(&self, name: &str) -> Result<()> {
        let url = format!("{}/v1/subscriptions/{name}", self.base_url);
        let response = self.http.delete(&url).bearer_auth(&self.admin_token).send().await?;
        into_unit(response).await
    }
}

/// Client for a single subscription or publisher credential: fetching and
/// acknowledging messages, publishing events.
pub struct Client {
    http: HttpClient,
    base_url: String,
    username: String,
    password: String,
}

impl Client {
    /// `username`/`password` are a subscription's own Basic credential for
    /// `get_messages`/`set_message_status`, or the configured publisher
    /// credential for `publish_event` — the server checks them against
    /// whichever route is called.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self { http: HttpClient::new(), base_url, username: username.into(), password: password.into() })
    }

    pub async fn own_subscription(&self, name: &str) -> Result<Subscription> {
        let url = format!("{}/v1/subscriptions/{name}", self.base_url);
        let response = self.request(self.http.get(&url)).send().await?;
        into_json(response).await
    }

    pub async fn get_messages(&self, subscription: &str, options: FetchOptions) -> Result<Vec<Message>> {
        let url = format!("{}/v1/subscriptions/{subscription}/messages", self.base_url);
        let response = self
            .request(self.http.get(&url))
            .query(&options.into_query())
            .send()
            .await?;
        into_json(response).await
    }

    pub async fn set_message_status(&self, subscription: &str, reports: &[StatusReport]) -> Result<()> {
        let url = format!("{}/v1/subscriptions/{subscription}/messages-status", self.base_url);
        let response = self.request(self.http.post(&url)).json(reports).send().await?;
        into_unit(response).await
    }

    pub async fn publish_event(&self, event: &NewEvent) -> Result<()> {
        let url = format!("{}/v1/events", self.base_url);
        let response = self.request(self.http.post(&url)).json(event).send().await?;
        into_unit(response).await
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.password))
    }
}

fn normalize_base_url(base_url: String) -> Result<String> {
    if base_url.trim().is_empty() {
        return Err(ClientError::InvalidUrl(base_url));
    }
    Ok(base_url.trim_end_matches('/').to_string())
}

async fn into_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(rejection(status, response).await);
    }
    Ok(response.json().await?)
}

async fn into_unit(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if !status.is_success() {
        return Err(rejection(status, response).await);
    }
    Ok(())
}

async fn rejection(status: StatusCode, response: reqwest::Response) -> ClientError {
    let body = response.text().await.unwrap_or_default();
    ClientError::Rejected { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_options_omits_unset_fields() {
        let options = FetchOptions { count: Some(5), ..Default::default() };
        assert_eq!(options.into_query(), vec![("count", "5".to_string())]);
    }

    #[test]
    fn fetch_options_full_query() {
        let options = FetchOptions {
            count: Some(10),
            timeout: Some(Duration::from_secs(5)),
            pop: Some(true),
            skip_prefill: Some(false),
        };
        assert_eq!(
            options.into_query(),
            vec![
                ("count", "10".to_string()),
                ("timeout", "5".to_string()),
                ("pop", "true".to_string()),
                ("skip_prefill", "false".to_string()),
            ]
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(normalize_base_url("http://localhost:8080/".into()).unwrap(), "http://localhost:8080");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(normalize_base_url("  ".into()).is_err());
    }
}
