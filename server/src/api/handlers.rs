//! Route handlers for the subscription, message, and event-ingress API.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::api::auth::{Credentials, require_admin, require_admin_or_self, require_publisher, require_subscription};
use crate::core::config::AppConfig;
use crate::core::constants::{DEFAULT_FETCH_MAX_COUNT, DEFAULT_FETCH_TIMEOUT_MS};
use crate::data::error::RelayError;
use crate::data::queue::QueueService;
use crate::domain::{DeliveredEnvelope, Envelope, NewSubscription, PrefillStatus, PublisherName, Subscription};
use crate::messages::{AckStatus, MessageService, StatusReport};
use crate::registry::SubscriptionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SubscriptionRegistry>,
    pub messages: Arc<MessageService>,
    pub queue: Arc<QueueService>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    pub name: String,
    pub realms_topics: Vec<(String, String)>,
    pub request_prefill: bool,
    pub prefill_queue_status: PrefillStatus,
    pub created_at: String,
}

impl From<Subscription> for SubscriptionView {
    fn from(sub: Subscription) -> Self {
        Self {
            name: sub.name,
            realms_topics: sub.realms_topics,
            request_prefill: sub.request_prefill,
            prefill_queue_status: sub.prefill_queue_status,
            created_at: sub.created_at,
        }
    }
}

pub async fn create_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new_sub): Json<NewSubscription>,
) -> Result<impl IntoResponse, RelayError> {
    let creds = Credentials::from_headers(&headers);
    require_admin(&creds, &state.config)?;

    let sub = state.registry.create(new_sub).await?;
    Ok((StatusCode::CREATED, Json(SubscriptionView::from(sub))))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let creds = Credentials::from_headers(&headers);
    require_admin_or_self(&creds, &state.config, &state.registry, &name).await?;

    let sub = state.registry.get(&name).await?;
    Ok(Json(SubscriptionView::from(sub)))
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let creds = Credentials::from_headers(&headers);
    require_admin_or_self(&creds, &state.config, &state.registry, &name).await?;

    state.registry.delete(&name).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_count")]
    pub count: usize,
    /// Seconds, per `GET .../messages?...&timeout=<s>&...`.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default)]
    pub pop: bool,
    #[serde(default)]
    pub skip_prefill: bool,
}

fn default_count() -> usize {
    DEFAULT_FETCH_MAX_COUNT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS / 1000
}

pub async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, RelayError> {
    let creds = Credentials::from_headers(&headers);
    require_subscription(&creds, &state.registry, &name).await?;

    let messages: Vec<DeliveredEnvelope> = state
        .messages
        .get_messages(
            &name,
            query.count,
            Duration::from_secs(query.timeout),
            query.pop,
            query.skip_prefill,
        )
        .await?;

    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct StatusReportDto {
    pub publisher_name: PublisherName,
    #[serde(rename = "message_seq_num")]
    pub sequence_number: u64,
    pub status: ReportStatus,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Ok,
    Error,
}

/// The status-report body is "one or a list of" reports.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StatusReportBody {
    One(StatusReportDto),
    Many(Vec<StatusReportDto>),
}

impl StatusReportBody {
    fn into_vec(self) -> Vec<StatusReportDto> {
        match self {
            StatusReportBody::One(report) => vec![report],
            StatusReportBody::Many(reports) => reports,
        }
    }
}

pub async fn post_messages_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<StatusReportBody>,
) -> Result<impl IntoResponse, RelayError> {
    let creds = Credentials::from_headers(&headers);
    require_subscription(&creds, &state.registry, &name).await?;

    let reports: Vec<StatusReport> = body
        .into_vec()
        .into_iter()
        .map(|r| StatusReport {
            publisher_name: r.publisher_name,
            sequence_number: r.sequence_number,
            status: match r.status {
                ReportStatus::Ok => AckStatus::Ok,
                ReportStatus::Error => AckStatus::Failed,
            },
        })
        .collect();

    state.messages.post_status_reports(&name, &reports).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct NewEvent {
    pub publisher_name: PublisherName,
    #[serde(default)]
    pub ts: Option<String>,
    pub realm: String,
    pub topic: String,
    pub body: serde_json::Value,
}

pub async fn post_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<NewEvent>,
) -> Result<impl IntoResponse, RelayError> {
    let creds = Credentials::from_headers(&headers);
    require_publisher(&creds, &state.config)?;

    let envelope = Envelope {
        publisher_name: event.publisher_name,
        ts: event.ts.unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        realm: event.realm,
        topic: event.topic,
        body: event.body,
    };
    envelope.validate()?;

    state
        .queue
        .publish_envelope(crate::core::constants::STREAM_INCOMING, &envelope)
        .await?;

    Ok(StatusCode::ACCEPTED)
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}
