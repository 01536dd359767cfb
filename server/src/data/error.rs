//! Crate-wide error type returned from the HTTP façade
//!
//! Mirrors the teacher's backend-tagged error pattern: every API-level error
//! knows its own HTTP status and renders the same JSON error shape
//! (`{"error": "<code>", "message": "<text>"}`), while backend-specific
//! errors (`QueueError`, `KvError`) convert into it at the boundary.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::data::kv::KvError;
use crate::data::queue::QueueError;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("subscription '{0}' not found")]
    NotFound(String),

    #[error("subscription '{0}' already exists")]
    AlreadyExists(String),

    #[error("pre-fill failed: {0}")]
    PrefillFailed(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Kv(#[from] KvError),
}

impl RelayError {
    /// True when retrying the same request shortly afterward has a
    /// reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Queue(e) => e.is_transient(),
            RelayError::Kv(e) => e.is_transient(),
            _ => false,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            RelayError::NotFound(_) => "not_found",
            RelayError::AlreadyExists(_) => "already_exists",
            RelayError::PrefillFailed(_) => "prefill_failed",
            RelayError::Unauthorized => "unauthorized",
            RelayError::BadRequest(_) => "bad_request",
            RelayError::Queue(_) => "queue_error",
            RelayError::Kv(_) => "kv_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::AlreadyExists(_) => StatusCode::CONFLICT,
            RelayError::PrefillFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Queue(_) | RelayError::Kv(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
