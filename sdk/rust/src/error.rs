//! Errors surfaced by the client.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected the request ({status}): {body}")]
    Rejected { status: reqwest::StatusCode, body: String },

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
