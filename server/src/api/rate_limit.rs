//! Fixed-window rate limiting middleware, keyed per caller identity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;

use crate::core::constants::DEFAULT_RATE_LIMIT_WINDOW_SECS;

struct Window {
    started_at: Instant,
    count: u32,
}

/// In-memory fixed-window counter. One instance per rate-limited route
/// group (events, messages); the caller identity (publisher name or
/// subscription name, already authenticated by the time this runs) is the
/// counting key.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    limit: u32,
    window: Duration,
}

pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            windows: DashMap::new(),
            limit: limit_per_minute,
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }

    pub fn check(&self, key: &str) -> RateLimitResult {
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            started_at: Instant::now(),
            count: 0,
        });

        if entry.started_at.elapsed() >= self.window {
            entry.started_at = Instant::now();
            entry.count = 0;
        }

        entry.count += 1;
        let allowed = entry.count <= self.limit;
        let remaining = self.limit.saturating_sub(entry.count);
        let retry_after_secs = self.window.as_secs().saturating_sub(entry.started_at.elapsed().as_secs());

        RateLimitResult { allowed, limit: self.limit, remaining, retry_after_secs }
    }
}

pub struct RateLimitExceeded(RateLimitResult);

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let r = self.0;
        let mut response = Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("X-RateLimit-Limit", r.limit.to_string())
            .header("X-RateLimit-Remaining", r.remaining.to_string())
            .header(header::RETRY_AFTER, r.retry_after_secs.to_string())
            .body(axum::body::Body::from("rate limit exceeded"))
            .unwrap();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response
    }
}

/// Keys the limiter on the Basic-auth username already present on the
/// request (subscription name or publisher name); falls back to the peer
/// address for unauthenticated requests so the limiter still bounds abuse.
fn extract_key(request: &Request) -> String {
    use crate::api::auth::Credentials;
    match Credentials::from_headers(request.headers()) {
        Credentials::Basic { username, .. } => username,
        Credentials::Bearer(_) => "admin".to_string(),
        Credentials::None => "anonymous".to_string(),
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitExceeded> {
    let key = extract_key(&request);
    let result = limiter.check(&key);

    if !result.allowed {
        tracing::debug!(%key, "rate limit exceeded");
        return Err(RateLimitExceeded(result));
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&result.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&result.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.check("alice").allowed);
        assert!(limiter.check("alice").allowed);
        assert!(!limiter.check("alice").allowed);
    }

    #[test]
    fn separate_keys_have_independent_windows() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("alice").allowed);
        assert!(limiter.check("bob").allowed);
    }
}
