//! API server initialization

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use super::middleware;
use super::rate_limit::{RateLimiter, rate_limit_middleware};
use crate::core::CoreApp;
use crate::core::constants::{DEFAULT_BODY_LIMIT, EVENTS_BODY_LIMIT};

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;
        let shutdown = app.shutdown.clone();
        let router = Self::build_router(&app);

        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "Listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }

    /// Assembles the full route tree without binding a listener, so tests
    /// can drive it in-process with `tower::ServiceExt::oneshot`.
    pub fn build_router(app: &CoreApp) -> Router {
        let state = AppState {
            config: Arc::new(app.config.clone()),
            registry: app.registry.clone(),
            messages: app.messages.clone(),
            queue: app.queue.clone(),
        };

        let events_limiter = Arc::new(RateLimiter::new(app.config.rate_limit.events_rpm));
        let messages_limiter = Arc::new(RateLimiter::new(app.config.rate_limit.messages_rpm));

        let mut events_route = Router::new()
            .route("/v1/events", post(handlers::post_event))
            .layer(DefaultBodyLimit::max(EVENTS_BODY_LIMIT))
            .with_state(state.clone());
        if app.config.rate_limit.enabled {
            events_route = events_route.layer(axum_middleware::from_fn_with_state(
                events_limiter,
                rate_limit_middleware,
            ));
        }

        let mut messages_route = Router::new()
            .route("/v1/subscriptions/{name}/messages", get(handlers::get_messages))
            .route(
                "/v1/subscriptions/{name}/messages-status",
                post(handlers::post_messages_status),
            )
            .with_state(state.clone());
        if app.config.rate_limit.enabled {
            messages_route = messages_route.layer(axum_middleware::from_fn_with_state(
                messages_limiter,
                rate_limit_middleware,
            ));
        }

        let subscriptions_route = Router::new()
            .route(
                "/internal/admin/v1/subscriptions",
                post(handlers::create_subscription),
            )
            .route(
                "/v1/subscriptions/{name}",
                get(handlers::get_subscription).delete(handlers::delete_subscription),
            )
            .with_state(state.clone());

        Router::new()
            .route("/healthz", get(handlers::health))
            .merge(subscriptions_route)
            .merge(messages_route)
            .merge(events_route)
            .fallback(middleware::handle_404)
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
            .layer(CompressionLayer::new())
            .layer(TraceLayer::new_for_http())
            .layer(middleware::cors())
    }
}
