//! # Proteus - adaptive agent platform
//!
//! Proteus is an HTTP assistant service that dispatches natural-language
//! requests to an LLM with tool calling against a registry of agents.
//! Built-in agents are native Rust; remote agents are Rhai scripts kept in
//! an object store (local directory or S3), hot-loaded at runtime and
//! periodically re-scanned so that agents authored mid-conversation become
//! callable without a restart.
//!
//! ## Architecture
//!
//! - **domain**: the agent contract and chat types
//! - **loader**: source store, module cache, load passes, reload scheduling,
//!   registry swaps
//! - **agents**: the built-in (`local`) collection
//! - **assistant**: the LLM dispatch loop
//! - **llm**: Azure OpenAI / OpenAI providers
//! - **adapters**: HTTP handlers and middleware
//! - **config**: settings, CLI and the config-file watcher

pub mod adapters;
pub mod agents;
pub mod assistant;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod loader;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::adapters::api_handler::{self, ApiState};
use crate::adapters::auth::{auth_middleware, SharedAuthSettings};
use crate::adapters::health_handler::HealthHandler;
use crate::adapters::metrics_handler::MetricsHandler;

/// Creates the Axum application router with all endpoints configured.
pub async fn create_app(state: ApiState) -> Router {
    let health_handler = Arc::new(HealthHandler::new(state.loader.clone()));
    let metrics_handler = Arc::new(MetricsHandler::new(state.metrics.clone()));

    // Public routes (no authentication required)
    let public_router = Router::new()
        .route(
            "/health",
            get({
                let handler = health_handler.clone();
                move || {
                    let h = handler.clone();
                    async move { h.health().await }
                }
            }),
        )
        .route(
            "/health/ready",
            get({
                let handler = health_handler.clone();
                move || {
                    let h = handler.clone();
                    async move { h.ready().await }
                }
            }),
        )
        .route(
            "/health/live",
            get({
                let handler = health_handler.clone();
                move || {
                    let h = handler.clone();
                    async move { h.live().await }
                }
            }),
        );

    let api_router = Router::new()
        .route("/assistant", post(api_handler::assistant_request))
        .route("/agents", get(api_handler::list_agents))
        .route("/agents/reload", post(api_handler::reload_agents))
        .with_state(state.clone());

    let mut protected_router = Router::new()
        .route(
            "/metrics",
            get({
                let handler = metrics_handler.clone();
                move || {
                    let h = handler.clone();
                    async move { h.metrics().await }
                }
            }),
        )
        .nest("/api", api_router);

    // Apply rate limiting to protected routes if enabled
    let settings_read = state.settings.read().await;
    if let Some(rate_limit) = &settings_read.rate_limit {
        if rate_limit.enabled {
            let limiter = crate::adapters::rate_limit::create_limiter(
                rate_limit.requests_per_second,
                rate_limit.burst_size,
            );
            protected_router = protected_router.layer(axum::middleware::from_fn_with_state(
                limiter,
                crate::adapters::rate_limit::rate_limit_middleware,
            ));
        }
    }

    // Apply authentication middleware to protected routes if enabled
    if settings_read.auth.enabled {
        let auth: SharedAuthSettings = Arc::new(settings_read.auth.clone());
        protected_router =
            protected_router.layer(axum::middleware::from_fn_with_state(auth, auth_middleware));
    }
    drop(settings_read);

    let router = public_router.merge(protected_router);

    // CORS reflects the request origin (credentials are allowed, so wildcard
    // values are off the table).
    router.layer(
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
            .max_age(Duration::from_secs(86400)),
    )
}
