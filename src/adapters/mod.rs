//! HTTP adapters: request handlers and middleware.

pub mod api_handler;
pub mod auth;
pub mod health_handler;
pub mod metrics_handler;
pub mod rate_limit;
