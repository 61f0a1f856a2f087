//! REST handlers for the assistant surface.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

use super::metrics_handler::MetricsCollector;
use crate::assistant::{is_guid, Assistant, IncomingMessage, QueryCache, UsageTracker};
use crate::config::Settings;
use crate::llm::LlmProvider;
use crate::loader::LoaderState;

/// Shared state for the REST endpoints.
#[derive(Clone)]
pub struct ApiState {
    pub settings: Arc<RwLock<Settings>>,
    pub loader: Arc<LoaderState>,
    pub llm: Arc<dyn LlmProvider>,
    pub tracker: Arc<UsageTracker>,
    pub cache: Arc<QueryCache>,
    pub metrics: Arc<MetricsCollector>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantRequest {
    #[serde(default)]
    pub user_input: Option<serde_json::Value>,
    #[serde(default)]
    pub conversation_history: Option<Vec<IncomingMessage>>,
    #[serde(default)]
    pub user_guid: Option<String>,
}

fn bad_request(message: &str) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// `POST /api/assistant` — the main entrypoint: one user turn in, one
/// formatted + voice response out, with registry and cache counters.
pub async fn assistant_request(
    State(state): State<ApiState>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> axum::response::Response {
    let timer = state
        .metrics
        .request_duration
        .with_label_values(&["POST", "/api/assistant"])
        .start_timer();

    let Json(request) = match payload {
        Ok(json) => json,
        Err(_) => {
            state.record_request("POST", "/api/assistant", 400);
            timer.observe_duration();
            return bad_request("Invalid JSON in request body");
        }
    };

    let user_input = match &request.user_input {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let history = request.conversation_history.unwrap_or_default();

    // A bare GUID is a valid "load my memory" request; anything else needs
    // actual input.
    if !is_guid(user_input.trim()) && user_input.trim().is_empty() {
        state.record_request("POST", "/api/assistant", 400);
        timer.observe_duration();
        return bad_request("Missing or empty user_input in JSON payload");
    }

    let settings = state.settings.read().await.assistant.clone();
    let mut assistant = Assistant::new(
        settings,
        state.llm.clone(),
        state.loader.clone(),
        state.tracker.clone(),
        state.cache.clone(),
        request.user_guid.clone(),
    )
    .await;

    let reply = assistant.respond(&user_input, &history).await;

    let registry = state.loader.registry();
    let body = json!({
        "assistant_response": reply.formatted,
        "voice_response": reply.voice,
        "agent_logs": reply.agent_logs,
        "user_guid": assistant.user_guid(),
        "available_agents": registry.len().await,
        "agent_list": registry.names().await,
        "connected_sources": state.tracker.connection_count().await,
        "learned_patterns": state.tracker.pattern_count().await,
        "cached_queries": state.cache.stored_count(),
    });

    state
        .metrics
        .agents_loaded
        .set(registry.len().await as f64);
    state.record_request("POST", "/api/assistant", 200);
    timer.observe_duration();
    (StatusCode::OK, Json(body)).into_response()
}

/// `GET /api/agents` — metadata of every live agent.
pub async fn list_agents(State(state): State<ApiState>) -> axum::response::Response {
    let metadata = state.loader.registry().metadata().await;
    state.record_request("GET", "/api/agents", 200);
    (StatusCode::OK, Json(json!({ "agents": metadata }))).into_response()
}

/// `POST /api/agents/reload` — operator-forced reload, bypassing the
/// scheduler's rate limit.
pub async fn reload_agents(State(state): State<ApiState>) -> axum::response::Response {
    let reloaded = state.loader.force_reload().await;
    if reloaded {
        state.metrics.reloads_total.with_label_values(&["api"]).inc();
    } else {
        error!("operator-requested reload did not produce a registry swap");
    }

    let registry = state.loader.registry();
    state
        .metrics
        .agents_loaded
        .set(registry.len().await as f64);
    state.record_request("POST", "/api/agents/reload", 200);
    (
        StatusCode::OK,
        Json(json!({
            "reloaded": reloaded,
            "available_agents": registry.len().await,
            "agent_list": registry.names().await,
        })),
    )
        .into_response()
}

impl ApiState {
    fn record_request(&self, method: &str, endpoint: &str, status: u16) {
        self.metrics
            .requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
    }
}
