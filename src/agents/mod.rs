//! Built-in agents: the `local` collection.
//!
//! These are native Rust, bundled with the binary, enumerated once at
//! process start and never re-fetched or evicted. Remote collections may
//! shadow them by name.

mod api_connector;
mod context_memory;
mod learn_new_agent;
mod manage_memory;
mod memory;
mod sql_connector;

pub(crate) use learn_new_agent::to_snake_case;

pub use api_connector::ApiConnectorAgent;
pub use context_memory::ContextMemoryAgent;
pub use learn_new_agent::LearnNewAgent;
pub use manage_memory::ManageMemoryAgent;
pub use memory::{MemoryRecord, MemoryScope, MemoryStore};
pub use sql_connector::SqlConnectorAgent;

use crate::domain::{AgentParams, DynAgent};
use crate::loader::{ScriptEngine, SourceStore};
use std::sync::Arc;

/// The full local collection, in no particular order (names are unique).
pub fn builtin_agents(store: Arc<dyn SourceStore>, engine: ScriptEngine) -> Vec<DynAgent> {
    vec![
        Arc::new(ContextMemoryAgent::new(store.clone())),
        Arc::new(ManageMemoryAgent::new(store.clone())),
        Arc::new(LearnNewAgent::new(store.clone(), engine)),
        Arc::new(SqlConnectorAgent::new()),
        Arc::new(ApiConnectorAgent::new()),
    ]
}

/// Fetch a string parameter, tolerating absent and non-string values the way
/// the dispatch layer sanitizes them.
pub(crate) fn param_str(params: &AgentParams, key: &str) -> Option<String> {
    params.get(key).and_then(|v| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    })
}

pub(crate) fn param_bool(params: &AgentParams, key: &str) -> bool {
    params
        .get(key)
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}
