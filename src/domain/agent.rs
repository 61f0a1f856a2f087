//! The agent contract every loadable unit must satisfy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Named parameters passed to an agent invocation.
pub type AgentParams = Map<String, Value>;

/// Declarative description of an agent, in OpenAI function-calling shape.
///
/// The loader and registry treat `parameters` as opaque; only the dispatch
/// layer hands it to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    /// Unique key in the registry; collisions mean last-loaded-wins.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the accepted parameters.
    #[serde(default = "AgentMetadata::empty_schema")]
    pub parameters: Value,
}

impl AgentMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    fn empty_schema() -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
}

/// A callable agent: one name, one schema, one entry point returning a string.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn metadata(&self) -> &AgentMetadata;

    /// Perform the agent's action. Errors are caught by the dispatch layer
    /// and turned into a user-facing message; they never crash a request.
    async fn perform(&self, params: AgentParams) -> anyhow::Result<String>;
}

pub type DynAgent = Arc<dyn Agent>;
