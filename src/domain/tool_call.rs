//! Tool call types for the LLM dispatch loop

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AgentMetadata;

/// A tool call requested by the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the agent being called
    pub name: String,
    /// Arguments passed to the agent (as JSON)
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Generate a unique ID for a tool call
    pub fn generate_id() -> String {
        let raw = uuid::Uuid::new_v4().to_string().replace('-', "");
        format!("call_{}", &raw[..24])
    }
}

/// Definition of a tool advertised to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema defining the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

impl From<&AgentMetadata> for ToolDefinition {
    fn from(meta: &AgentMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            description: meta.description.clone(),
            parameters: meta.parameters.clone(),
        }
    }
}
