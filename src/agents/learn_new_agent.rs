//! Runtime agent authoring: the reason the hot-reload path exists.
//!
//! The LLM hands this agent a name and a Rhai implementation; the source is
//! validated, written to the `remote_agents` collection, and the reload
//! marker is stamped so every running instance picks the new agent up on its
//! next scheduler check. The dispatcher additionally forces an immediate
//! reload in the instance that served the request.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use super::param_str;
use crate::domain::{Agent, AgentMetadata, AgentParams};
use crate::loader::{Collection, ScriptEngine, ScriptUnit, SourceStore, RELOAD_MARKER};

pub struct LearnNewAgent {
    metadata: AgentMetadata,
    store: Arc<dyn SourceStore>,
    engine: ScriptEngine,
}

impl LearnNewAgent {
    pub fn new(store: Arc<dyn SourceStore>, engine: ScriptEngine) -> Self {
        let metadata = AgentMetadata::new(
            "LearnNewAgent",
            "Creates a new agent from a Rhai script and makes it callable without a restart. \
             The script must define register() returning the agent declarations, plus the entry \
             functions they name.",
            json!({
                "type": "object",
                "properties": {
                    "agent_name": {
                        "type": "string",
                        "description": "The name of the new agent"
                    },
                    "implementation": {
                        "type": "string",
                        "description": "Complete Rhai source implementing the agent"
                    }
                },
                "required": ["agent_name", "implementation"]
            }),
        );
        Self {
            metadata,
            store,
            engine,
        }
    }

    fn validate_name(name: &str) -> anyhow::Result<()> {
        if name.is_empty() || !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            anyhow::bail!("agent name must start with a letter");
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            anyhow::bail!("agent name may only contain letters, digits and underscores");
        }
        Ok(())
    }

    /// Compile the script and confirm it carries a `register()`, so a broken
    /// submission never reaches storage.
    fn validate_source(&self, source: &str) -> anyhow::Result<()> {
        let unit = ScriptUnit::compile_source(&self.engine, source)
            .map_err(|e| anyhow::anyhow!("implementation does not compile: {e}"))?;
        let registrations = unit
            .registrations()
            .map_err(|e| anyhow::anyhow!("implementation has no usable register(): {e}"))?;
        if registrations.is_empty() {
            anyhow::bail!("register() returned no agent declarations");
        }
        for registration in &registrations {
            if !unit.has_entry(&registration.entry) {
                anyhow::bail!(
                    "declared entry function '{}' is missing",
                    registration.entry
                );
            }
        }
        Ok(())
    }
}

pub(crate) fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[async_trait]
impl Agent for LearnNewAgent {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    async fn perform(&self, params: AgentParams) -> anyhow::Result<String> {
        let agent_name = param_str(&params, "agent_name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow::anyhow!("agent_name is required"))?;
        let implementation = param_str(&params, "implementation")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("implementation is required"))?;

        Self::validate_name(&agent_name)?;
        self.validate_source(&implementation)?;

        let file_id = format!("{}_agent.rhai", to_snake_case(&agent_name));
        self.store
            .write(
                Collection::RemoteAgents,
                &file_id,
                Bytes::from(implementation.into_bytes()),
            )
            .await?;

        // Stamp the marker so other instances reload ahead of schedule.
        if let Err(e) = self
            .store
            .write(
                Collection::RemoteAgents,
                RELOAD_MARKER,
                Bytes::from(Utc::now().to_rfc3339().into_bytes()),
            )
            .await
        {
            tracing::warn!("failed to write reload marker: {e}");
        }

        Ok(format!(
            "Agent '{agent_name}' created successfully as {file_id}; it will be available momentarily."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("WeatherConnector"), "weather_connector");
        assert_eq!(to_snake_case("Stock"), "stock");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn name_validation() {
        assert!(LearnNewAgent::validate_name("StockAgent").is_ok());
        assert!(LearnNewAgent::validate_name("").is_err());
        assert!(LearnNewAgent::validate_name("9lives").is_err());
        assert!(LearnNewAgent::validate_name("bad-name").is_err());
    }
}
