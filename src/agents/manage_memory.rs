//! Storing memories on behalf of the conversation.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::memory::{MemoryScope, MemoryStore};
use super::param_str;
use crate::domain::{Agent, AgentMetadata, AgentParams};
use crate::loader::SourceStore;

pub struct ManageMemoryAgent {
    metadata: AgentMetadata,
    memory: MemoryStore,
}

impl ManageMemoryAgent {
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        let metadata = AgentMetadata::new(
            "ManageMemory",
            "Stores a memory for later recall. Use scope 'shared' for knowledge every \
             conversation should see, 'user' for the current user only.",
            json!({
                "type": "object",
                "properties": {
                    "memory_text": {
                        "type": "string",
                        "description": "The fact or note to remember"
                    },
                    "scope": {
                        "type": "string",
                        "description": "Where to store the memory",
                        "enum": ["shared", "user"]
                    },
                    "user_guid": {
                        "type": "string",
                        "description": "GUID identifying the user (required for scope 'user')"
                    }
                },
                "required": ["memory_text"]
            }),
        );
        Self {
            metadata,
            memory: MemoryStore::new(store),
        }
    }
}

#[async_trait]
impl Agent for ManageMemoryAgent {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    async fn perform(&self, params: AgentParams) -> anyhow::Result<String> {
        let text = param_str(&params, "memory_text")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("memory_text is required"))?;

        let scope = match param_str(&params, "scope").as_deref() {
            Some("shared") => MemoryScope::Shared,
            _ => match param_str(&params, "user_guid") {
                Some(guid) if !guid.is_empty() => MemoryScope::User(guid),
                _ => MemoryScope::Shared,
            },
        };

        self.memory.append(&scope, text).await?;
        Ok("Memory stored successfully.".to_string())
    }
}
