//! Recall of shared and conversation-specific memories.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::memory::{MemoryScope, MemoryStore};
use super::{param_bool, param_str};
use crate::domain::{Agent, AgentMetadata, AgentParams};
use crate::loader::SourceStore;

/// Without `full_recall`, only this many trailing records are returned.
const RECENT_LIMIT: usize = 10;

pub struct ContextMemoryAgent {
    metadata: AgentMetadata,
    memory: MemoryStore,
}

impl ContextMemoryAgent {
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        let metadata = AgentMetadata::new(
            "ContextMemory",
            "Recalls stored memories. Without a user_guid it returns shared memories visible to \
             every conversation; with one it returns memories specific to that user.",
            json!({
                "type": "object",
                "properties": {
                    "user_guid": {
                        "type": "string",
                        "description": "GUID identifying the user whose memories to recall"
                    },
                    "full_recall": {
                        "type": "boolean",
                        "description": "Return the entire history instead of recent entries"
                    }
                }
            }),
        );
        Self {
            metadata,
            memory: MemoryStore::new(store),
        }
    }
}

#[async_trait]
impl Agent for ContextMemoryAgent {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    async fn perform(&self, params: AgentParams) -> anyhow::Result<String> {
        let scope = match param_str(&params, "user_guid") {
            Some(guid) if !guid.is_empty() => MemoryScope::User(guid),
            _ => MemoryScope::Shared,
        };
        let records = self.memory.load(&scope).await;

        if records.is_empty() {
            return Ok(match scope {
                MemoryScope::Shared => "No shared context memory available.".to_string(),
                MemoryScope::User(_) => "No specific context memory available.".to_string(),
            });
        }

        let limit = if param_bool(&params, "full_recall") {
            None
        } else {
            Some(RECENT_LIMIT)
        };
        Ok(MemoryStore::format(&records, limit))
    }
}
