//! Simulated REST API connector.

use async_trait::async_trait;
use chrono::Utc;
use fake::faker::company::en::CompanyName;
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use rand::Rng;
use serde_json::{json, Value};

use super::param_str;
use crate::domain::{Agent, AgentMetadata, AgentParams};

pub struct ApiConnectorAgent {
    metadata: AgentMetadata,
}

impl ApiConnectorAgent {
    pub fn new() -> Self {
        let metadata = AgentMetadata::new(
            "APIConnector",
            "Interfaces with REST APIs: fetches, posts and transforms payloads",
            json!({
                "type": "object",
                "properties": {
                    "endpoint": {
                        "type": "string",
                        "description": "URL of the API endpoint"
                    },
                    "method": {
                        "type": "string",
                        "description": "HTTP method",
                        "enum": ["GET", "POST", "PUT", "DELETE"]
                    },
                    "payload": {
                        "type": "object",
                        "description": "Request body for write methods"
                    }
                },
                "required": ["endpoint"]
            }),
        );
        Self { metadata }
    }

    fn simulated_items() -> Vec<Value> {
        let count = rand::thread_rng().gen_range(2..=5);
        (0..count)
            .map(|i| {
                json!({
                    "id": i + 1,
                    "title": CompanyName().fake::<String>(),
                    "summary": Sentence(3..8).fake::<String>(),
                })
            })
            .collect()
    }
}

impl Default for ApiConnectorAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ApiConnectorAgent {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    async fn perform(&self, params: AgentParams) -> anyhow::Result<String> {
        let endpoint = param_str(&params, "endpoint")
            .filter(|e| !e.is_empty())
            .ok_or_else(|| anyhow::anyhow!("endpoint is required"))?;
        let method = param_str(&params, "method").unwrap_or_else(|| "GET".to_string());

        let envelope = json!({
            "status": "success",
            "status_code": 200,
            "endpoint": endpoint,
            "method": method,
            "data": { "items": Self::simulated_items() },
            "fetched_at": Utc::now().to_rfc3339(),
        });

        Ok(envelope.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_endpoint_is_an_error() {
        let agent = ApiConnectorAgent::new();
        assert!(agent.perform(AgentParams::new()).await.is_err());
    }
}
