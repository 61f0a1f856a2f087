//! Simulated SQL connector.
//!
//! Returns plausible result envelopes without touching a real database; the
//! dispatch layer caches and learns from these the same way it would for a
//! live connector.

use async_trait::async_trait;
use chrono::Utc;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use rand::Rng;
use serde_json::{json, Value};

use super::param_str;
use crate::domain::{Agent, AgentMetadata, AgentParams};

pub struct SqlConnectorAgent {
    metadata: AgentMetadata,
}

impl SqlConnectorAgent {
    pub fn new() -> Self {
        let metadata = AgentMetadata::new(
            "SQLConnector",
            "Connects to SQL databases, executes queries, and manages database operations",
            json!({
                "type": "object",
                "properties": {
                    "connection_string": {
                        "type": "string",
                        "description": "Database connection string or configuration"
                    },
                    "query": {
                        "type": "string",
                        "description": "SQL query to execute"
                    },
                    "operation": {
                        "type": "string",
                        "description": "Operation type",
                        "enum": ["query", "insert", "update", "delete", "schema"]
                    },
                    "parameters": {
                        "type": "object",
                        "description": "Query parameters for parameterized queries"
                    },
                    "cache_result": {
                        "type": "boolean",
                        "description": "Whether to cache the query result"
                    }
                },
                "required": ["connection_string", "operation"]
            }),
        );
        Self { metadata }
    }

    fn simulated_rows() -> Vec<Value> {
        let count = rand::thread_rng().gen_range(3..=8);
        (0..count)
            .map(|i| {
                json!({
                    "id": i + 1,
                    "name": Name().fake::<String>(),
                    "email": SafeEmail().fake::<String>(),
                    "active": rand::thread_rng().gen_bool(0.8),
                })
            })
            .collect()
    }

    fn simulated_schema() -> Value {
        json!([
            { "table": "customers", "columns": ["id", "name", "email", "active"] },
            { "table": "orders", "columns": ["id", "customer_id", "total", "placed_at"] },
            { "table": "products", "columns": ["id", "sku", "price"] }
        ])
    }
}

impl Default for SqlConnectorAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for SqlConnectorAgent {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    async fn perform(&self, params: AgentParams) -> anyhow::Result<String> {
        let operation = param_str(&params, "operation").unwrap_or_else(|| "query".to_string());
        let query = param_str(&params, "query").unwrap_or_default();

        let envelope = match operation.as_str() {
            "schema" => json!({
                "status": "success",
                "operation": "schema",
                "tables": Self::simulated_schema(),
                "executed_at": Utc::now().to_rfc3339(),
            }),
            "insert" | "update" | "delete" => json!({
                "status": "success",
                "operation": operation,
                "rows_affected": rand::thread_rng().gen_range(1..=5),
                "executed_at": Utc::now().to_rfc3339(),
            }),
            _ => {
                let rows = Self::simulated_rows();
                json!({
                    "status": "success",
                    "operation": "query",
                    "query": query,
                    "row_count": rows.len(),
                    "data": rows,
                    "executed_at": Utc::now().to_rfc3339(),
                })
            }
        };

        Ok(envelope.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_envelope_has_rows() {
        let agent = SqlConnectorAgent::new();
        let mut params = AgentParams::new();
        params.insert("operation".into(), json!("query"));
        params.insert("query".into(), json!("SELECT * FROM customers"));

        let result = agent.perform(params).await.unwrap();
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["status"], "success");
        assert_eq!(
            parsed["row_count"].as_u64().unwrap(),
            parsed["data"].as_array().unwrap().len() as u64
        );
    }
}
