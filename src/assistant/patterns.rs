//! Access tracking and success-pattern learning for data agents.
//!
//! Patterns persist as a JSON document in the source store, so they survive
//! restarts the same way the agents themselves do.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::loader::SourceStore;

const PATTERNS_PATH: &str = "data_patterns/patterns.json";

/// Only the most recent samples are kept per pattern.
const MAX_SAMPLES: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccessStats {
    count: u64,
    last_access: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PatternSample {
    params: Value,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PatternEntry {
    successful_params: Vec<PatternSample>,
}

/// In-memory access counters plus persisted success patterns.
pub struct UsageTracker {
    store: Arc<dyn SourceStore>,
    connections: Mutex<HashMap<String, AccessStats>>,
    patterns: Mutex<HashMap<String, PatternEntry>>,
}

impl UsageTracker {
    /// Load persisted patterns; a missing or corrupt document starts fresh.
    pub async fn load(store: Arc<dyn SourceStore>) -> Self {
        let patterns = match store.read_path(PATTERNS_PATH).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(patterns) => patterns,
                Err(e) => {
                    warn!("could not parse stored data patterns: {e}");
                    HashMap::new()
                }
            },
            _ => HashMap::new(),
        };
        if !patterns.is_empty() {
            debug!(count = patterns.len(), "loaded data patterns");
        }
        Self {
            store,
            connections: Mutex::new(HashMap::new()),
            patterns: Mutex::new(patterns),
        }
    }

    /// Record one access to a data agent.
    pub async fn track_access(&self, agent_name: &str, params: &Value) {
        let key = format!("{agent_name}_{params}");
        let mut connections = self.connections.lock().await;
        let stats = connections.entry(key).or_default();
        stats.count += 1;
        stats.last_access = Some(Utc::now());
    }

    /// Record a successful invocation, bounded to the newest samples, and
    /// persist best-effort.
    pub async fn learn_success(&self, agent_name: &str, params: &Value) {
        {
            let mut patterns = self.patterns.lock().await;
            let entry = patterns
                .entry(format!("{agent_name}_pattern"))
                .or_default();
            entry.successful_params.push(PatternSample {
                params: params.clone(),
                timestamp: Utc::now(),
            });
            if entry.successful_params.len() > MAX_SAMPLES {
                let excess = entry.successful_params.len() - MAX_SAMPLES;
                entry.successful_params.drain(..excess);
            }
        }
        self.persist().await;
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn pattern_count(&self) -> usize {
        self.patterns.lock().await.len()
    }

    async fn persist(&self) {
        let encoded = {
            let patterns = self.patterns.lock().await;
            match serde_json::to_vec(&*patterns) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!("could not serialize data patterns: {e}");
                    return;
                }
            }
        };
        if let Err(e) = self
            .store
            .write_path(PATTERNS_PATH, Bytes::from(encoded))
            .await
        {
            warn!("could not persist data patterns: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ObjectSourceStore;
    use serde_json::json;

    #[tokio::test]
    async fn patterns_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SourceStore> =
            Arc::new(ObjectSourceStore::local(dir.path()).unwrap());

        let tracker = UsageTracker::load(store.clone()).await;
        tracker
            .learn_success("SQLConnector", &json!({"operation": "query"}))
            .await;
        assert_eq!(tracker.pattern_count().await, 1);

        let reloaded = UsageTracker::load(store).await;
        assert_eq!(reloaded.pattern_count().await, 1);
    }

    #[tokio::test]
    async fn access_tracking_counts_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SourceStore> =
            Arc::new(ObjectSourceStore::local(dir.path()).unwrap());
        let tracker = UsageTracker::load(store).await;

        tracker.track_access("APIConnector", &json!({"endpoint": "a"})).await;
        tracker.track_access("APIConnector", &json!({"endpoint": "a"})).await;
        tracker.track_access("APIConnector", &json!({"endpoint": "b"})).await;
        assert_eq!(tracker.connection_count().await, 2);
    }
}
