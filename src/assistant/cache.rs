//! Query-result cache for data connectors, keyed by content hash.

use bytes::Bytes;
use prometheus::Counter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::loader::SourceStore;

/// Caches successful connector results under `query_cache/` in the source
/// store. Keys hash the agent name together with the canonical parameter
/// JSON (serde_json maps serialize with sorted keys, so equal parameter sets
/// hash equally regardless of arrival order).
pub struct QueryCache {
    store: Arc<dyn SourceStore>,
    hits: AtomicU64,
    misses: AtomicU64,
    stored: AtomicU64,
    exported: Option<(Counter, Counter)>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            exported: None,
        }
    }

    /// Mirror hit/miss counts into Prometheus counters.
    pub fn with_metrics(store: Arc<dyn SourceStore>, hits: Counter, misses: Counter) -> Self {
        Self {
            exported: Some((hits, misses)),
            ..Self::new(store)
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        if let Some((hits, _)) = &self.exported {
            hits.inc();
        }
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some((_, misses)) = &self.exported {
            misses.inc();
        }
    }

    fn key(agent_name: &str, params: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(agent_name.as_bytes());
        hasher.update(b"_");
        hasher.update(params.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn path(key: &str) -> String {
        format!("query_cache/{key}.json")
    }

    pub async fn get(&self, agent_name: &str, params: &Value) -> Option<Value> {
        let key = Self::key(agent_name, params);
        match self.store.read_path(&Self::path(&key)).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    self.record_hit();
                    debug!(agent = agent_name, %key, "query cache hit");
                    Some(value)
                }
                Err(_) => {
                    self.record_miss();
                    None
                }
            },
            _ => {
                self.record_miss();
                None
            }
        }
    }

    /// Store a result, best-effort.
    pub async fn put(&self, agent_name: &str, params: &Value, data: &Value) {
        let key = Self::key(agent_name, params);
        let encoded = match serde_json::to_vec(data) {
            Ok(encoded) => encoded,
            Err(_) => return,
        };
        if self
            .store
            .write_path(&Self::path(&key), Bytes::from(encoded))
            .await
            .is_ok()
        {
            self.stored.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn stored_count(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ObjectSourceStore;
    use serde_json::json;

    #[tokio::test]
    async fn round_trip_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SourceStore> =
            Arc::new(ObjectSourceStore::local(dir.path()).unwrap());
        let cache = QueryCache::new(store);

        let params = json!({"operation": "query", "query": "SELECT 1"});
        assert!(cache.get("SQLConnector", &params).await.is_none());
        assert_eq!(cache.misses(), 1);

        cache
            .put("SQLConnector", &params, &json!([{"id": 1}]))
            .await;
        let cached = cache.get("SQLConnector", &params).await.unwrap();
        assert_eq!(cached[0]["id"], 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.stored_count(), 1);
    }

    #[test]
    fn key_is_stable_across_param_order() {
        // serde_json maps are ordered, so these two parse to the same Value.
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(QueryCache::key("A", &a), QueryCache::key("A", &b));
    }
}
