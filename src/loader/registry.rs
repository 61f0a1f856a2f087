//! The live name-to-instance map consumed by dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{AgentMetadata, DynAgent};

/// Atomically replaced as a whole unit at the end of a successful load pass.
/// Readers clone an `Arc` snapshot, so a reload never mixes old and new
/// entries in anyone's view.
pub struct AgentRegistry {
    inner: RwLock<Arc<HashMap<String, DynAgent>>>,
}

impl AgentRegistry {
    /// Created empty at process start; populated by the first load pass.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub async fn snapshot(&self) -> Arc<HashMap<String, DynAgent>> {
        self.inner.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<DynAgent> {
        self.inner.read().await.get(name).cloned()
    }

    /// Replace the whole map. Never called with a partial registry.
    pub async fn swap(&self, agents: HashMap<String, DynAgent>) {
        *self.inner.write().await = Arc::new(agents);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Sorted agent names, for "available agents" messages and responses.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata of every live agent, advertised to the LLM as tools.
    pub async fn metadata(&self) -> Vec<AgentMetadata> {
        let snapshot = self.snapshot().await;
        let mut metadata: Vec<AgentMetadata> =
            snapshot.values().map(|a| a.metadata().clone()).collect();
        metadata.sort_by(|a, b| a.name.cmp(&b.name));
        metadata
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
