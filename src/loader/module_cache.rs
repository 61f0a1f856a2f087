//! Process-wide registry of compiled script units, keyed by load session.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::script::ScriptUnit;
use super::source::{Collection, SessionToken};

/// `(collection, file_id, session_token)` — the identity of one imported
/// unit. Two passes loading the same file get distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub collection: Collection,
    pub file_id: String,
    pub session: SessionToken,
}

impl CacheKey {
    pub fn new(collection: Collection, file_id: impl Into<String>, session: &SessionToken) -> Self {
        Self {
            collection,
            file_id: file_id.into(),
            session: session.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.collection, self.file_id, self.session)
    }
}

/// Keeps every unit imported in the current process, preventing duplicate
/// imports within one session while allowing full replacement across
/// sessions. Local (built-in) agents never enter the cache.
#[derive(Default)]
pub struct ModuleCache {
    units: Mutex<HashMap<CacheKey, Arc<ScriptUnit>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Arc<ScriptUnit>> {
        self.units.lock().await.get(key).cloned()
    }

    /// Insert unless the key is already present; returns the unit that ends
    /// up cached, so racing inserters converge on one handle.
    pub async fn insert_if_absent(&self, key: CacheKey, unit: Arc<ScriptUnit>) -> Arc<ScriptUnit> {
        let mut units = self.units.lock().await;
        units.entry(key).or_insert(unit).clone()
    }

    /// Drop every entry belonging to a session other than `current`.
    /// Instances already constructed from evicted units keep working; they
    /// hold their own handle to the compiled unit.
    pub async fn evict_stale(&self, current: &SessionToken) -> usize {
        let mut units = self.units.lock().await;
        let before = units.len();
        units.retain(|key, _| &key.session == current);
        let evicted = before - units.len();
        if evicted > 0 {
            debug!(evicted, session = %current, "evicted stale module cache entries");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.units.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.units.lock().await.is_empty()
    }

    /// Distinct session tokens currently present (mostly for diagnostics).
    pub async fn sessions(&self) -> Vec<SessionToken> {
        let units = self.units.lock().await;
        let mut sessions: Vec<SessionToken> = Vec::new();
        for key in units.keys() {
            if !sessions.contains(&key.session) {
                sessions.push(key.session.clone());
            }
        }
        sessions
    }
}
