//! One full load pass: enumerate, fetch, materialize, compile, instantiate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::LoadError;
use super::module_cache::{CacheKey, ModuleCache};
use super::script::{ScriptAgent, ScriptEngine, ScriptUnit};
use super::source::{Collection, SessionToken, SourceLocation};
use super::store::SourceStore;
use crate::domain::DynAgent;

/// Produces a complete, consistent name-to-instance map from all configured
/// collections in one pass. Never fails outward: every per-unit and
/// per-collection error is logged and skipped, and worst case the result is
/// just the local agents.
pub struct AgentLoader {
    store: Arc<dyn SourceStore>,
    cache: Arc<ModuleCache>,
    engine: ScriptEngine,
    locals: Vec<DynAgent>,
    temp_root: PathBuf,
}

impl AgentLoader {
    pub fn new(
        store: Arc<dyn SourceStore>,
        cache: Arc<ModuleCache>,
        engine: ScriptEngine,
        locals: Vec<DynAgent>,
    ) -> Self {
        // Each loader gets its own scratch directory; session-scoped file
        // names keep passes apart, the instance directory keeps processes
        // apart.
        let instance = uuid::Uuid::new_v4().simple().to_string();
        Self {
            store,
            cache,
            engine,
            locals,
            temp_root: std::env::temp_dir().join("proteus-agents").join(instance),
        }
    }

    pub fn store(&self) -> &Arc<dyn SourceStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Full reload as run by the scheduler: a fresh session token, stale
    /// sessions evicted, every collection re-scanned.
    pub async fn reload(&self) -> HashMap<String, DynAgent> {
        let session = SessionToken::now();
        self.cache.evict_stale(&session).await;
        self.load_with_session(&session).await
    }

    /// One load pass under an explicit session token. Does not evict; a
    /// repeated pass under the same token reuses cached units without
    /// re-fetching them.
    pub async fn load_with_session(&self, session: &SessionToken) -> HashMap<String, DynAgent> {
        let mut agents: HashMap<String, DynAgent> = HashMap::new();

        // Local agents first: trusted, bundled, never session-scoped. The
        // fixed ordering means any remote collection may shadow them.
        for agent in &self.locals {
            agents.insert(agent.name().to_string(), agent.clone());
        }

        for collection in Collection::SCAN_ORDER {
            match self.load_collection(collection, session, &mut agents).await {
                Ok(count) => {
                    debug!(%collection, count, "collection scan complete");
                }
                Err(e) => {
                    // One unreachable collection must not take down the rest.
                    error!(%collection, "failed to enumerate collection: {e}");
                }
            }
        }

        info!(
            total = agents.len(),
            session = %session,
            "agent load pass complete"
        );
        agents
    }

    async fn load_collection(
        &self,
        collection: Collection,
        session: &SessionToken,
        agents: &mut HashMap<String, DynAgent>,
    ) -> Result<usize, LoadError> {
        let files = self.store.list(collection).await?;
        let mut loaded = 0usize;

        for file_id in files {
            if !collection.is_eligible(&file_id) {
                continue;
            }
            let location = SourceLocation::new(collection, file_id.clone());
            match self.load_unit(collection, &file_id, session).await {
                Ok(unit) => {
                    for agent in self.instantiate(&location, &unit) {
                        // Last-loaded-wins, both within and across collections.
                        agents.insert(agent.name().to_string(), agent);
                        loaded += 1;
                    }
                }
                Err(e) => {
                    warn!(unit = %location, "skipping unit: {e}");
                }
            }
        }

        Ok(loaded)
    }

    /// Fetch, materialize and compile one unit, or reuse the unit already
    /// imported under this session. The cache check happens before the
    /// fetch, so a repeat load within a session costs no storage round trip.
    async fn load_unit(
        &self,
        collection: Collection,
        file_id: &str,
        session: &SessionToken,
    ) -> Result<Arc<ScriptUnit>, LoadError> {
        let key = CacheKey::new(collection, file_id, session);
        if let Some(unit) = self.cache.get(&key).await {
            debug!(key = %key, "module cache hit");
            return Ok(unit);
        }

        let content = self
            .store
            .read(collection, file_id)
            .await?
            .ok_or_else(|| LoadError::Fetch(format!("{collection}/{file_id} disappeared")))?;

        let temp_path = self.materialize(collection, file_id, session, &content).await?;
        let compiled = ScriptUnit::compile_file(&self.engine, &temp_path);

        // The temp file goes away whether or not the compile worked.
        if let Err(e) = tokio::fs::remove_file(&temp_path).await {
            warn!(path = %temp_path.display(), "failed to remove temp file: {e}");
        }

        let unit = Arc::new(compiled?);
        Ok(self.cache.insert_if_absent(key, unit).await)
    }

    /// Write fetched source to a session-scoped temp path so two sessions
    /// materializing the same file never collide.
    async fn materialize(
        &self,
        collection: Collection,
        file_id: &str,
        session: &SessionToken,
        content: &[u8],
    ) -> Result<PathBuf, LoadError> {
        let dir = self.temp_root.join(collection.prefix());
        tokio::fs::create_dir_all(&dir).await?;

        let stem = file_id.strip_suffix(".rhai").unwrap_or(file_id);
        let path = dir.join(format!("{stem}_{session}.rhai"));
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    fn instantiate(&self, location: &SourceLocation, unit: &Arc<ScriptUnit>) -> Vec<DynAgent> {
        let registrations = match unit.registrations() {
            Ok(regs) => regs,
            Err(e) => {
                warn!(unit = %location, "no usable registrations: {e}");
                return Vec::new();
            }
        };

        let mut instances: Vec<DynAgent> = Vec::new();
        for registration in registrations {
            let name = registration.name.clone();
            match ScriptAgent::new(unit.clone(), registration) {
                Ok(agent) => {
                    debug!(agent = %name, unit = %location, "loaded agent");
                    instances.push(Arc::new(agent));
                }
                Err(e) => {
                    // Sibling declarations in the same unit still get a chance.
                    warn!(agent = %name, unit = %location, "skipping agent: {e}");
                }
            }
        }
        instances
    }
}
