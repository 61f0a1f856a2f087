//! Dynamic agent loading and hot-reload.
//!
//! Remote agent source is Rhai script kept in an object store. A load pass
//! walks every collection in a fixed order, materializes each eligible file
//! into a session-scoped temp file, compiles it, binds the compiled unit
//! into the [`ModuleCache`] under the pass's session token, and instantiates
//! every agent the unit registers. The resulting name-to-instance map
//! replaces the [`AgentRegistry`] as a whole; readers never observe a
//! half-built registry.

mod error;
#[allow(clippy::module_inception)]
mod loader;
mod module_cache;
mod registry;
mod scheduler;
mod script;
mod source;
mod store;

pub use error::{LoadError, StoreError};
pub use loader::AgentLoader;
pub use module_cache::{CacheKey, ModuleCache};
pub use registry::AgentRegistry;
pub use scheduler::ReloadScheduler;
pub use script::{Registration, ScriptAgent, ScriptEngine, ScriptUnit};
pub use source::{Collection, SessionToken, SourceLocation, RELOAD_MARKER};
pub use store::{ObjectSourceStore, SourceStore};

use crate::config::LoaderSettings;
use crate::domain::DynAgent;
use std::sync::Arc;

/// Process-scoped loader state: the one owner of the module cache, the live
/// registry and the reload scheduler. All mutation goes through here.
pub struct LoaderState {
    store: Arc<dyn SourceStore>,
    loader: AgentLoader,
    registry: AgentRegistry,
    scheduler: ReloadScheduler,
}

impl LoaderState {
    pub fn new(
        store: Arc<dyn SourceStore>,
        engine: ScriptEngine,
        locals: Vec<DynAgent>,
        settings: &LoaderSettings,
    ) -> Self {
        let cache = Arc::new(ModuleCache::new());
        let loader = AgentLoader::new(store.clone(), cache, engine, locals);
        Self {
            store,
            loader,
            registry: AgentRegistry::new(),
            scheduler: ReloadScheduler::new(settings.check_interval_secs, settings.force_interval_secs),
        }
    }

    pub fn store(&self) -> &Arc<dyn SourceStore> {
        &self.store
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn loader(&self) -> &AgentLoader {
        &self.loader
    }

    /// First load at process start. Local agents are always present, so the
    /// registry is populated even when remote storage is unreachable.
    pub async fn initial_load(&self) {
        let session = SessionToken::now();
        let agents = self.loader.load_with_session(&session).await;
        tracing::info!(count = agents.len(), session = %session, "initial agent load complete");
        self.registry.swap(agents).await;
        self.scheduler.mark_loaded().await;
    }

    /// Cheap per-request check; reloads and swaps the registry when due.
    pub async fn check_and_reload(&self) -> bool {
        self.scheduler
            .check_and_reload(&self.loader, &self.registry)
            .await
    }

    /// Unconditional reload, bypassing the scheduler's rate limit. Used by
    /// dispatch when a requested agent is missing and by the reload endpoint.
    pub async fn force_reload(&self) -> bool {
        self.scheduler
            .force_reload(&self.loader, &self.registry)
            .await
    }
}
