//! Loading, caching, eviction and reload scheduling behavior.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use proteus::domain::{Agent, AgentMetadata, AgentParams, DynAgent};
use proteus::loader::{
    AgentLoader, AgentRegistry, Collection, ModuleCache, ObjectSourceStore, ReloadScheduler,
    ScriptEngine, SessionToken, SourceStore, StoreError, RELOAD_MARKER,
};

/// Counts store operations so tests can assert on fetch behavior, and can be
/// switched into a failing mode to simulate unreachable storage.
struct InstrumentedStore {
    inner: ObjectSourceStore,
    lists: AtomicUsize,
    reads: AtomicUsize,
    fail_all: AtomicBool,
}

impl InstrumentedStore {
    fn new(root: &std::path::Path) -> Self {
        Self {
            inner: ObjectSourceStore::local(root).unwrap(),
            lists: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            fail_all: AtomicBool::new(false),
        }
    }

    fn fail(&self) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(StoreError::NotConfigured);
        }
        Ok(())
    }
}

#[async_trait]
impl SourceStore for InstrumentedStore {
    async fn list(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        self.fail()?;
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(collection).await
    }

    async fn read(&self, collection: Collection, file_id: &str) -> Result<Option<Bytes>, StoreError> {
        self.fail()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(collection, file_id).await
    }

    async fn write(
        &self,
        collection: Collection,
        file_id: &str,
        content: Bytes,
    ) -> Result<(), StoreError> {
        self.inner.write(collection, file_id, content).await
    }

    async fn read_path(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        self.fail()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_path(path).await
    }

    async fn write_path(&self, path: &str, content: Bytes) -> Result<(), StoreError> {
        self.inner.write_path(path, content).await
    }
}

/// Stand-in for a bundled native agent.
struct WeatherAgent {
    metadata: AgentMetadata,
}

impl WeatherAgent {
    fn new() -> Self {
        Self {
            metadata: AgentMetadata::new("Weather", "Reports the weather", serde_json::json!({})),
        }
    }
}

#[async_trait]
impl Agent for WeatherAgent {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    async fn perform(&self, _params: AgentParams) -> anyhow::Result<String> {
        Ok("sunny".to_string())
    }
}

fn script_unit(name: &str, output: &str) -> String {
    format!(
        r#"
fn register() {{
    [#{{ name: "{name}", description: "test unit", entry: "run" }}]
}}

fn run(params) {{
    "{output}"
}}
"#
    )
}

struct Fixture {
    _dir: TempDir,
    store: Arc<InstrumentedStore>,
    loader: AgentLoader,
    cache: Arc<ModuleCache>,
}

fn fixture(locals: Vec<DynAgent>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InstrumentedStore::new(dir.path()));
    let cache = Arc::new(ModuleCache::new());
    let loader = AgentLoader::new(
        store.clone(),
        cache.clone(),
        ScriptEngine::new(),
        locals,
    );
    Fixture {
        _dir: dir,
        store,
        loader,
        cache,
    }
}

async fn put_script(store: &InstrumentedStore, collection: Collection, file_id: &str, source: &str) {
    store
        .write(collection, file_id, Bytes::from(source.to_string()))
        .await
        .unwrap();
}

async fn call(agents: &HashMap<String, DynAgent>, name: &str) -> String {
    agents
        .get(name)
        .unwrap_or_else(|| panic!("agent {name} missing"))
        .perform(AgentParams::new())
        .await
        .unwrap()
}

// P1: loading the same location twice within one session produces one cache
// entry and does not re-fetch the second time.
#[tokio::test]
async fn repeat_load_within_session_is_idempotent() {
    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;

    let session = SessionToken::from("1000000000");
    let first = f.loader.load_with_session(&session).await;
    assert_eq!(first.len(), 1);
    assert_eq!(f.cache.len().await, 1);
    let reads_after_first = f.store.reads.load(Ordering::SeqCst);

    let second = f.loader.load_with_session(&session).await;
    assert_eq!(second.len(), 1);
    assert_eq!(f.cache.len().await, 1);
    assert_eq!(
        f.store.reads.load(Ordering::SeqCst),
        reads_after_first,
        "second pass must not re-fetch"
    );
}

// P2: the same file loaded in two sessions gets two cache keys and two
// independent instances; evicting one session leaves the other usable.
#[tokio::test]
async fn sessions_are_isolated() {
    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;

    let s1 = SessionToken::from("1000000001");
    let first = f.loader.load_with_session(&s1).await;

    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v2"),
    )
    .await;

    let s2 = SessionToken::from("1000000002");
    let second = f.loader.load_with_session(&s2).await;

    assert_eq!(f.cache.len().await, 2, "one entry per session");
    assert_eq!(call(&first, "Stock").await, "stock-v1");
    assert_eq!(call(&second, "Stock").await, "stock-v2");

    // Evicting S1 must not affect S2's entry or S1's live instance.
    let evicted = f.cache.evict_stale(&s2).await;
    assert_eq!(evicted, 1);
    assert_eq!(f.cache.len().await, 1);
    assert_eq!(call(&first, "Stock").await, "stock-v1");
    assert_eq!(call(&second, "Stock").await, "stock-v2");
}

// P3: name collisions resolve to the later collection in the fixed scan
// order, regardless of listing order within collections.
#[tokio::test]
async fn collision_resolution_follows_scan_order() {
    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "quotes_agent.rhai",
        &script_unit("Quotes", "from-agents"),
    )
    .await;
    put_script(
        &f.store,
        Collection::RemoteMultiAgents,
        "quotes_agent.rhai",
        &script_unit("Quotes", "from-multi"),
    )
    .await;
    put_script(
        &f.store,
        Collection::RemoteConnectors,
        "quotes_connector.rhai",
        &script_unit("Quotes", "from-connectors"),
    )
    .await;

    let agents = f
        .loader
        .load_with_session(&SessionToken::from("1000000003"))
        .await;
    assert_eq!(call(&agents, "Quotes").await, "from-connectors");
}

// Local agents are shadowed by remote ones under the same rule.
#[tokio::test]
async fn remote_agents_shadow_locals() {
    let f = fixture(vec![Arc::new(WeatherAgent::new())]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "weather_agent.rhai",
        &script_unit("Weather", "scripted-weather"),
    )
    .await;

    let agents = f
        .loader
        .load_with_session(&SessionToken::from("1000000004"))
        .await;
    assert_eq!(call(&agents, "Weather").await, "scripted-weather");
}

// P4: one bad unit out of five does not take down the others, and a bad
// declaration inside a unit does not take down its siblings.
#[tokio::test]
async fn partial_failures_are_isolated() {
    let f = fixture(vec![]);
    for i in 0..3 {
        put_script(
            &f.store,
            Collection::RemoteAgents,
            &format!("good{i}_agent.rhai"),
            &script_unit(&format!("Good{i}"), "ok"),
        )
        .await;
    }
    // Does not parse at all.
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "broken_agent.rhai",
        "fn register( {",
    )
    .await;
    // Parses, but one of two declarations names a missing entry.
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "mixed_agent.rhai",
        r#"
fn register() {
    [#{ name: "MixedGood", entry: "run" },
     #{ name: "MixedBad", entry: "missing" }]
}
fn run(params) { "ok" }
"#,
    )
    .await;

    let agents = f
        .loader
        .load_with_session(&SessionToken::from("1000000005"))
        .await;

    let mut names: Vec<&str> = agents.keys().map(String::as_str).collect();
    names.sort();
    assert_eq!(names, ["Good0", "Good1", "Good2", "MixedGood"]);
}

// P5: a snapshot taken before a swap stays internally consistent; after the
// swap every lookup sees only the new set.
#[tokio::test]
async fn registry_swaps_are_atomic() {
    let registry = AgentRegistry::new();

    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;
    let v1 = f
        .loader
        .load_with_session(&SessionToken::from("2000000001"))
        .await;
    registry.swap(v1).await;

    let before = registry.snapshot().await;

    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v2"),
    )
    .await;
    let v2 = f
        .loader
        .load_with_session(&SessionToken::from("2000000002"))
        .await;
    registry.swap(v2).await;

    // The old snapshot is still entirely v1; the registry is entirely v2.
    assert_eq!(call(&before, "Stock").await, "stock-v1");
    let after = registry.snapshot().await;
    assert_eq!(call(&after, "Stock").await, "stock-v2");
}

// P6: two checks within the check interval probe storage at most once.
#[tokio::test]
async fn scheduler_rate_limits_probes() {
    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;
    let registry = AgentRegistry::new();
    let scheduler = ReloadScheduler::new(30, 300);

    let t0 = Utc::now();
    let first = scheduler
        .check_and_reload_at(t0 + Duration::seconds(31), &f.loader, &registry)
        .await;
    assert!(!first, "no marker and not stale: no reload");
    let reads_after_probe = f.store.reads.load(Ordering::SeqCst);
    assert!(reads_after_probe >= 1, "first check must probe the marker");

    let second = scheduler
        .check_and_reload_at(t0 + Duration::seconds(32), &f.loader, &registry)
        .await;
    assert!(!second);
    assert_eq!(
        f.store.reads.load(Ordering::SeqCst),
        reads_after_probe,
        "second check within the interval must not probe"
    );
}

// P7: once the force interval elapses, the next check reloads even without
// any marker.
#[tokio::test]
async fn scheduler_forces_reload_after_staleness() {
    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;
    let registry = AgentRegistry::new();
    let scheduler = ReloadScheduler::new(30, 300);

    let t0 = Utc::now();
    let reloaded = scheduler
        .check_and_reload_at(t0 + Duration::seconds(301), &f.loader, &registry)
        .await;
    assert!(reloaded);
    assert!(registry.get("Stock").await.is_some());
}

// A fresh marker triggers a reload ahead of the force interval, and the
// marker is blanked afterwards.
#[tokio::test]
async fn marker_triggers_reload_and_is_cleared() {
    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;
    let registry = AgentRegistry::new();
    let scheduler = ReloadScheduler::new(30, 300);

    let marker_time = Utc::now() + Duration::seconds(5);
    f.store
        .write(
            Collection::RemoteAgents,
            RELOAD_MARKER,
            Bytes::from(marker_time.to_rfc3339()),
        )
        .await
        .unwrap();

    let t0 = Utc::now();
    let reloaded = scheduler
        .check_and_reload_at(t0 + Duration::seconds(31), &f.loader, &registry)
        .await;
    assert!(reloaded);
    assert!(registry.get("Stock").await.is_some());

    let marker = f
        .store
        .read(Collection::RemoteAgents, RELOAD_MARKER)
        .await
        .unwrap()
        .unwrap();
    assert!(marker.is_empty(), "marker must be blanked after acting on it");
}

// P8: a reload pass that produces nothing keeps the previous registry fully
// intact and queryable.
#[tokio::test]
async fn empty_reload_keeps_previous_registry() {
    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;
    let registry = AgentRegistry::new();
    let scheduler = ReloadScheduler::new(30, 300);

    assert!(scheduler.force_reload(&f.loader, &registry).await);
    assert_eq!(registry.len().await, 1);

    // Storage goes dark; the next reload returns nothing.
    f.store.fail_all.store(true, Ordering::SeqCst);
    assert!(!scheduler.force_reload(&f.loader, &registry).await);

    assert_eq!(registry.len().await, 1);
    assert_eq!(
        call(&registry.snapshot().await, "Stock").await,
        "stock-v1"
    );
}

// End to end: a local Weather agent plus a remote Stock agent across two
// sessions, with stale cache entries surviving until an eviction pass.
#[tokio::test]
async fn weather_stock_scenario() {
    let f = fixture(vec![Arc::new(WeatherAgent::new())]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;

    let s1 = SessionToken::from("3000000001");
    let first = f.loader.load_with_session(&s1).await;
    assert_eq!(first.len(), 2);
    assert_eq!(call(&first, "Weather").await, "sunny");
    assert_eq!(call(&first, "Stock").await, "stock-v1");

    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v2"),
    )
    .await;

    let s2 = SessionToken::from("3000000002");
    let second = f.loader.load_with_session(&s2).await;
    assert_eq!(second.len(), 2);
    assert_eq!(call(&second, "Stock").await, "stock-v2");

    // Stale S1 entry lingers until an explicit eviction pass runs.
    assert_eq!(f.cache.len().await, 2);
    f.cache.evict_stale(&s2).await;
    assert_eq!(f.cache.len().await, 1);
}

// The scheduler-run reload path evicts stale sessions as part of the pass.
#[tokio::test]
async fn scheduler_reload_evicts_stale_sessions() {
    let f = fixture(vec![]);
    put_script(
        &f.store,
        Collection::RemoteAgents,
        "stock_agent.rhai",
        &script_unit("Stock", "stock-v1"),
    )
    .await;

    let s1 = SessionToken::from("1");
    f.loader.load_with_session(&s1).await;
    assert_eq!(f.cache.len().await, 1);

    let registry = AgentRegistry::new();
    let scheduler = ReloadScheduler::new(30, 300);
    assert!(scheduler.force_reload(&f.loader, &registry).await);

    // Only the new session's entry remains.
    assert_eq!(f.cache.len().await, 1);
    assert!(!f.cache.sessions().await.contains(&s1));
}
