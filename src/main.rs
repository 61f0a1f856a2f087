use clap::Parser;
use proteus::adapters::api_handler::ApiState;
use proteus::adapters::metrics_handler::MetricsCollector;
use proteus::agents::builtin_agents;
use proteus::assistant::{QueryCache, UsageTracker};
use proteus::cli::Cli;
use proteus::config::{watcher::ConfigWatcher, Settings};
use proteus::loader::{LoaderState, ObjectSourceStore, ScriptEngine, SourceStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    info!("Starting Proteus agent platform on {}:{}", host, port);

    if let Some(s3) = &settings.storage.s3 {
        s3.validate()
            .map_err(|errors| anyhow::anyhow!("S3 configuration invalid:\n{}", errors.join("\n")))?;
    }

    let storage_settings = settings.storage.clone();
    let loader_settings = settings.loader.clone();
    let llm_settings = settings.llm.clone();

    // Wrap settings in Arc<RwLock> for live reload
    let settings = Arc::new(RwLock::new(settings));

    // Reload server settings when the config file changes on disk
    let settings_for_watcher = settings.clone();
    let _watcher = ConfigWatcher::new(vec![cli.config.display().to_string()], move || {
        match Settings::new() {
            Ok(new_settings) => {
                let mut w = settings_for_watcher.blocking_write();
                *w = new_settings;
                info!("Configuration reloaded successfully");
            }
            Err(e) => error!("Failed to reload configuration: {}", e),
        }
    })?;

    // Agent source store (local directory or S3)
    let store: Arc<dyn SourceStore> = Arc::new(ObjectSourceStore::from_settings(&storage_settings)?);

    // Loader state: built-in agents plus whatever remote storage holds
    let engine = ScriptEngine::new();
    let locals = builtin_agents(store.clone(), engine.clone());
    let loader = Arc::new(LoaderState::new(
        store.clone(),
        engine,
        locals,
        &loader_settings,
    ));
    loader.initial_load().await;

    // LLM provider for the dispatch loop
    let llm = proteus::llm::create_provider(&llm_settings)
        .map_err(|e| anyhow::anyhow!("failed to initialize LLM provider: {e}"))?;

    let tracker = Arc::new(UsageTracker::load(store.clone()).await);
    let metrics = Arc::new(MetricsCollector::new()?);
    let cache = Arc::new(QueryCache::with_metrics(
        store.clone(),
        metrics.cache_hits.clone(),
        metrics.cache_misses.clone(),
    ));
    metrics
        .agents_loaded
        .set(loader.registry().len().await as f64);

    let state = ApiState {
        settings,
        loader,
        llm,
        tracker,
        cache,
        metrics,
    };

    let app = proteus::create_app(state).await;

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
