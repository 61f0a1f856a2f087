use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

pub struct MetricsCollector {
    registry: Registry,

    // Request metrics
    pub requests_total: CounterVec,
    pub request_duration: HistogramVec,

    // Loader metrics
    pub reloads_total: CounterVec,
    pub agents_loaded: Gauge,

    // Query cache metrics
    pub cache_hits: Counter,
    pub cache_misses: Counter,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("proteus_requests_total", "Total number of requests"),
            &["method", "endpoint", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "proteus_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["method", "endpoint"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let reloads_total = CounterVec::new(
            Opts::new("proteus_reloads_total", "Total agent registry reloads"),
            &["trigger"],
        )?;
        registry.register(Box::new(reloads_total.clone()))?;

        let agents_loaded = Gauge::new(
            "proteus_agents_loaded",
            "Number of agents in the live registry",
        )?;
        registry.register(Box::new(agents_loaded.clone()))?;

        let cache_hits = Counter::new("proteus_cache_hits_total", "Total query cache hits")?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses = Counter::new("proteus_cache_misses_total", "Total query cache misses")?;
        registry.register(Box::new(cache_misses.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            reloads_total,
            agents_loaded,
            cache_hits,
            cache_misses,
        })
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics collector")
    }
}

pub struct MetricsHandler {
    collector: Arc<MetricsCollector>,
}

impl MetricsHandler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    pub async fn metrics(&self) -> String {
        self.collector.encode().unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
            String::from("# Error encoding metrics\n")
        })
    }
}
