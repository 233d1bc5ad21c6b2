use ledger_core::metrics::CacheMetrics;
use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use lazy_static::lazy_static;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total HTTP requests"),
        &["route", "status"]
    ).expect("metric can be created");

    // Business metrics
    pub static ref EXPENSES_SHARED: IntCounter = IntCounter::new(
        "expenses_shared_total",
        "Total group expenses shared"
    ).expect("metric can be created");

    pub static ref LOANS_RECORDED: IntCounter = IntCounter::new(
        "loans_recorded_total",
        "Total loan records appended to the ledger"
    ).expect("metric can be created");

    // Balance cache metrics, mirrored from the core counters on scrape
    pub static ref CACHE_HITS: IntGauge = IntGauge::new(
        "balance_cache_hits",
        "Balance reads served from the cache"
    ).expect("metric can be created");

    pub static ref CACHE_MISSES: IntGauge = IntGauge::new(
        "balance_cache_misses",
        "Balance reads computed from the ledger"
    ).expect("metric can be created");

    pub static ref CACHE_POPULATE_FAILURES: IntGauge = IntGauge::new(
        "balance_cache_populate_failures",
        "Cache populations that failed or timed out"
    ).expect("metric can be created");

    pub static ref CACHE_DELTA_UPDATES: IntGauge = IntGauge::new(
        "balance_cache_delta_updates",
        "Incremental cache updates committed"
    ).expect("metric can be created");

    pub static ref CACHE_UPDATE_FAILURES: IntGauge = IntGauge::new(
        "balance_cache_update_failures",
        "Incremental cache updates that failed and cleared the entry"
    ).expect("metric can be created");

    pub static ref CACHE_HIT_RATE: Gauge = Gauge::new(
        "balance_cache_hit_rate",
        "Percentage of balance reads served from the cache"
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    registry.register(Box::new(EXPENSES_SHARED.clone()))?;
    registry.register(Box::new(LOANS_RECORDED.clone()))?;

    registry.register(Box::new(CACHE_HITS.clone()))?;
    registry.register(Box::new(CACHE_MISSES.clone()))?;
    registry.register(Box::new(CACHE_POPULATE_FAILURES.clone()))?;
    registry.register(Box::new(CACHE_DELTA_UPDATES.clone()))?;
    registry.register(Box::new(CACHE_UPDATE_FAILURES.clone()))?;
    registry.register(Box::new(CACHE_HIT_RATE.clone()))?;

    Ok(())
}

/// Register with the service registry once; later calls are no-ops
pub fn init() {
    if let Err(e) = register_metrics(&REGISTRY) {
        tracing::debug!("Metrics already registered: {}", e);
    }
}

/// Copy a core cache snapshot into the exported gauges
pub fn observe_cache(snapshot: &CacheMetrics) {
    CACHE_HITS.set(snapshot.hits as i64);
    CACHE_MISSES.set(snapshot.misses as i64);
    CACHE_POPULATE_FAILURES.set(snapshot.populate_failures as i64);
    CACHE_DELTA_UPDATES.set(snapshot.delta_updates as i64);
    CACHE_UPDATE_FAILURES.set(snapshot.update_failures as i64);
    CACHE_HIT_RATE.set(snapshot.hit_rate());
}

/// Count one HTTP request
pub fn record_request(route: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route, &status.to_string()])
        .inc();
}

/// Export metrics in Prometheus text format
pub fn gather() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
