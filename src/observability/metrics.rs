use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Interception metrics
    pub intercepted_requests: IntCounterVec,

    // Cache metrics
    pub cache_lookups: IntCounterVec,
    pub cached_tokens: IntGauge,
    pub purge_evictions: IntCounter,
    pub token_decode_failures: IntCounter,

    // Issuer metrics
    pub issuer_requests: IntCounterVec,
    pub issuer_failures: IntCounter,
    pub issuer_batch_size: HistogramVec,
    pub issuer_duration: HistogramVec,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("tokenrelay".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Interception
            intercepted_requests: IntCounterVec::new(Opts::new("intercepted_requests_total", "Intercepted requests by outcome"),&["outcome"],).unwrap(),

            // Cache
            cache_lookups: IntCounterVec::new(Opts::new("cache_lookups_total", "Token cache lookups by result"),&["result"],).unwrap(),
            cached_tokens: IntGauge::new("cached_tokens", "Tokens currently cached").unwrap(),
            purge_evictions: IntCounter::new("cache_purge_evictions_total", "Stale tokens evicted by the background purge").unwrap(),
            token_decode_failures: IntCounter::new("token_decode_failures_total", "Issued tokens rejected for a missing or invalid expiry").unwrap(),

            // Issuer
            issuer_requests: IntCounterVec::new(Opts::new("issuer_requests_total", "Issuer calls by mode"),&["mode"],).unwrap(),
            issuer_failures: IntCounter::new("issuer_failures_total", "Issuer calls that failed").unwrap(),
            issuer_batch_size: HistogramVec::new(HistogramOpts::new("issuer_batch_size", "Resource ids per issuer call").buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),&["mode"],).unwrap(),
            issuer_duration: HistogramVec::new(HistogramOpts::new("issuer_duration_seconds", "Issuer call duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),&["mode"],).unwrap(),

            // Config/runtime
            config_validation_errors: IntCounter::new("config_validation_errors_total","Validation errors during startup",).unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.intercepted_requests.clone())).unwrap();
        reg.register(Box::new(metrics.cache_lookups.clone())).unwrap();
        reg.register(Box::new(metrics.cached_tokens.clone())).unwrap();
        reg.register(Box::new(metrics.purge_evictions.clone())).unwrap();
        reg.register(Box::new(metrics.token_decode_failures.clone())).unwrap();
        reg.register(Box::new(metrics.issuer_requests.clone())).unwrap();
        reg.register(Box::new(metrics.issuer_failures.clone())).unwrap();
        reg.register(Box::new(metrics.issuer_batch_size.clone())).unwrap();
        reg.register(Box::new(metrics.issuer_duration.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
