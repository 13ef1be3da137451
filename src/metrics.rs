//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("convene_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref ACTIVITIES_RECEIVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("convene_activities_received_total", "Total number of ActivityPub activities received"),
        &["activity_type"]
    ).expect("metric can be created");
    pub static ref ACTIVITIES_SENT_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("convene_activities_sent_total", "Total number of ActivityPub activities broadcast"),
        &["activity_type"]
    ).expect("metric can be created");
    pub static ref FEDERATION_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("convene_federation_requests_total", "Total number of federation requests"),
        &["direction", "status"]
    ).expect("metric can be created");
    pub static ref DELIVERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("convene_deliveries_total", "Per-recipient delivery outcomes"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref DELIVERY_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "convene_delivery_duration_seconds",
            "Per-recipient delivery duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["outcome"]
    ).expect("metric can be created");

    // Key cache Metrics
    pub static ref KEY_CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("convene_key_cache_hits_total", "Public key cache hits"),
        &["result"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("convene_errors_total", "Total number of errors returned to callers"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Register all instruments with the global registry.
///
/// Must be called once at startup before the first scrape.
pub fn init_metrics() {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(ACTIVITIES_RECEIVED_TOTAL.clone()),
        Box::new(ACTIVITIES_SENT_TOTAL.clone()),
        Box::new(FEDERATION_REQUESTS_TOTAL.clone()),
        Box::new(DELIVERIES_TOTAL.clone()),
        Box::new(DELIVERY_DURATION_SECONDS.clone()),
        Box::new(KEY_CACHE_HITS_TOTAL.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for metric in metrics {
        if let Err(e) = REGISTRY.register(metric) {
            // Re-registration happens when tests build multiple routers.
            tracing::debug!(error = %e, "Metric already registered");
        }
    }
}
