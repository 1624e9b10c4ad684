//! Prometheus metrics for monitoring the gateway.
//!
//! A single registry is created lazily; request-level metrics are recorded by
//! the middleware and upstream/stream metrics by the handlers and relays.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, GaugeVec, HistogramVec,
    IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Token usage reported by the upstream, by model and token type
    pub token_usage: IntCounterVec,

    /// Failed upstream calls by classified kind
    pub upstream_errors: IntCounterVec,

    /// Transport events emitted by the stream relays
    pub stream_chunks: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Subsequent calls return the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "gateway_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "gateway_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "gateway_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let token_usage = register_int_counter_vec!(
            "gateway_tokens_total",
            "Total number of tokens reported by the upstream provider",
            &["model", "token_type"]
        )
        .expect("Failed to register token_usage metric");

        let upstream_errors = register_int_counter_vec!(
            "gateway_upstream_errors_total",
            "Failed upstream completion calls by kind",
            &["kind"]
        )
        .expect("Failed to register upstream_errors metric");

        let stream_chunks = register_int_counter_vec!(
            "gateway_stream_chunks_total",
            "Events emitted by stream relays",
            &["relay"]
        )
        .expect("Failed to register stream_chunks metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            token_usage,
            upstream_errors,
            stream_chunks,
        }
    })
}

/// Get the global metrics instance, initializing it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}
