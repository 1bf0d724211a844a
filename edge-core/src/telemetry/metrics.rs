//! Prometheus metrics setup and metric definitions

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    // Seconds. Sub-millisecond buckets cover the local endpoints.
    let buckets = [
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)
        .context("Failed to set histogram buckets")?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Register metric descriptions and emit initial values so HELP/TYPE lines
/// are present from startup.
pub fn describe_metrics() {
    describe_counter!("edge_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "edge_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "edge_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    describe_counter!(
        "edge_rate_limit_throttled_total",
        "Total number of rate-limited requests"
    );
    describe_counter!(
        "edge_rate_limit_store_fallback_total",
        "Rate limit checks served by the in-memory fallback after a store error"
    );

    describe_counter!(
        "edge_upstream_errors_total",
        "Upstream call failures by upstream and kind"
    );
    describe_counter!(
        "edge_aggregation_partial_failures_total",
        "Aggregations in which at least one order fetch failed"
    );
    describe_counter!(
        "edge_proxy_requests_total",
        "Requests forwarded through the route table, by route and upstream status"
    );

    counter!("edge_rate_limit_throttled_total").absolute(0);
    counter!("edge_rate_limit_store_fallback_total").absolute(0);
    counter!("edge_aggregation_partial_failures_total").absolute(0);
    gauge!("edge_http_requests_in_flight").set(0.0);
}
