//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by mapping, status
//! - `gateway_request_duration_seconds` (histogram): latency by mapping
//! - `gateway_cache_lookups_total` (counter): lookups by result (hit, miss, error)
//! - `gateway_mappings_registered` (gauge): size of the registry

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

/// Record one finished request. `mapping` is `"none"` when nothing matched.
pub fn record_request(mapping: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "mapping" => mapping.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", "mapping" => mapping.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    ::metrics::counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_mappings(total: usize) {
    ::metrics::gauge!("gateway_mappings_registered").set(total as f64);
}
