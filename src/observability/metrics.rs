//! Metrics collection and exposition.
//!
//! # Metrics
//! - `composer_requests_total` (counter): dispatched requests by method, status
//! - `composer_request_duration_seconds` (histogram): dispatch latency
//! - `composer_datasource_fetches_total` (counter): fetches by datasource, outcome
//! - `composer_datasource_fetch_duration_seconds` (histogram): fetch latency
//! - `composer_cache_lookups_total` (counter): lookups by datasource, result
//!
//! # Design Decisions
//! - Page names and paths are not labels (unbounded cardinality)
//! - The Prometheus exporter serves its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("composer_requests_total", &labels).increment(1);
    histogram!("composer_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_datasource_fetch(datasource: &str, outcome: &'static str, started: Instant) {
    let labels = [
        ("datasource", datasource.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("composer_datasource_fetches_total", &labels).increment(1);
    histogram!("composer_datasource_fetch_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(datasource: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(
        "composer_cache_lookups_total",
        "datasource" => datasource.to_string(),
        "result" => result
    )
    .increment(1);
}
