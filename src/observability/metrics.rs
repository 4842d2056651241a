//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, group
//! - `gateway_request_duration_seconds` (histogram): latency by method, group
//! - `gateway_backend_clients_created_total` (counter): clients by group, version
//! - `gateway_body_filter_rejections_total` (counter): rejected bodies by reason
//! - `gateway_response_transforms_total` (counter): transforms by name, outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is only installed when enabled in config

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, group: &str, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "group" => group.to_string()
    )
    .increment(1);

    ::metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "group" => group.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_client_created(group: &str, version: &str) {
    ::metrics::counter!(
        "gateway_backend_clients_created_total",
        "group" => group.to_string(),
        "version" => version.to_string()
    )
    .increment(1);
}

pub fn record_filter_rejection(reason: &'static str) {
    ::metrics::counter!("gateway_body_filter_rejections_total", "reason" => reason).increment(1);
}

/// Record a transform attempt; `outcome` is "ok" or "error".
pub fn record_transform(transformer: &str, outcome: &'static str) {
    ::metrics::counter!(
        "gateway_response_transforms_total",
        "transformer" => transformer.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
