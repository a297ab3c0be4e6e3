//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mock_proxy_icap_requests_total` (counter): ICAP messages by method, decision
//! - `mock_proxy_mock_responses_total` (counter): mock responses by kind, status
//! - `mock_proxy_substitution_writes_total` (counter): registrations via the API
//! - `mock_proxy_icap_connections_active` (gauge): open ICAP connections

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and serve `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_icap_request(method: &str, decision: &'static str) {
    metrics::counter!(
        "mock_proxy_icap_requests_total",
        "method" => method.to_string(),
        "decision" => decision
    )
    .increment(1);
}

pub fn record_mock_response(kind: &'static str, status: u16) {
    metrics::counter!(
        "mock_proxy_mock_responses_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_substitution_write() {
    metrics::counter!("mock_proxy_substitution_writes_total").increment(1);
}

pub fn icap_connection_opened() {
    metrics::gauge!("mock_proxy_icap_connections_active").increment(1.0);
}

pub fn icap_connection_closed() {
    metrics::gauge!("mock_proxy_icap_connections_active").decrement(1.0);
}
