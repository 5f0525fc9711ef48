//! Metrics collection and exposition.
//!
//! # Metrics
//! - `backend_modules_total` (counter): module load attempts by status
//! - `backend_unmatched_requests_total` (counter): boundary outcomes
//! - `backend_rate_limited_total` (counter): rejected requests
//! - `backend_update_checks_total` (counter): version polls by result
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Exporter is optional and off by default

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_module_load(status: &'static str) {
    counter!("backend_modules_total", "status" => status).increment(1);
}

pub fn record_unmatched(outcome: &'static str) {
    counter!("backend_unmatched_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited() {
    counter!("backend_rate_limited_total").increment(1);
}

pub fn record_update_check(result: &'static str) {
    counter!("backend_update_checks_total", "result" => result).increment(1);
}
