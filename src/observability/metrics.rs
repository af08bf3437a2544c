//! Lifecycle metrics.
//!
//! # Metrics
//! - `server_lifecycle_starts_total` (counter): successful starts by server
//! - `server_lifecycle_stops_total` (counter): completed stops by server
//! - `server_lifecycle_faults_total` (counter): fault boundary trips by server
//! - `server_lifecycle_started` (gauge): 1 while started, 0 otherwise

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const STARTS_TOTAL: &str = "server_lifecycle_starts_total";
pub const STOPS_TOTAL: &str = "server_lifecycle_stops_total";
pub const FAULTS_TOTAL: &str = "server_lifecycle_faults_total";
pub const STARTED: &str = "server_lifecycle_started";

pub fn record_started(server: &str) {
    ::metrics::counter!(STARTS_TOTAL, "server" => server.to_string()).increment(1);
    ::metrics::gauge!(STARTED, "server" => server.to_string()).set(1.0);
}

pub fn record_stopped(server: &str) {
    ::metrics::counter!(STOPS_TOTAL, "server" => server.to_string()).increment(1);
    ::metrics::gauge!(STARTED, "server" => server.to_string()).set(0.0);
}

pub fn record_fault(server: &str) {
    ::metrics::counter!(FAULTS_TOTAL, "server" => server.to_string()).increment(1);
}

/// Install the Prometheus recorder with a scrape endpoint on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}
