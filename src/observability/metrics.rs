//! Metrics emission.
//!
//! # Metrics
//! - `balancer_probes_total` (counter): probe outcomes, label `outcome`
//! - `balancer_target_alive` (gauge): 1=alive, 0=not alive, label `address`
//! - `balancer_target_healthy` (gauge): 1=healthy, 0=unhealthy, label `address`
//! - `balancer_selections_total` (counter): label `outcome` (healthy, fallback, none)
//! - `balancer_targets_total` / `balancer_targets_healthy` (gauges): pool size

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::load_balancer::target::Target;

/// Selection outcome label values.
pub const SELECTED_HEALTHY: &str = "healthy";
pub const SELECTED_FALLBACK: &str = "fallback";
pub const SELECTED_NONE: &str = "none";

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_probe(reachable: bool) {
    let outcome = if reachable { "success" } else { "failure" };
    metrics::counter!("balancer_probes_total", "outcome" => outcome).increment(1);
}

pub fn record_target_state(target: &Target) {
    let address = target.address().to_string();
    metrics::gauge!("balancer_target_alive", "address" => address.clone())
        .set(if target.is_alive() { 1.0 } else { 0.0 });
    metrics::gauge!("balancer_target_healthy", "address" => address)
        .set(if target.is_healthy() { 1.0 } else { 0.0 });
}

/// Zero the per-address gauges of a target that left the pool.
pub fn record_target_removed(address: &str) {
    let address = address.to_string();
    metrics::gauge!("balancer_target_alive", "address" => address.clone()).set(0.0);
    metrics::gauge!("balancer_target_healthy", "address" => address).set(0.0);
}

pub fn record_selection(outcome: &'static str) {
    metrics::counter!("balancer_selections_total", "outcome" => outcome).increment(1);
}

pub fn record_pool(total: usize, healthy: usize) {
    metrics::gauge!("balancer_targets_total").set(total as f64);
    metrics::gauge!("balancer_targets_healthy").set(healthy as f64);
}
