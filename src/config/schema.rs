//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::health::prober::ProberOptions;
use crate::load_balancer::balancer::BalancerOptions;
use crate::load_balancer::Strategy;

/// Root configuration for the balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Selection strategy.
    pub strategy: Strategy,

    /// Initial target pool.
    pub targets: Vec<TargetConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Backend target definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Target address (e.g., "127.0.0.1:3000" or "backend.local").
    pub address: String,

    /// Weight for weighted round-robin (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run the background health-check loop.
    pub enabled: bool,

    /// Interval between balancer health checks in milliseconds.
    pub interval_ms: u64,

    /// Per-probe timeout in milliseconds.
    pub probe_timeout_ms: u64,

    /// Interval of the prober's own background loop in milliseconds.
    pub probe_interval_ms: u64,

    /// Probe worker pool size.
    pub workers: usize,

    /// Resolver cache TTL in seconds.
    pub dns_cache_ttl_secs: u64,

    /// Consecutive failures before marking a target not alive.
    pub failure_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
            probe_timeout_ms: 1000,
            probe_interval_ms: 5000,
            workers: 4,
            dns_cache_ttl_secs: 300,
            failure_threshold: 3,
        }
    }
}

impl HealthCheckConfig {
    pub fn prober_options(&self) -> ProberOptions {
        ProberOptions {
            timeout: Duration::from_millis(self.probe_timeout_ms),
            interval: Duration::from_millis(self.probe_interval_ms),
            workers: self.workers.max(1),
            dns_cache_ttl: Duration::from_secs(self.dns_cache_ttl_secs),
            failure_threshold: self.failure_threshold.max(1),
        }
    }

    pub fn balancer_options(&self) -> BalancerOptions {
        BalancerOptions {
            health_check_interval: Duration::from_millis(self.interval_ms),
            prober: self.prober_options(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,

    /// Interval between statistics log lines in seconds.
    pub stats_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
            stats_interval_secs: 10,
        }
    }
}
