//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Prober and balancer produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (fmt subscriber)
//!     → Prometheus scrape endpoint (binary only)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing subscribers/recorders is the binary's job
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
