//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! prober.rs:
//!     probe_all(targets)
//!     → worker pool claims target indices from a shared counter
//!     → probe.rs (pluggable reachability check, default TCP connect)
//!         → resolver.rs (hostname → IP, TTL cache)
//!     → update Target: healthy / failures / alive / last check
//!
//! Background:
//!     lifecycle::PeriodicTask → probe_all(snapshot) → sleep(interval) → ...
//! ```
//!
//! # Design Decisions
//! - A failed probe is a value (`false`), never an error
//! - No locks are held while a probe is in flight
//! - Consecutive failures >= threshold marks a target not alive;
//!   the next successful probe revives it

pub mod probe;
pub mod prober;
pub mod resolver;

pub use probe::{parse_address, Probe, TcpConnectProbe};
pub use prober::{HealthProber, ProberOptions};
pub use resolver::{Resolve, ResolverCache, SystemResolver};
