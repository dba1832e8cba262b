//! In-process load balancing core.
//!
//! Keeps a pool of backend targets, probes their reachability in the
//! background, and picks the next target per request with a round-robin or
//! weighted round-robin strategy that prefers healthy targets and falls back
//! to merely alive ones.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::BalancerConfig;
pub use health::HealthProber;
pub use load_balancer::{Balancer, BalancerError, Strategy, Target};
