//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Caller asks for a target
//!     → balancer.rs (read-locked pool snapshot)
//!     → Apply selection strategy:
//!         - round_robin.rs (rotate through the pool)
//!         - weighted.rs (rotate through a weight-expanded list)
//!     → cursor.rs (healthy first, alive fallback, atomic advance)
//!     → Return target handle or None
//! ```
//!
//! # Design Decisions
//! - The pool is authoritative; strategy state is cursor + caches only
//! - Not-alive targets are never selected
//! - Alive-but-unhealthy targets are selected only when no healthy one exists
//! - Strategy can be swapped at runtime without touching the pool

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub mod balancer;
pub mod cursor;
pub mod round_robin;
pub mod target;
pub mod weighted;

pub use balancer::{Balancer, BalancerOptions, BalancerStats};
pub use cursor::Pick;
pub use round_robin::RoundRobin;
pub use target::{ConnectionGuard, Target, TargetStatus};
pub use weighted::WeightedRoundRobin;

/// Load balancing strategy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    /// Reserved, no selector implements it yet.
    LeastConnections,
    /// Reserved, no selector implements it yet.
    IpHash,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::WeightedRoundRobin => "weighted_round_robin",
            Strategy::LeastConnections => "least_connections",
            Strategy::IpHash => "ip_hash",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Strategy::RoundRobin | Strategy::WeightedRoundRobin)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(Strategy::RoundRobin),
            "weighted_round_robin" => Ok(Strategy::WeightedRoundRobin),
            "least_connections" => Ok(Strategy::LeastConnections),
            "ip_hash" => Ok(Strategy::IpHash),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Errors raised by balancer construction and control.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// A strategy was given no targets to choose from.
    #[error("server list cannot be empty")]
    EmptyPool,

    /// The strategy tag is reserved but not implemented.
    #[error("unsupported load balancing strategy: {0}")]
    UnsupportedStrategy(Strategy),

    /// A background thread could not be started.
    #[error("failed to spawn background task: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Selection algorithm over a pool of targets.
pub trait Selector: Send + Sync + fmt::Debug {
    fn strategy(&self) -> Strategy;

    /// Pick the next target from `pool`, or `None` if nothing is alive.
    fn next_target(&self, pool: &[Arc<Target>]) -> Option<Pick>;

    /// Move the cursor one position without selecting.
    fn advance(&self, pool: &[Arc<Target>]);

    /// Current cursor position.
    fn position(&self) -> usize;

    /// Fresh selector of the same strategy at the same cursor position.
    fn duplicate(&self) -> Box<dyn Selector>;
}

/// Build the selector for `strategy`.
pub fn selector_for(strategy: Strategy) -> Result<Box<dyn Selector>, BalancerError> {
    match strategy {
        Strategy::RoundRobin => Ok(Box::new(RoundRobin::new())),
        Strategy::WeightedRoundRobin => Ok(Box::new(WeightedRoundRobin::new())),
        other => Err(BalancerError::UnsupportedStrategy(other)),
    }
}
