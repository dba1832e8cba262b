//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated)
//!     → Balancer::from_config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Runtime knobs (interval, threshold, strategy) are set on the balancer, not reloaded from disk

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{BalancerConfig, HealthCheckConfig, ObservabilityConfig, TargetConfig};
pub use validation::{validate_config, ValidationError};
