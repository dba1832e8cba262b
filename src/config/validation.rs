//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check target addresses are unique and parse
//! - Validate value ranges (intervals and timeouts > 0, threshold >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::BalancerConfig;
use crate::health::probe::parse_address;
use crate::load_balancer::Strategy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no targets configured")]
    NoTargets,

    #[error("duplicate target address: {0}")]
    DuplicateTarget(String),

    #[error("invalid target address: {0}")]
    InvalidAddress(String),

    #[error("strategy {0} is not supported")]
    UnsupportedStrategy(Strategy),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.strategy.is_supported() {
        errors.push(ValidationError::UnsupportedStrategy(config.strategy));
    }

    if config.targets.is_empty() {
        errors.push(ValidationError::NoTargets);
    }

    let mut seen = HashSet::new();
    for target in &config.targets {
        if !seen.insert(target.address.as_str()) {
            errors.push(ValidationError::DuplicateTarget(target.address.clone()));
        }
        if target.address.is_empty() || parse_address(&target.address).is_none() {
            errors.push(ValidationError::InvalidAddress(target.address.clone()));
        }
    }

    let health = &config.health_check;
    if health.interval_ms == 0 {
        errors.push(ValidationError::Zero("health_check.interval_ms"));
    }
    if health.probe_timeout_ms == 0 {
        errors.push(ValidationError::Zero("health_check.probe_timeout_ms"));
    }
    if health.probe_interval_ms == 0 {
        errors.push(ValidationError::Zero("health_check.probe_interval_ms"));
    }
    if health.failure_threshold == 0 {
        errors.push(ValidationError::Zero("health_check.failure_threshold"));
    }
    if config.observability.stats_interval_secs == 0 {
        errors.push(ValidationError::Zero("observability.stats_interval_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
