//! Target abstraction.
//!
//! # Responsibilities
//! - Represent a single backend endpoint
//! - Track alive/healthy state and consecutive probe failures
//! - Track caller-managed connection count (for load statistics)
//! - Track selection weight

use parking_lot::Mutex;
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bit in the packed health word that carries the `healthy` flag.
/// The low 32 bits carry the consecutive failure count.
const HEALTHY_BIT: u64 = 1 << 32;
const FAILURES_MASK: u64 = u32::MAX as u64;

/// Point-in-time view of a target's probe outcome.
///
/// Read from a single atomic word, so `healthy` and `consecutive_failures`
/// are always mutually consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub consecutive_failures: u32,
}

impl From<u64> for HealthSnapshot {
    fn from(word: u64) -> Self {
        Self {
            healthy: word & HEALTHY_BIT != 0,
            consecutive_failures: (word & FAILURES_MASK) as u32,
        }
    }
}

/// Serializable report of a target's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStatus {
    pub address: String,
    pub alive: bool,
    pub healthy: bool,
    pub weight: u32,
    pub consecutive_failures: u32,
    pub current_connections: u32,
    pub effective_load: f64,
    pub last_checked_ms_ago: u64,
}

/// A single backend target.
#[derive(Debug)]
pub struct Target {
    /// `host[:port]`, immutable identity of the target.
    address: String,
    /// Eligible for selection at all.
    alive: AtomicBool,
    /// Healthy flag and consecutive failure count, packed.
    health: AtomicU64,
    /// Relative selection share, never 0.
    weight: AtomicU32,
    /// Connections currently handed out by the surrounding proxy.
    connections: AtomicU32,
    /// Timestamp of the last completed probe.
    last_checked: Mutex<Instant>,
}

impl Target {
    /// Create a new target with weight 1.
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_weight(address, 1)
    }

    /// Create a new target with the given weight (0 is stored as 1).
    pub fn with_weight(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            alive: AtomicBool::new(true),
            health: AtomicU64::new(0),
            weight: AtomicU32::new(weight.max(1)),
            connections: AtomicU32::new(0),
            last_checked: Mutex::new(Instant::now()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_healthy(&self) -> bool {
        self.health().healthy
    }

    /// Both `alive` and `healthy`.
    pub fn is_available(&self) -> bool {
        self.is_alive() && self.is_healthy()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.health().consecutive_failures
    }

    /// Consistent view of the healthy flag and failure count.
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot::from(self.health.load(Ordering::Acquire))
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    pub fn current_connections(&self) -> u32 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn last_checked_at(&self) -> Instant {
        *self.last_checked.lock()
    }

    pub fn time_since_last_check(&self) -> Duration {
        self.last_checked_at().elapsed()
    }

    /// Override the alive flag.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Set the healthy flag. Marking healthy also clears the failure count
    /// in the same atomic step.
    pub fn set_healthy(&self, healthy: bool) {
        if healthy {
            self.health.store(HEALTHY_BIT, Ordering::SeqCst);
        } else {
            self.health.fetch_and(!HEALTHY_BIT, Ordering::AcqRel);
        }
    }

    /// Set the weight (0 is stored as 1).
    pub fn set_weight(&self, weight: u32) {
        self.weight.store(weight.max(1), Ordering::Relaxed);
    }

    /// Clear the consecutive failure count, keeping the healthy flag.
    pub fn reset_failures(&self) {
        self.health.fetch_and(!FAILURES_MASK, Ordering::AcqRel);
    }

    /// Record a successful probe: healthy, zero failures, alive.
    pub fn record_success(&self) {
        self.set_healthy(true);
        self.set_alive(true);
    }

    /// Record a failed probe: unhealthy and one more consecutive failure.
    ///
    /// Returns the new failure count. The alive flag is left to the caller,
    /// which owns the threshold.
    pub fn record_failure(&self) -> u32 {
        let previous = self
            .health
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let failures = (word & FAILURES_MASK).saturating_add(1).min(FAILURES_MASK);
                Some(failures)
            })
            .unwrap_or_else(|word| word);
        ((previous & FAILURES_MASK) as u32).saturating_add(1)
    }

    /// Mark the target not alive if its failure count is still at least
    /// `threshold`.
    ///
    /// A success recorded concurrently wins: if one lands between the check
    /// and the store, the alive flag is restored. Returns whether the target
    /// was left not alive.
    pub fn mark_not_alive_if_failing(&self, threshold: u32) -> bool {
        if self.consecutive_failures() < threshold {
            return false;
        }
        self.alive.store(false, Ordering::SeqCst);

        let current = HealthSnapshot::from(self.health.load(Ordering::SeqCst));
        if current.consecutive_failures < threshold {
            self.alive.store(true, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Stamp the last-checked time with now.
    pub fn mark_checked(&self) {
        *self.last_checked.lock() = Instant::now();
    }

    /// Increment active connection count.
    pub fn increment_connections(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connection count, never below zero.
    pub fn decrement_connections(&self) {
        let _ = self
            .connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_sub(1));
    }

    /// Connections per unit of weight.
    pub fn effective_load(&self) -> f64 {
        let weight = self.weight().max(1);
        self.current_connections() as f64 / weight as f64
    }

    /// Independent copy of this target's state. The connection count is
    /// not carried over.
    pub fn snapshot(&self) -> Target {
        Target {
            address: self.address.clone(),
            alive: AtomicBool::new(self.is_alive()),
            health: AtomicU64::new(self.health.load(Ordering::Acquire)),
            weight: AtomicU32::new(self.weight()),
            connections: AtomicU32::new(0),
            last_checked: Mutex::new(self.last_checked_at()),
        }
    }

    pub fn status(&self) -> TargetStatus {
        let health = self.health();
        TargetStatus {
            address: self.address.clone(),
            alive: self.is_alive(),
            healthy: health.healthy,
            weight: self.weight(),
            consecutive_failures: health.consecutive_failures,
            current_connections: self.current_connections(),
            effective_load: self.effective_load(),
            last_checked_ms_ago: self.time_since_last_check().as_millis() as u64,
        }
    }

    /// Count one connection against this target until the guard is dropped.
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.increment_connections();
        ConnectionGuard {
            target: Arc::clone(self),
        }
    }
}

/// A RAII guard that manages the active connection count.
#[derive(Debug)]
pub struct ConnectionGuard {
    target: Arc<Target>,
}

impl ConnectionGuard {
    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }
}

impl Deref for ConnectionGuard {
    type Target = Target;
    fn deref(&self) -> &Self::Target {
        &self.target
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.target.decrement_connections();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_target_creation() {
        let target = Target::new("10.0.0.1:8080");
        assert_eq!(target.address(), "10.0.0.1:8080");
        assert!(target.is_alive());
        assert!(!target.is_healthy());
        assert_eq!(target.weight(), 1);
        assert_eq!(target.consecutive_failures(), 0);
        assert_eq!(target.current_connections(), 0);
    }

    #[test]
    fn test_zero_weight_is_coerced() {
        let target = Target::with_weight("a", 0);
        assert_eq!(target.weight(), 1);
        target.set_weight(0);
        assert_eq!(target.weight(), 1);
        target.set_weight(5);
        assert_eq!(target.weight(), 5);
    }

    #[test]
    fn test_failure_tracking() {
        let target = Target::new("a");
        target.set_healthy(true);

        assert_eq!(target.record_failure(), 1);
        assert!(!target.is_healthy());
        assert_eq!(target.record_failure(), 2);
        assert_eq!(target.consecutive_failures(), 2);

        target.record_success();
        assert_eq!(target.health(), HealthSnapshot { healthy: true, consecutive_failures: 0 });
        assert!(target.is_alive());
    }

    #[test]
    fn test_set_healthy_false_keeps_failures() {
        let target = Target::new("a");
        target.record_failure();
        target.set_healthy(false);
        assert_eq!(target.consecutive_failures(), 1);
        target.reset_failures();
        assert_eq!(target.consecutive_failures(), 0);
    }

    #[test]
    fn test_late_threshold_crossing_does_not_override_success() {
        let target = Target::new("a");
        for _ in 0..3 {
            target.record_failure();
        }
        // A success lands before the failing check gets to mark the target.
        target.record_success();

        assert!(!target.mark_not_alive_if_failing(3));
        assert!(target.is_alive());
        assert!(target.is_healthy());

        for _ in 0..3 {
            target.record_failure();
        }
        assert!(target.mark_not_alive_if_failing(3));
        assert!(!target.is_alive());
    }

    #[test]
    fn test_concurrent_success_and_failure_leave_consistent_state() {
        for _ in 0..200 {
            let target = Arc::new(Target::new("a"));
            target.record_failure();
            target.record_failure();

            let failing = Arc::clone(&target);
            let handle = thread::spawn(move || {
                if failing.record_failure() >= 3 {
                    failing.mark_not_alive_if_failing(3);
                }
            });
            target.record_success();
            handle.join().unwrap();

            let health = target.health();
            if health.healthy {
                assert!(target.is_alive(), "healthy target left not alive");
            }
        }
    }

    #[test]
    fn test_decrement_never_underflows() {
        let target = Target::new("a");
        target.decrement_connections();
        assert_eq!(target.current_connections(), 0);
        target.increment_connections();
        target.decrement_connections();
        target.decrement_connections();
        assert_eq!(target.current_connections(), 0);
    }

    #[test]
    fn test_effective_load() {
        let target = Target::with_weight("a", 2);
        for _ in 0..3 {
            target.increment_connections();
        }
        assert!((target.effective_load() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_connection_guard() {
        let target = Arc::new(Target::new("a"));
        {
            let guard = target.acquire();
            assert_eq!(guard.current_connections(), 1);
            let _second = target.acquire();
            assert_eq!(target.current_connections(), 2);
        }
        assert_eq!(target.current_connections(), 0);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let target = Target::with_weight("a", 3);
        target.record_failure();
        target.increment_connections();

        let copy = target.snapshot();
        assert_eq!(copy.address(), "a");
        assert_eq!(copy.weight(), 3);
        assert_eq!(copy.consecutive_failures(), 1);
        assert_eq!(copy.current_connections(), 0);

        copy.record_success();
        assert_eq!(target.consecutive_failures(), 1);
    }

    #[test]
    fn test_status_report() {
        let target = Target::with_weight("10.0.0.1:80", 2);
        target.set_healthy(true);
        let status = target.status();
        assert_eq!(status.address, "10.0.0.1:80");
        assert!(status.alive && status.healthy);
        assert_eq!(status.weight, 2);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["consecutive_failures"], 0);
    }

    #[test]
    fn test_healthy_never_observed_with_failures() {
        let target = Arc::new(Target::new("a"));
        let writer = Arc::clone(&target);

        let handle = thread::spawn(move || {
            for _ in 0..10_000 {
                writer.record_failure();
                writer.record_success();
            }
        });

        for _ in 0..10_000 {
            let snapshot = target.health();
            assert!(!(snapshot.healthy && snapshot.consecutive_failures > 0));
        }

        handle.join().unwrap();
    }
}
