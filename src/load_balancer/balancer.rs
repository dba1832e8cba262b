//! Balancer: target pool, health checks and selection.
//!
//! # Responsibilities
//! - Own the target pool (unique addresses, insertion order)
//! - Drive the health prober over pool snapshots, optionally in the background
//! - Delegate selection to the configured strategy
//! - Report aggregate statistics

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BalancerConfig;
use crate::health::prober::{HealthProber, ProberOptions};
use crate::lifecycle::PeriodicTask;
use crate::load_balancer::cursor::Pick;
use crate::load_balancer::target::Target;
use crate::load_balancer::{selector_for, BalancerError, Selector, Strategy};
use crate::observability::metrics;

pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(5000);

/// Construction-time balancer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancerOptions {
    pub health_check_interval: Duration,
    pub prober: ProberOptions,
}

impl Default for BalancerOptions {
    fn default() -> Self {
        Self {
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            prober: ProberOptions::default(),
        }
    }
}

/// Aggregate pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalancerStats {
    pub total: usize,
    pub alive: usize,
    /// Alive and healthy.
    pub healthy: usize,
    /// Mean effective load over healthy targets; 0 if there are none.
    pub average_load: f64,
}

/// State shared with the background health-check thread.
struct Shared {
    pool: RwLock<Vec<Arc<Target>>>,
    prober: HealthProber,
    interval: Mutex<Duration>,
    selector: ArcSwap<Box<dyn Selector>>,
}

impl Shared {
    fn snapshot(&self) -> Vec<Arc<Target>> {
        self.pool.read().clone()
    }

    fn perform_health_check(&self) -> bool {
        let targets = self.snapshot();
        let all_reachable = self.prober.probe_all(&targets);

        let healthy = targets.iter().filter(|t| t.is_available()).count();
        metrics::record_pool(targets.len(), healthy);
        tracing::debug!(
            targets = targets.len(),
            healthy,
            all_reachable,
            "Health check completed"
        );
        all_reachable
    }
}

/// Load balancer over a pool of targets.
///
/// Not `Clone`: use [`Balancer::duplicate`] to copy the pool and settings
/// without the background task.
pub struct Balancer {
    shared: Arc<Shared>,
    health_task: Mutex<Option<PeriodicTask>>,
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("strategy", &self.strategy())
            .field("targets", &self.server_count())
            .field("health_checks_running", &self.is_health_check_running())
            .finish()
    }
}

impl Balancer {
    /// Create a balancer with default options.
    pub fn new(targets: Vec<Arc<Target>>, strategy: Strategy) -> Result<Self, BalancerError> {
        Self::with_options(targets, strategy, BalancerOptions::default())
    }

    pub fn with_options(
        targets: Vec<Arc<Target>>,
        strategy: Strategy,
        options: BalancerOptions,
    ) -> Result<Self, BalancerError> {
        Self::with_prober(
            targets,
            strategy,
            options.health_check_interval,
            HealthProber::new(options.prober),
        )
    }

    /// Create a balancer around an existing (stopped) prober.
    pub fn with_prober(
        targets: Vec<Arc<Target>>,
        strategy: Strategy,
        health_check_interval: Duration,
        prober: HealthProber,
    ) -> Result<Self, BalancerError> {
        if targets.is_empty() {
            return Err(BalancerError::EmptyPool);
        }
        let selector = selector_for(strategy)?;

        let mut pool: Vec<Arc<Target>> = Vec::with_capacity(targets.len());
        for target in targets {
            if pool.iter().any(|t| t.address() == target.address()) {
                tracing::warn!(address = %target.address(), "Ignoring duplicate target");
                continue;
            }
            pool.push(target);
        }

        tracing::info!(strategy = %strategy, targets = pool.len(), "Balancer created");

        Ok(Self {
            shared: Arc::new(Shared {
                pool: RwLock::new(pool),
                prober,
                interval: Mutex::new(health_check_interval),
                selector: ArcSwap::from_pointee(selector),
            }),
            health_task: Mutex::new(None),
        })
    }

    /// Build a balancer from configuration.
    pub fn from_config(config: &BalancerConfig) -> Result<Self, BalancerError> {
        let targets = config
            .targets
            .iter()
            .map(|t| Arc::new(Target::with_weight(t.address.clone(), t.weight)))
            .collect();
        Self::with_options(targets, config.strategy, config.health_check.balancer_options())
    }

    /// Copy pool data and settings into a new balancer with stopped health checks.
    ///
    /// Targets are copied as independent snapshots; the cursor position is
    /// carried over.
    pub fn duplicate(&self) -> Self {
        let pool = self
            .shared
            .snapshot()
            .iter()
            .map(|t| Arc::new(t.snapshot()))
            .collect();

        Self {
            shared: Arc::new(Shared {
                pool: RwLock::new(pool),
                prober: HealthProber::new(self.shared.prober.options()),
                interval: Mutex::new(self.health_check_interval()),
                selector: ArcSwap::from_pointee(self.shared.selector.load().duplicate()),
            }),
            health_task: Mutex::new(None),
        }
    }

    /// Next target to hand a request to, or `None` if no target is alive.
    pub fn select_next(&self) -> Option<Arc<Target>> {
        let pick = {
            let pool = self.shared.pool.read();
            self.shared.selector.load().next_target(&pool)
        };

        match pick {
            Some(Pick::Healthy(target)) => {
                metrics::record_selection(metrics::SELECTED_HEALTHY);
                Some(target)
            }
            Some(Pick::Fallback(target)) => {
                metrics::record_selection(metrics::SELECTED_FALLBACK);
                tracing::debug!(
                    address = %target.address(),
                    "No healthy target, using alive fallback"
                );
                Some(target)
            }
            None => {
                metrics::record_selection(metrics::SELECTED_NONE);
                tracing::debug!("No alive target available");
                None
            }
        }
    }

    /// Skip the next cursor position.
    pub fn advance_cursor(&self) {
        let pool = self.shared.pool.read();
        self.shared.selector.load().advance(&pool);
    }

    pub fn cursor_position(&self) -> usize {
        self.shared.selector.load().position()
    }

    /// Add a target. Returns false if its address is already in the pool.
    pub fn add_server(&self, target: Arc<Target>) -> bool {
        let mut pool = self.shared.pool.write();
        if pool.iter().any(|t| t.address() == target.address()) {
            return false;
        }
        tracing::info!(address = %target.address(), "Target added");
        pool.push(target);
        true
    }

    /// Remove every target with `address`. Returns whether any was removed.
    pub fn remove_server(&self, address: &str) -> bool {
        let mut pool = self.shared.pool.write();
        let before = pool.len();
        pool.retain(|t| t.address() != address);
        let removed = pool.len() < before;
        if removed {
            metrics::record_target_removed(address);
            tracing::info!(address = %address, "Target removed");
        }
        removed
    }

    /// Point-in-time copy of the pool.
    pub fn servers(&self) -> Vec<Arc<Target>> {
        self.shared.snapshot()
    }

    /// Probe every target once, synchronously. True if all were reachable.
    pub fn perform_health_check(&self) -> bool {
        self.shared.perform_health_check()
    }

    /// Start the background health-check loop. No-op if already running.
    pub fn start_health_checks(&self) -> Result<(), BalancerError> {
        let mut task = self.health_task.lock();
        if task.as_ref().is_some_and(PeriodicTask::is_running) {
            return Ok(());
        }

        let tick_shared = Arc::clone(&self.shared);
        let interval_shared = Arc::clone(&self.shared);
        *task = Some(PeriodicTask::spawn(
            "health-checks",
            move || *interval_shared.interval.lock(),
            move || {
                tick_shared.perform_health_check();
            },
        )?);

        tracing::info!(
            interval_ms = self.health_check_interval().as_millis() as u64,
            "Health checks started"
        );
        Ok(())
    }

    /// Stop the background loop and wait for it to exit.
    pub fn stop_health_checks(&self) {
        if let Some(mut task) = self.health_task.lock().take() {
            task.stop();
            tracing::info!("Health checks stopped");
        }
    }

    pub fn is_health_check_running(&self) -> bool {
        self.health_task
            .lock()
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    pub fn health_check_interval(&self) -> Duration {
        *self.shared.interval.lock()
    }

    /// Takes effect from the next cycle of a running loop.
    pub fn set_health_check_interval(&self, interval: Duration) {
        *self.shared.interval.lock() = interval;
    }

    pub fn max_health_check_failures(&self) -> u32 {
        self.shared.prober.failure_threshold()
    }

    /// Consecutive failures before a target is marked not alive.
    pub fn set_max_health_check_failures(&self, failures: u32) {
        self.shared.prober.set_failure_threshold(failures);
    }

    pub fn strategy(&self) -> Strategy {
        self.shared.selector.load().strategy()
    }

    /// Switch selection algorithm. The new selector starts at position 0.
    pub fn set_strategy(&self, strategy: Strategy) -> Result<(), BalancerError> {
        if strategy == self.strategy() {
            return Ok(());
        }
        self.shared.selector.store(Arc::new(selector_for(strategy)?));
        tracing::info!(strategy = %strategy, "Strategy changed");
        Ok(())
    }

    pub fn prober(&self) -> &HealthProber {
        &self.shared.prober
    }

    pub fn server_count(&self) -> usize {
        self.shared.pool.read().len()
    }

    /// Targets that are alive and healthy.
    pub fn healthy_server_count(&self) -> usize {
        self.shared.pool.read().iter().filter(|t| t.is_available()).count()
    }

    /// Mean effective load over alive and healthy targets; 0 if none.
    pub fn average_load(&self) -> f64 {
        self.stats().average_load
    }

    pub fn stats(&self) -> BalancerStats {
        let pool = self.shared.pool.read();
        let mut alive = 0;
        let mut healthy = 0;
        let mut load = 0.0;

        for target in pool.iter() {
            if !target.is_alive() {
                continue;
            }
            alive += 1;
            if target.is_healthy() {
                healthy += 1;
                load += target.effective_load();
            }
        }

        BalancerStats {
            total: pool.len(),
            alive,
            healthy,
            average_load: if healthy > 0 { load / healthy as f64 } else { 0.0 },
        }
    }
}
