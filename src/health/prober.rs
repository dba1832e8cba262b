//! Active health probing.
//!
//! # Responsibilities
//! - Probe targets (one at a time or fanned out over a bounded worker pool)
//! - Update target health, failure count and alive state from probe results
//! - Optionally repeat the cycle on a background thread

use parking_lot::{Mutex, RwLock};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::health::probe::{Probe, TcpConnectProbe};
use crate::health::resolver::{Resolve, ResolverCache, SystemResolver, DEFAULT_DNS_TTL};
use crate::lifecycle::PeriodicTask;
use crate::load_balancer::target::Target;
use crate::observability::metrics;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_WORKERS: usize = 4;
/// Consecutive failures after which a target is marked not alive.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Construction-time prober settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProberOptions {
    pub timeout: Duration,
    pub interval: Duration,
    pub workers: usize,
    pub dns_cache_ttl: Duration,
    pub failure_threshold: u32,
}

impl Default for ProberOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            interval: DEFAULT_PROBE_INTERVAL,
            workers: DEFAULT_WORKERS,
            dns_cache_ttl: DEFAULT_DNS_TTL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

struct ProberState {
    timeout: Mutex<Duration>,
    interval: Mutex<Duration>,
    workers: AtomicUsize,
    failure_threshold: AtomicU32,
    resolver: Arc<ResolverCache>,
    probe: RwLock<Arc<dyn Probe>>,
}

impl ProberState {
    fn current_probe(&self) -> Arc<dyn Probe> {
        Arc::clone(&self.probe.read())
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    fn probe_one(&self, target: &Target) -> bool {
        let probe = self.current_probe();
        let reachable = probe.probe(target.address(), self.timeout());
        self.record(target, reachable, self.failure_threshold.load(Ordering::Relaxed));
        reachable
    }

    fn probe_all(&self, targets: &[Arc<Target>]) -> bool {
        if targets.is_empty() {
            return true;
        }

        let probe = self.current_probe();
        let timeout = self.timeout();
        let threshold = self.failure_threshold.load(Ordering::Relaxed);
        let pool_size = self.workers.load(Ordering::Relaxed).clamp(1, targets.len());

        let next = AtomicUsize::new(0);
        let all_reachable = AtomicBool::new(true);

        let worker = || loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(target) = targets.get(index) else {
                break;
            };
            let reachable = probe.probe(target.address(), timeout);
            self.record(target, reachable, threshold);
            if !reachable {
                all_reachable.store(false, Ordering::Relaxed);
            }
        };
        let worker = &worker;

        // The calling thread is the last worker of the pool.
        thread::scope(|scope| {
            for id in 1..pool_size {
                let spawned = thread::Builder::new()
                    .name(format!("probe-worker-{id}"))
                    .spawn_scoped(scope, move || worker());
                if let Err(e) = spawned {
                    tracing::warn!(error = %e, "Failed to spawn probe worker");
                    break;
                }
            }
            worker();
        });

        all_reachable.load(Ordering::Relaxed)
    }

    fn record(&self, target: &Target, reachable: bool, threshold: u32) {
        target.mark_checked();

        if reachable {
            let recovered = !target.is_alive();
            target.record_success();
            if recovered {
                tracing::info!(address = %target.address(), "Target is alive again");
            } else {
                tracing::debug!(address = %target.address(), "Probe succeeded");
            }
        } else {
            let failures = target.record_failure();
            tracing::debug!(address = %target.address(), failures, "Probe failed");
            if failures >= threshold {
                let was_alive = target.is_alive();
                if target.mark_not_alive_if_failing(threshold) && was_alive {
                    tracing::warn!(
                        address = %target.address(),
                        failures,
                        threshold,
                        "Target marked not alive"
                    );
                }
            }
        }

        metrics::record_probe(reachable);
        metrics::record_target_state(target);
    }
}

/// Determines target reachability and keeps target health state current.
pub struct HealthProber {
    state: Arc<ProberState>,
    background: Mutex<Option<PeriodicTask>>,
}

impl std::fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProber")
            .field("options", &self.options())
            .field("background_running", &self.is_background_running())
            .finish()
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::new(ProberOptions::default())
    }
}

impl HealthProber {
    pub fn new(options: ProberOptions) -> Self {
        Self::with_resolver(options, Arc::new(SystemResolver))
    }

    /// Build a prober whose resolver cache is backed by `resolver`.
    pub fn with_resolver(options: ProberOptions, resolver: Arc<dyn Resolve>) -> Self {
        let cache = Arc::new(ResolverCache::new(resolver));
        cache.set_ttl(options.dns_cache_ttl);

        let probe: Arc<dyn Probe> = Arc::new(TcpConnectProbe::new(Arc::clone(&cache)));
        let state = ProberState {
            timeout: Mutex::new(options.timeout),
            interval: Mutex::new(options.interval),
            workers: AtomicUsize::new(options.workers.max(1)),
            failure_threshold: AtomicU32::new(options.failure_threshold.max(1)),
            resolver: cache,
            probe: RwLock::new(probe),
        };

        Self {
            state: Arc::new(state),
            background: Mutex::new(None),
        }
    }

    /// Probe a single target and update its state. Returns reachability.
    pub fn probe_one(&self, target: &Target) -> bool {
        self.state.probe_one(target)
    }

    /// Probe every target exactly once over the worker pool.
    ///
    /// Returns true only if every target was reachable (true for an empty set).
    pub fn probe_all(&self, targets: &[Arc<Target>]) -> bool {
        self.state.probe_all(targets)
    }

    /// Probe a snapshot of `targets` every `interval` on a background thread.
    ///
    /// A loop that is already running is stopped first.
    pub fn start_background(&self, targets: &[Arc<Target>], interval: Duration) -> io::Result<()> {
        self.set_interval(interval);

        let mut background = self.background.lock();
        if let Some(mut previous) = background.take() {
            previous.stop();
        }

        let snapshot = targets.to_vec();
        let tick_state = Arc::clone(&self.state);
        let interval_state = Arc::clone(&self.state);
        let task = PeriodicTask::spawn(
            "health-prober",
            move || interval_state.interval(),
            move || {
                tick_state.probe_all(&snapshot);
            },
        )?;

        tracing::info!(
            targets = targets.len(),
            interval_ms = interval.as_millis() as u64,
            "Background probing started"
        );
        *background = Some(task);
        Ok(())
    }

    /// Stop the background loop; returns once no probe is in flight.
    pub fn stop(&self) {
        if let Some(mut task) = self.background.lock().take() {
            task.stop();
            tracing::info!("Background probing stopped");
        }
    }

    pub fn is_background_running(&self) -> bool {
        self.background
            .lock()
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    /// Replace the reachability check.
    pub fn set_probe(&self, probe: Arc<dyn Probe>) {
        *self.state.probe.write() = probe;
    }

    pub fn set_probe_function<F>(&self, probe: F)
    where
        F: Fn(&str, Duration) -> bool + Send + Sync + 'static,
    {
        self.set_probe(Arc::new(probe));
    }

    /// Restore the default TCP-connect probe.
    pub fn reset_probe_function(&self) {
        let probe = TcpConnectProbe::new(Arc::clone(&self.state.resolver));
        self.set_probe(Arc::new(probe));
    }

    pub fn timeout(&self) -> Duration {
        self.state.timeout()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.state.timeout.lock() = timeout;
    }

    pub fn interval(&self) -> Duration {
        self.state.interval()
    }

    pub fn set_interval(&self, interval: Duration) {
        *self.state.interval.lock() = interval;
    }

    pub fn worker_pool_size(&self) -> usize {
        self.state.workers.load(Ordering::Relaxed)
    }

    /// 0 is coerced to 1.
    pub fn set_worker_pool_size(&self, size: usize) {
        self.state.workers.store(size.max(1), Ordering::Relaxed);
    }

    pub fn failure_threshold(&self) -> u32 {
        self.state.failure_threshold.load(Ordering::Relaxed)
    }

    /// 0 is coerced to 1.
    pub fn set_failure_threshold(&self, threshold: u32) {
        self.state
            .failure_threshold
            .store(threshold.max(1), Ordering::Relaxed);
    }

    pub fn dns_cache_ttl(&self) -> Duration {
        self.state.resolver.ttl()
    }

    pub fn set_dns_cache_ttl(&self, ttl: Duration) {
        self.state.resolver.set_ttl(ttl);
    }

    pub fn clear_dns_cache(&self) {
        self.state.resolver.clear();
    }

    pub fn resolver(&self) -> &ResolverCache {
        &self.state.resolver
    }

    /// Current settings.
    pub fn options(&self) -> ProberOptions {
        ProberOptions {
            timeout: self.timeout(),
            interval: self.interval(),
            workers: self.worker_pool_size(),
            dns_cache_ttl: self.dns_cache_ttl(),
            failure_threshold: self.failure_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::TcpListener;
    use std::time::Instant;

    fn targets(addresses: &[&str]) -> Vec<Arc<Target>> {
        addresses.iter().map(|a| Arc::new(Target::new(*a))).collect()
    }

    #[test]
    fn test_probe_one_success() {
        let prober = HealthProber::default();
        prober.set_probe_function(|_, _| true);

        let target = Target::new("a:1");
        target.record_failure();
        target.set_alive(false);
        let before = target.last_checked_at();

        assert!(prober.probe_one(&target));
        assert!(target.is_alive());
        assert!(target.is_healthy());
        assert_eq!(target.consecutive_failures(), 0);
        assert!(target.last_checked_at() >= before);
    }

    #[test]
    fn test_third_failure_marks_not_alive() {
        let prober = HealthProber::default();
        prober.set_probe_function(|_, _| false);
        let target = Target::new("a:1");

        assert!(!prober.probe_one(&target));
        assert!(!prober.probe_one(&target));
        assert!(target.is_alive());
        assert_eq!(target.consecutive_failures(), 2);

        assert!(!prober.probe_one(&target));
        assert!(!target.is_alive());
        assert!(!target.is_healthy());
    }

    #[test]
    fn test_configured_threshold() {
        let prober = HealthProber::default();
        prober.set_probe_function(|_, _| false);
        prober.set_failure_threshold(1);
        let target = Target::new("a:1");

        prober.probe_one(&target);
        assert!(!target.is_alive());
    }

    #[test]
    fn test_probe_all_each_target_once() {
        let counts: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
        let seen = Arc::clone(&counts);

        let prober = HealthProber::default();
        prober.set_worker_pool_size(3);
        prober.set_probe_function(move |address, _| {
            *seen.lock().entry(address.to_string()).or_default() += 1;
            true
        });

        let addresses: Vec<String> = (0..17).map(|i| format!("10.0.0.{i}:80")).collect();
        let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
        assert!(prober.probe_all(&targets(&refs)));

        let counts = counts.lock();
        assert_eq!(counts.len(), 17);
        assert!(counts.values().all(|&c| c == 1));
    }

    #[test]
    fn test_probe_all_reports_any_failure() {
        let prober = HealthProber::default();
        prober.set_probe_function(|address, _| address != "bad:1");

        let pool = targets(&["good:1", "bad:1", "good:2"]);
        assert!(!prober.probe_all(&pool));
        assert!(pool[0].is_healthy());
        assert!(!pool[1].is_healthy());
        assert!(pool[2].is_healthy());
    }

    #[test]
    fn test_probe_all_empty() {
        let prober = HealthProber::default();
        assert!(prober.probe_all(&[]));
    }

    #[test]
    fn test_probe_all_runs_in_parallel() {
        let prober = HealthProber::default();
        prober.set_worker_pool_size(4);
        prober.set_probe_function(|_, _| {
            thread::sleep(Duration::from_millis(100));
            true
        });

        let pool = targets(&["a:1", "b:1", "c:1", "d:1"]);
        let started = Instant::now();
        prober.probe_all(&pool);
        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[test]
    fn test_worker_pool_size_coerced() {
        let prober = HealthProber::default();
        prober.set_worker_pool_size(0);
        assert_eq!(prober.worker_pool_size(), 1);
    }

    #[test]
    fn test_reset_probe_function() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let target = Target::new(listener.local_addr().unwrap().to_string());

        let prober = HealthProber::default();
        prober.set_probe_function(|_, _| false);
        assert!(!prober.probe_one(&target));

        prober.reset_probe_function();
        assert!(prober.probe_one(&target));
    }

    #[test]
    fn test_default_options() {
        let prober = HealthProber::default();
        let options = prober.options();
        assert_eq!(options.timeout, Duration::from_millis(1000));
        assert_eq!(options.interval, Duration::from_millis(5000));
        assert_eq!(options.workers, 4);
        assert_eq!(options.dns_cache_ttl, Duration::from_secs(300));
        assert_eq!(options.failure_threshold, 3);
    }

    #[test]
    fn test_background_restart_and_stop() {
        let prober = HealthProber::default();
        prober.set_probe_function(|_, _| true);
        let pool = targets(&["a:1"]);

        prober.start_background(&pool, Duration::from_millis(5)).unwrap();
        assert!(prober.is_background_running());
        prober.start_background(&pool, Duration::from_millis(5)).unwrap();
        assert!(prober.is_background_running());

        prober.stop();
        assert!(!prober.is_background_running());
        assert!(pool[0].is_healthy());
    }

    #[test]
    fn test_restart_leaves_single_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let prober = HealthProber::default();
        prober.set_probe_function(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        let pool = targets(&["a:1"]);

        prober.start_background(&pool, Duration::from_millis(2)).unwrap();
        thread::sleep(Duration::from_millis(30));

        // The replacement ticks once, then sleeps for an hour; a surviving
        // fast loop would keep counting.
        prober.start_background(&pool, Duration::from_secs(3600)).unwrap();
        thread::sleep(Duration::from_millis(20));
        let after_restart = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(calls.load(Ordering::SeqCst), after_restart);
        assert!(prober.is_background_running());

        prober.stop();
        assert!(!prober.is_background_running());
    }
}
