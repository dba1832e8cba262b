//! Hostname resolution with a TTL cache.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default time-to-live for cached resolutions.
pub const DEFAULT_DNS_TTL: Duration = Duration::from_secs(300);

/// Name resolution capability, invoked only on cache miss or expiry.
pub trait Resolve: Send + Sync {
    fn resolve(&self, hostname: &str) -> Option<IpAddr>;
}

impl<F> Resolve for F
where
    F: Fn(&str) -> Option<IpAddr> + Send + Sync,
{
    fn resolve(&self, hostname: &str) -> Option<IpAddr> {
        self(hostname)
    }
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, hostname: &str) -> Option<IpAddr> {
        let all: Vec<_> = (hostname, 0).to_socket_addrs().ok()?.collect();
        // IPv4 first
        all.iter()
            .find(|a| a.is_ipv4())
            .or_else(|| all.first())
            .map(|a| a.ip())
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    address: IpAddr,
    /// `None` when the TTL is too large to represent; never expires.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Memoizes hostname → address lookups.
///
/// Expiry is checked lazily on lookup. The lock is never held across a
/// resolution call.
pub struct ResolverCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Mutex<Duration>,
    resolver: Arc<dyn Resolve>,
}

impl std::fmt::Debug for ResolverCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl())
            .finish()
    }
}

impl Default for ResolverCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver))
    }
}

impl ResolverCache {
    pub fn new(resolver: Arc<dyn Resolve>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Mutex::new(DEFAULT_DNS_TTL),
            resolver,
        }
    }

    /// Resolve `hostname`, consulting the cache first.
    ///
    /// Literal IP addresses are returned as-is without touching the cache.
    pub fn resolve(&self, hostname: &str) -> Option<IpAddr> {
        if let Ok(literal) = hostname.parse::<IpAddr>() {
            return Some(literal);
        }

        let now = Instant::now();
        if let Some(entry) = self.entries.lock().get(hostname) {
            if entry.is_fresh(now) {
                return Some(entry.address);
            }
        }

        tracing::debug!(hostname = %hostname, "Resolver cache miss");
        let Some(address) = self.resolver.resolve(hostname) else {
            tracing::warn!(hostname = %hostname, "Hostname resolution failed");
            return None;
        };

        let expires_at = Instant::now().checked_add(self.ttl());
        self.entries
            .lock()
            .insert(hostname.to_string(), CacheEntry { address, expires_at });
        Some(address)
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.lock()
    }

    /// Applies to entries stored from now on.
    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock() = ttl;
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
