//! Reachability probes.
//!
//! # Responsibilities
//! - Define the pluggable reachability check
//! - Parse `host[:port]` target addresses
//! - Provide the default TCP-connect probe
//!
//! # Design Decisions
//! - Malformed address, resolution failure, refusal and timeout all map to `false`
//! - No retries inside a single probe; the next cycle is the retry

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::health::resolver::ResolverCache;

/// Port assumed when an address carries none.
pub const DEFAULT_PORT: u16 = 80;

/// Reachability check: is `address` reachable within `timeout`?
///
/// Invoked concurrently from several worker threads.
pub trait Probe: Send + Sync {
    fn probe(&self, address: &str, timeout: Duration) -> bool;
}

impl<F> Probe for F
where
    F: Fn(&str, Duration) -> bool + Send + Sync,
{
    fn probe(&self, address: &str, timeout: Duration) -> bool {
        self(address, timeout)
    }
}

/// Split `host[:port]` on the last `:`.
///
/// A missing port defaults to 80; a non-numeric port yields `None`.
/// Bracketed IPv6 hosts (`[::1]:8080`) are unwrapped.
pub fn parse_address(address: &str) -> Option<(&str, u16)> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return match tail {
            "" => Some((host, DEFAULT_PORT)),
            _ => Some((host, tail.strip_prefix(':')?.parse().ok()?)),
        };
    }

    match address.rsplit_once(':') {
        None => Some((address, DEFAULT_PORT)),
        Some((host, port)) => Some((host, port.parse().ok()?)),
    }
}

/// Default probe: TCP handshake to `host:port`, bounded by `timeout`.
#[derive(Debug)]
pub struct TcpConnectProbe {
    resolver: Arc<ResolverCache>,
}

impl TcpConnectProbe {
    pub fn new(resolver: Arc<ResolverCache>) -> Self {
        Self { resolver }
    }
}

impl Probe for TcpConnectProbe {
    fn probe(&self, address: &str, timeout: Duration) -> bool {
        let Some((host, port)) = parse_address(address) else {
            tracing::debug!(address = %address, "Invalid target address");
            return false;
        };
        let Some(ip) = self.resolver.resolve(host) else {
            return false;
        };
        if timeout.is_zero() {
            return false;
        }

        match TcpStream::connect_timeout(&SocketAddr::new(ip, port), timeout) {
            Ok(_stream) => true,
            Err(e) => {
                tracing::trace!(address = %address, error = %e, "TCP probe failed");
                false
            }
        }
    }
}
