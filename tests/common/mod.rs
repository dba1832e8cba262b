//! Shared utilities for integration tests.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pool_balancer::Target;

/// A local TCP backend that can be switched between accepting and refusing.
#[allow(dead_code)]
pub struct MockBackend {
    addr: SocketAddr,
    listener: Option<TcpListener>,
}

#[allow(dead_code)]
impl MockBackend {
    /// Bind a listener on an ephemeral port.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        Self {
            addr,
            listener: Some(listener),
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Stop accepting connections; probes are refused from now on.
    pub fn shut_down(&mut self) {
        self.listener = None;
    }

    /// Re-bind the same port.
    pub fn restart(&mut self) {
        self.listener = Some(TcpListener::bind(self.addr).unwrap());
    }
}

/// A fake probe that counts calls and answers from a shared switch.
#[derive(Clone, Default)]
pub struct CountingProbe {
    pub calls: Arc<AtomicU32>,
    pub down: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl CountingProbe {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn function(&self) -> impl Fn(&str, Duration) -> bool + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        let down = Arc::clone(&self.down);
        move |_address: &str, _timeout: Duration| {
            calls.fetch_add(1, Ordering::SeqCst);
            !down.load(Ordering::SeqCst)
        }
    }
}

#[allow(dead_code)]
pub fn targets(addresses: &[&str]) -> Vec<Arc<Target>> {
    addresses.iter().map(|a| Arc::new(Target::new(*a))).collect()
}

#[allow(dead_code)]
pub fn weighted(address: &str, weight: u32) -> Arc<Target> {
    Arc::new(Target::with_weight(address, weight))
}
