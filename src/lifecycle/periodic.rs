//! Periodic background thread with cooperative stop.

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Stop flag shared between the owner and the loop thread.
#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn trigger(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    fn is_triggered(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for `interval` or until triggered. Returns true if triggered.
    ///
    /// An interval past the representable deadline sleeps until triggered.
    fn wait(&self, interval: Duration) -> bool {
        let deadline = Instant::now().checked_add(interval);
        let mut stopped = self.stopped.lock();
        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut stopped),
            }
        }
        *stopped
    }
}

/// A named thread that runs `tick`, then sleeps for `interval()`, until stopped.
///
/// The interval is re-read every cycle. Stopping interrupts the sleep but
/// never a tick in progress; [`PeriodicTask::stop`] returns once the thread
/// has exited.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<T, I>(name: &str, interval: I, mut tick: T) -> io::Result<Self>
    where
        T: FnMut() + Send + 'static,
        I: Fn() -> Duration + Send + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let loop_signal = Arc::clone(&signal);

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            while !loop_signal.is_triggered() {
                tick();
                if loop_signal.wait(interval()) {
                    break;
                }
            }
        })?;

        tracing::debug!(task = %name, "Periodic task started");

        Ok(Self {
            name: name.to_string(),
            signal,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True until the thread has been stopped or has exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop and block until its thread has exited.
    pub fn stop(&mut self) {
        self.signal.trigger();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(task = %self.name, "Periodic task panicked");
            } else {
                tracing::debug!(task = %self.name, "Periodic task stopped");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
