//! Rotating cursor with healthy-first selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::target::Target;

/// Outcome of a selection scan.
#[derive(Debug, Clone)]
pub enum Pick {
    /// An alive and healthy target.
    Healthy(Arc<Target>),
    /// No healthy target existed; the first alive one scanned.
    Fallback(Arc<Target>),
}

impl Pick {
    pub fn target(&self) -> &Arc<Target> {
        match self {
            Pick::Healthy(t) | Pick::Fallback(t) => t,
        }
    }

    pub fn into_target(self) -> Arc<Target> {
        match self {
            Pick::Healthy(t) | Pick::Fallback(t) => t,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Pick::Fallback(_))
    }
}

/// Position in a candidate list.
#[derive(Debug, Default)]
pub struct Cursor {
    position: AtomicUsize,
}

impl Cursor {
    pub fn new(position: usize) -> Self {
        Self {
            position: AtomicUsize::new(position),
        }
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    /// Scan `candidates` once around from the cursor.
    ///
    /// Returns the first alive and healthy target, else the first alive one,
    /// else `None`. The cursor moves to just past the returned index; the
    /// move is a compare-and-swap against the position the scan started
    /// from, so concurrent callers never lose an advance.
    pub fn select(&self, candidates: &[Arc<Target>]) -> Option<Pick> {
        let len = candidates.len();
        if len == 0 {
            return None;
        }

        loop {
            let start = self.position.load(Ordering::Acquire);
            let (index, healthy) = scan(candidates, start % len)?;

            if self
                .position
                .compare_exchange(start, (index + 1) % len, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let target = Arc::clone(&candidates[index]);
                return Some(if healthy {
                    Pick::Healthy(target)
                } else {
                    Pick::Fallback(target)
                });
            }
        }
    }

    /// Skip one position.
    pub fn advance(&self, len: usize) {
        if len == 0 {
            return;
        }
        let _ = self
            .position
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| Some((p % len + 1) % len));
    }
}

fn scan(candidates: &[Arc<Target>], start: usize) -> Option<(usize, bool)> {
    let len = candidates.len();
    let mut fallback = None;

    for offset in 0..len {
        let index = (start + offset) % len;
        let target = &candidates[index];
        if !target.is_alive() {
            continue;
        }
        if target.is_healthy() {
            return Some((index, true));
        }
        if fallback.is_none() {
            fallback = Some(index);
        }
    }

    fallback.map(|index| (index, false))
}
