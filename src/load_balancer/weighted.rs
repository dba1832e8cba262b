//! Weighted round-robin load balancing strategy.
//!
//! Each alive target appears `weight` consecutive times in an expansion
//! list, and the round-robin cursor runs over that list. The expansion is
//! a cache of the pool: it is rebuilt when empty, and whenever the set of
//! alive targets or any of their weights no longer matches what it was
//! built from.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::load_balancer::cursor::{Cursor, Pick};
use crate::load_balancer::target::Target;
use crate::load_balancer::{Selector, Strategy};

#[derive(Debug, Default)]
struct Expansion {
    /// Alive targets and the weights the list was built with.
    members: Vec<(Arc<Target>, u32)>,
    entries: Vec<Arc<Target>>,
}

impl Expansion {
    fn is_stale(&self, pool: &[Arc<Target>]) -> bool {
        if self.entries.is_empty() {
            return true;
        }

        let mut members = self.members.iter();
        for target in pool.iter().filter(|t| t.is_alive()) {
            match members.next() {
                Some((member, weight))
                    if Arc::ptr_eq(member, target) && *weight == target.weight() => {}
                _ => return true,
            }
        }
        members.next().is_some()
    }

    fn rebuild(&mut self, pool: &[Arc<Target>]) {
        self.members.clear();
        self.entries.clear();

        for target in pool.iter().filter(|t| t.is_alive()) {
            let weight = target.weight().max(1);
            self.members.push((Arc::clone(target), weight));
            self.entries
                .extend(std::iter::repeat_with(|| Arc::clone(target)).take(weight as usize));
        }
    }
}

/// Weighted round-robin selector.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    cursor: Cursor,
    expansion: Mutex<Expansion>,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the current expansion list.
    pub fn expansion_len(&self) -> usize {
        self.expansion.lock().entries.len()
    }
}

impl Selector for WeightedRoundRobin {
    fn strategy(&self) -> Strategy {
        Strategy::WeightedRoundRobin
    }

    fn next_target(&self, pool: &[Arc<Target>]) -> Option<Pick> {
        let mut expansion = self.expansion.lock();
        if expansion.is_stale(pool) {
            expansion.rebuild(pool);
            tracing::debug!(
                members = expansion.members.len(),
                entries = expansion.entries.len(),
                "Weighted expansion rebuilt"
            );
        }
        self.cursor.select(&expansion.entries)
    }

    fn advance(&self, _pool: &[Arc<Target>]) {
        let len = self.expansion.lock().entries.len();
        self.cursor.advance(len);
    }

    fn position(&self) -> usize {
        self.cursor.position()
    }

    fn duplicate(&self) -> Box<dyn Selector> {
        Box::new(WeightedRoundRobin {
            cursor: Cursor::new(self.position()),
            expansion: Mutex::default(),
        })
    }
}
