//! Round-robin load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::cursor::{Cursor, Pick};
use crate::load_balancer::target::Target;
use crate::load_balancer::{Selector, Strategy};

/// Round-robin selector.
/// Rotates a cursor over the pool in insertion order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Cursor,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn strategy(&self) -> Strategy {
        Strategy::RoundRobin
    }

    fn next_target(&self, pool: &[Arc<Target>]) -> Option<Pick> {
        self.cursor.select(pool)
    }

    fn advance(&self, pool: &[Arc<Target>]) {
        self.cursor.advance(pool.len());
    }

    fn position(&self) -> usize {
        self.cursor.position()
    }

    fn duplicate(&self) -> Box<dyn Selector> {
        Box::new(RoundRobin {
            cursor: Cursor::new(self.position()),
        })
    }
}
