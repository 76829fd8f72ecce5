//! Event Loop Configuration

use serde::{Deserialize, Serialize};

/// Default number of microtasks a single drain may run.
pub const DEFAULT_MICROTASK_BUDGET: usize = 1_000_000;

/// Event loop configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Maximum microtasks run by one drain of the microtask queue.
    /// `None` drains until the queue is empty, however long that takes.
    pub microtask_budget: Option<usize>,

    /// Maximum macrotasks (including fired timers) run by one call to
    /// `run_until_idle` or `advance_time`.
    pub macrotask_budget: Option<usize>,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            microtask_budget: Some(DEFAULT_MICROTASK_BUDGET),
            macrotask_budget: None,
        }
    }
}

impl EventLoopConfig {
    /// Configuration without any budget.
    pub fn unbounded() -> Self {
        Self {
            microtask_budget: None,
            macrotask_budget: None,
        }
    }
}
