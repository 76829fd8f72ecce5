//! Event Loop Implementation
//!
//! Microtask and macrotask queues plus virtual-time timers. This type only
//! stores work; running it is done by the thread-local driver in the crate
//! root so that no borrow of the loop is held while a task executes.

use std::collections::VecDeque;
use std::fmt;

use crate::config::EventLoopConfig;

/// A unit of deferred work
pub type Task = Box<dyn FnOnce() + 'static>;

/// Handle returned by `set_timeout`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u32);

impl TimerId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Timer task
struct Timer {
    id: TimerId,
    task: Task,
    due_at: u64,
}

/// Event loop queues
pub struct EventLoop {
    /// Microtask queue (reactions, thenable follow-ups)
    microtasks: VecDeque<Task>,
    /// Macrotask queue (fired timers, diagnostics)
    macrotasks: VecDeque<Task>,
    /// Pending timers
    timers: Vec<Timer>,
    /// Next timer ID
    next_timer_id: u32,
    /// Current virtual timestamp (ms)
    current_time: u64,
    /// Set while a driver is draining this loop
    running: bool,
    config: EventLoopConfig,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::with_config(EventLoopConfig::default())
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("microtasks", &self.microtasks.len())
            .field("macrotasks", &self.macrotasks.len())
            .field("timers", &self.timers.len())
            .field("current_time", &self.current_time)
            .field("running", &self.running)
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EventLoopConfig) -> Self {
        Self {
            microtasks: VecDeque::new(),
            macrotasks: VecDeque::new(),
            timers: Vec::new(),
            next_timer_id: 1,
            current_time: 0,
            running: false,
            config,
        }
    }

    pub fn config(&self) -> &EventLoopConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EventLoopConfig) {
        self.config = config;
    }

    /// Queue a microtask
    pub fn queue_microtask(&mut self, task: Task) {
        self.microtasks.push_back(task);
    }

    /// Queue a macrotask
    pub fn queue_macrotask(&mut self, task: Task) {
        self.macrotasks.push_back(task);
    }

    /// Schedule `task` to become a macrotask once `delay_ms` of virtual time
    /// has passed
    pub fn set_timeout(&mut self, task: Task, delay_ms: u64) -> TimerId {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id = self.next_timer_id.wrapping_add(1);
        self.timers.push(Timer {
            id,
            task,
            due_at: self.current_time.saturating_add(delay_ms),
        });
        id
    }

    /// Clear a pending timer. Returns false if it already fired or never
    /// existed.
    pub fn clear_timer(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    /// Advance time and move due timers onto the macrotask queue.
    /// Returns the number of timers that fired.
    pub fn tick(&mut self, delta_ms: u64) -> usize {
        self.current_time = self.current_time.saturating_add(delta_ms);

        let now = self.current_time;
        let (mut due, pending): (Vec<Timer>, Vec<Timer>) =
            std::mem::take(&mut self.timers).into_iter().partition(|t| t.due_at <= now);
        self.timers = pending;

        // Earlier deadlines first, ties in scheduling order
        due.sort_by_key(|t| (t.due_at, t.id));
        let fired = due.len();
        for timer in due {
            self.macrotasks.push_back(timer.task);
        }
        fired
    }

    /// Time until the earliest timer is due
    pub fn next_timer_due(&self) -> Option<u64> {
        self.timers
            .iter()
            .map(|t| t.due_at.saturating_sub(self.current_time))
            .min()
    }

    pub fn next_microtask(&mut self) -> Option<Task> {
        self.microtasks.pop_front()
    }

    pub fn next_macrotask(&mut self) -> Option<Task> {
        self.macrotasks.pop_front()
    }

    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.len()
    }

    pub fn pending_macrotasks(&self) -> usize {
        self.macrotasks.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Check if there's pending work
    pub fn has_pending_work(&self) -> bool {
        !self.microtasks.is_empty() || !self.macrotasks.is_empty() || !self.timers.is_empty()
    }

    /// Get current virtual time
    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }
}
