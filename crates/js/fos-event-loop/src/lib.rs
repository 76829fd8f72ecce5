//! fOS Event Loop
//!
//! Single-threaded task queues used to run deferred-value reactions.
//!
//! Features:
//! - Microtask queue: FIFO, drained completely before the next macrotask
//! - Macrotask queue: one task per turn, each followed by a microtask drain
//! - Virtual-time timers (setTimeout/clearTimeout)
//! - Budgets that turn runaway task chains into errors
//!
//! Every thread owns one loop. The free functions below operate on the
//! current thread's loop and never run a task while the loop itself is
//! borrowed, so tasks are free to queue more work.

mod config;
mod event_loop;

pub use config::{DEFAULT_MICROTASK_BUDGET, EventLoopConfig};
pub use event_loop::{EventLoop, Task, TimerId};

use std::cell::RefCell;

thread_local! {
    static CURRENT: RefCell<EventLoop> = RefCell::new(EventLoop::new());
}

/// Event loop error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventLoopError {
    #[error("microtask budget exhausted after {executed} tasks")]
    MicrotaskBudgetExceeded { executed: usize },

    #[error("macrotask budget exhausted after {executed} tasks")]
    MacrotaskBudgetExceeded { executed: usize },

    #[error("event loop is already running on this thread")]
    AlreadyRunning,
}

/// Work performed by one call into the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub microtasks: usize,
    pub macrotasks: usize,
    pub timers_fired: usize,
}

fn with_current<R>(f: impl FnOnce(&mut EventLoop) -> R) -> R {
    CURRENT.with(|cell| f(&mut cell.borrow_mut()))
}

/// Marks the current loop as running for the lifetime of the guard.
struct RunGuard;

impl RunGuard {
    fn acquire() -> Result<Self, EventLoopError> {
        with_current(|l| {
            if l.is_running() {
                return Err(EventLoopError::AlreadyRunning);
            }
            l.set_running(true);
            Ok(RunGuard)
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let _ = CURRENT.try_with(|cell| {
            if let Ok(mut l) = cell.try_borrow_mut() {
                l.set_running(false);
            }
        });
    }
}

/// Queue a microtask on the current thread's loop.
///
/// This is the deferred-call service: `task` runs after the current
/// synchronous code has returned, in FIFO order with every other microtask.
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    with_current(|l| l.queue_microtask(Box::new(task)));
}

/// Queue a macrotask on the current thread's loop.
pub fn queue_macrotask(task: impl FnOnce() + 'static) {
    with_current(|l| l.queue_macrotask(Box::new(task)));
}

/// Run `task` as a macrotask once `delay_ms` of virtual time has elapsed.
pub fn set_timeout(task: impl FnOnce() + 'static, delay_ms: u64) -> TimerId {
    with_current(|l| l.set_timeout(Box::new(task), delay_ms))
}

pub fn clear_timer(id: TimerId) -> bool {
    with_current(|l| l.clear_timer(id))
}

pub fn has_pending_work() -> bool {
    with_current(|l| l.has_pending_work())
}

pub fn pending_microtasks() -> usize {
    with_current(|l| l.pending_microtasks())
}

pub fn current_time() -> u64 {
    with_current(|l| l.current_time())
}

pub fn is_running() -> bool {
    with_current(|l| l.is_running())
}

/// Replace the configuration of the current thread's loop.
pub fn configure(config: EventLoopConfig) {
    with_current(|l| l.set_config(config));
}

pub fn config() -> EventLoopConfig {
    with_current(|l| l.config().clone())
}

/// Discard all queued work and timers, keeping the configuration.
pub fn reset() {
    let discarded = with_current(|l| {
        let fresh = EventLoop::with_config(l.config().clone());
        std::mem::replace(l, fresh)
    });
    tracing::debug!(?discarded, "event loop reset");
    // Dropped here, outside the borrow: captured values may own deferreds
    drop(discarded);
}

/// Run microtasks until the queue is empty.
pub fn run_microtasks() -> Result<usize, EventLoopError> {
    let _guard = RunGuard::acquire()?;
    drain_microtasks()
}

/// Run all queued work, jumping virtual time forward to each pending timer,
/// until nothing is left.
pub fn run_until_idle() -> Result<RunStats, EventLoopError> {
    let _guard = RunGuard::acquire()?;
    let mut stats = RunStats::default();
    loop {
        run_turns(&mut stats)?;
        match with_current(|l| l.next_timer_due()) {
            Some(delay) => stats.timers_fired += with_current(|l| l.tick(delay)),
            None => break,
        }
    }
    tracing::trace!(
        microtasks = stats.microtasks,
        macrotasks = stats.macrotasks,
        timers = stats.timers_fired,
        "event loop idle"
    );
    Ok(stats)
}

/// Advance virtual time by `delta_ms`, running every timer that becomes due
/// along the way together with the work it triggers.
pub fn advance_time(delta_ms: u64) -> Result<RunStats, EventLoopError> {
    let _guard = RunGuard::acquire()?;
    let target = with_current(|l| l.current_time().saturating_add(delta_ms));
    let mut stats = RunStats::default();
    loop {
        run_turns(&mut stats)?;
        let step = with_current(|l| {
            l.next_timer_due()
                .filter(|delay| l.current_time().saturating_add(*delay) <= target)
        });
        match step {
            Some(delay) => stats.timers_fired += with_current(|l| l.tick(delay)),
            None => {
                with_current(|l| {
                    let rest = target.saturating_sub(l.current_time());
                    l.tick(rest)
                });
                break;
            }
        }
    }
    Ok(stats)
}

/// Drain microtasks, then alternate one macrotask and a full drain until
/// both queues are empty.
fn run_turns(stats: &mut RunStats) -> Result<(), EventLoopError> {
    let budget = with_current(|l| l.config().macrotask_budget);
    loop {
        stats.microtasks += drain_microtasks()?;

        let executed = stats.macrotasks;
        let next = with_current(|l| {
            if l.pending_macrotasks() == 0 {
                return Ok(None);
            }
            if budget.is_some_and(|limit| executed >= limit) {
                return Err(EventLoopError::MacrotaskBudgetExceeded { executed });
            }
            Ok(l.next_macrotask())
        });
        let next = next.inspect_err(|e| tracing::warn!(error = %e, "stopping event loop"))?;

        let Some(task) = next else {
            return Ok(());
        };
        task();
        stats.macrotasks += 1;
    }
}

fn drain_microtasks() -> Result<usize, EventLoopError> {
    let budget = with_current(|l| l.config().microtask_budget);
    let mut executed = 0;
    loop {
        let next = with_current(|l| {
            if l.pending_microtasks() == 0 {
                return Ok(None);
            }
            if budget.is_some_and(|limit| executed >= limit) {
                return Err(EventLoopError::MicrotaskBudgetExceeded { executed });
            }
            Ok(l.next_microtask())
        });
        let next = next.inspect_err(|e| tracing::warn!(error = %e, "stopping event loop"))?;

        let Some(task) = next else {
            break;
        };
        task();
        executed += 1;
    }
    if executed > 0 {
        tracing::trace!(executed, "drained microtask queue");
    }
    Ok(executed)
}
