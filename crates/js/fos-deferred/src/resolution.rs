//! Resolution Procedure
//!
//! Decides what resolving a deferred with a value means:
//! - the deferred itself: rejected with a `TypeError`
//! - another deferred: adopted, by forwarding to it
//! - a foreign thenable: wrapped in a fresh deferred that runs its `then`,
//!   which is then adopted
//! - anything else: fulfilled with the value
//!
//! Foreign `then` calls go through a per-thread trampoline. A thenable
//! resolved from inside another thenable's `then` is queued and invoked once
//! the outer call returns, so chains of thenables of any depth run in
//! constant stack.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::DeferredError;
use crate::deferred::{Deferred, Settlement};
use crate::reaction;
use crate::value::{Function, Value};

pub(crate) fn resolve(deferred: &Deferred, value: Value) {
    if let Err(reason) = resolve_value(deferred, value) {
        tracing::debug!(deferred = %deferred.id(), reason = %reason, "resolution failed");
        deferred.settle(Settlement::Rejected(reason));
    }
}

fn resolve_value(deferred: &Deferred, value: Value) -> Result<(), Value> {
    if let Value::Deferred(nested) = &value {
        if nested.ptr_eq(deferred) {
            return Err(DeferredError::type_error("cannot resolve a value with itself").into());
        }
        return adopt(deferred, nested.clone());
    }

    if !matches!(value, Value::Object(_) | Value::Function(_)) {
        deferred.settle(Settlement::Fulfilled(value));
        return Ok(());
    }

    // Read exactly once; the getter may throw
    let then = value.get("then")?;
    if let Value::Function(then) = then {
        return adopt_thenable(deferred, value, then);
    }

    deferred.settle(Settlement::Fulfilled(value));
    Ok(())
}

fn adopt(deferred: &Deferred, nested: Deferred) -> Result<(), Value> {
    if nested.deepest().ptr_eq(deferred) {
        return Err(DeferredError::type_error("chaining cycle detected").into());
    }

    tracing::debug!(deferred = %deferred.id(), nested = %nested.id(), "adopting");
    for queued in deferred.forward_to(nested) {
        reaction::attach(deferred, queued);
    }
    Ok(())
}

fn adopt_thenable(deferred: &Deferred, thenable: Value, then: Function) -> Result<(), Value> {
    let wrapper = Deferred::pending();
    tracing::debug!(deferred = %deferred.id(), wrapper = %wrapper.id(), "wrapping foreign thenable");
    adopt(deferred, wrapper.clone())?;
    run_thenable_job(ThenableJob {
        wrapper,
        thenable,
        then,
    });
    Ok(())
}

/// One pending call of a foreign `then`
struct ThenableJob {
    wrapper: Deferred,
    thenable: Value,
    then: Function,
}

impl ThenableJob {
    fn invoke(self) {
        let (resolve, reject) = self.wrapper.resolving_functions();
        if let Err(reason) = self.then.call(&self.thenable, &[resolve.into(), reject.into()]) {
            // Swallowed when the thenable already called one of the resolvers
            self.wrapper.reject_once(reason);
        }
    }
}

thread_local! {
    /// `Some` while a thenable job is running on this thread
    static THENABLE_JOBS: RefCell<Option<VecDeque<ThenableJob>>> = const { RefCell::new(None) };
}

/// Clears the trampoline even if a job panics
struct TrampolineGuard;

impl Drop for TrampolineGuard {
    fn drop(&mut self) {
        let leftover = THENABLE_JOBS
            .try_with(|jobs| jobs.try_borrow_mut().ok().and_then(|mut jobs| jobs.take()))
            .ok()
            .flatten();
        drop(leftover);
    }
}

fn run_thenable_job(job: ThenableJob) {
    let first = THENABLE_JOBS.with(|jobs| {
        let mut jobs = jobs.borrow_mut();
        match jobs.as_mut() {
            Some(queue) => {
                queue.push_back(job);
                None
            }
            None => {
                *jobs = Some(VecDeque::new());
                Some(job)
            }
        }
    });
    let Some(mut job) = first else {
        return;
    };

    let _guard = TrampolineGuard;
    let mut invoked = 0usize;
    loop {
        job.invoke();
        invoked += 1;
        let next = THENABLE_JOBS.with(|jobs| jobs.borrow_mut().as_mut().and_then(VecDeque::pop_front));
        match next {
            Some(next) => job = next,
            None => break,
        }
    }
    if invoked > 1 {
        tracing::trace!(invoked, "thenable trampoline drained");
    }
}
