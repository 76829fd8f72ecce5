//! Reaction Scheduler
//!
//! Reactions attach to the end of a forwarding chain and always run from
//! the microtask queue, one task per reaction.

use crate::deferred::{Deferred, Settlement};
use crate::value::{Function, Value};

/// Callbacks registered by one `then` call, plus the deferred it returned
pub(crate) struct Reaction {
    on_fulfilled: Option<Function>,
    on_rejected: Option<Function>,
    downstream: Deferred,
}

impl Reaction {
    /// Non-callable handlers become pass-through
    pub(crate) fn new(on_fulfilled: &Value, on_rejected: &Value, downstream: Deferred) -> Self {
        Self {
            on_fulfilled: on_fulfilled.as_function().cloned(),
            on_rejected: on_rejected.as_function().cloned(),
            downstream,
        }
    }

    pub(crate) fn into_downstream(self) -> Deferred {
        self.downstream
    }
}

/// Queue `reaction` on the deepest link of `deferred`'s chain, or schedule
/// it right away if that link has already settled.
pub(crate) fn attach(deferred: &Deferred, reaction: Reaction) {
    let target = deferred.deepest();
    if let Some(reaction) = target.push_reaction(reaction) {
        schedule(target, reaction);
    }
}

/// Schedule reactions taken from a deferred that just settled, keeping
/// their attachment order.
pub(crate) fn flush(settled: &Deferred, reactions: Vec<Reaction>) {
    for reaction in reactions {
        schedule(settled.clone(), reaction);
    }
}

fn schedule(settled: Deferred, reaction: Reaction) {
    fos_event_loop::queue_microtask(move || run(&settled, reaction));
}

fn run(settled: &Deferred, reaction: Reaction) {
    let Some(settlement) = settled.own_settlement() else {
        tracing::warn!(deferred = %settled.id(), "reaction scheduled on a pending deferred");
        return;
    };

    let Reaction {
        on_fulfilled,
        on_rejected,
        downstream,
    } = reaction;
    let callback = match settlement {
        Settlement::Fulfilled(_) => on_fulfilled,
        Settlement::Rejected(_) => on_rejected,
    };

    let Some(callback) = callback else {
        match settlement {
            Settlement::Fulfilled(value) => downstream.resolve_once(value),
            Settlement::Rejected(reason) => downstream.reject_once(reason),
        };
        return;
    };

    match callback.call(&Value::Undefined, &[settlement.into_value()]) {
        Ok(value) => downstream.resolve_once(value),
        Err(reason) => {
            tracing::trace!(deferred = %downstream.id(), reason = %reason, "reaction threw");
            downstream.reject_once(reason)
        }
    };
}
