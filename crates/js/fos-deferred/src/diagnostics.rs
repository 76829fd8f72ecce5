//! Unhandled Rejection Diagnostics
//!
//! A deferred rejected while nothing is attached to it gets one check,
//! queued as a macrotask so every microtask of the current turn has had a
//! chance to attach a handler first. If it is still unhandled by then, a
//! warning is logged and every registered observer is told about it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config;
use crate::deferred::{Deferred, DeferredId};
use crate::value::Value;

/// A rejection nobody handled
#[derive(Debug, Clone)]
pub struct UnhandledRejection {
    pub deferred: DeferredId,
    pub reason: Value,
}

/// Handle for removing an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Rc<dyn Fn(&UnhandledRejection)>;

thread_local! {
    static OBSERVERS: RefCell<Vec<(ObserverId, Observer)>> = const { RefCell::new(Vec::new()) };
    static NEXT_OBSERVER_ID: Cell<u64> = const { Cell::new(1) };
}

/// Register `observer` for unhandled rejections on the current thread
pub fn on_unhandled_rejection(observer: impl Fn(&UnhandledRejection) + 'static) -> ObserverId {
    let id = NEXT_OBSERVER_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        ObserverId(id)
    });
    OBSERVERS.with(|observers| observers.borrow_mut().push((id, Rc::new(observer))));
    id
}

pub fn remove_unhandled_rejection_observer(id: ObserverId) -> bool {
    OBSERVERS.with(|observers| {
        let mut observers = observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    })
}

/// Queue the unhandled check for a deferred that was rejected with no
/// reaction attached. The check keeps only the deferred's handled flag, so
/// a deferred that was handled and then dropped stays handled, and one
/// dropped without a handler is reported.
pub(crate) fn track_rejection(deferred: &Deferred, reason: &Value) {
    if !config::report_unhandled_rejections() {
        return;
    }
    let handled = deferred.handled_flag();
    let event = UnhandledRejection {
        deferred: deferred.id(),
        reason: reason.clone(),
    };
    fos_event_loop::queue_macrotask(move || {
        if !handled.get() {
            report(&event);
        }
    });
}

fn report(event: &UnhandledRejection) {
    tracing::warn!(
        deferred = %event.deferred,
        reason = %event.reason,
        "possible unhandled rejection"
    );
    // Snapshot so observers may register or remove observers
    let observers: Vec<Observer> =
        OBSERVERS.with(|observers| observers.borrow().iter().map(|(_, o)| o.clone()).collect());
    for observer in observers {
        observer(event);
    }
}
