//! Deferred Value
//!
//! The state container: pending until settled exactly once, then fulfilled
//! or rejected forever. A deferred that adopted another one keeps pointing
//! at it (`forward`) and reports whatever the end of that chain reports.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::DeferredError;
use crate::diagnostics;
use crate::reaction::{self, Reaction};
use crate::resolution;
use crate::value::{Function, Value};

static NEXT_DEFERRED_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier, used in logs and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeferredId(u64);

impl DeferredId {
    fn next() -> Self {
        DeferredId(NEXT_DEFERRED_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeferredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Deferred state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeferredState {
    Pending,
    Fulfilled,
    Rejected,
}

/// Final outcome of a deferred value
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Fulfilled(Value),
    Rejected(Value),
}

impl Settlement {
    pub fn state(&self) -> DeferredState {
        match self {
            Settlement::Fulfilled(_) => DeferredState::Fulfilled,
            Settlement::Rejected(_) => DeferredState::Rejected,
        }
    }

    /// Fulfillment value or rejection reason
    pub fn value(&self) -> &Value {
        match self {
            Settlement::Fulfilled(v) | Settlement::Rejected(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Settlement::Fulfilled(v) | Settlement::Rejected(v) => v,
        }
    }

    pub fn into_result(self) -> Result<Value, Value> {
        match self {
            Settlement::Fulfilled(v) => Ok(v),
            Settlement::Rejected(v) => Err(v),
        }
    }
}

pub(crate) struct DeferredInner {
    id: DeferredId,
    /// `None` while pending
    settlement: Option<Settlement>,
    /// Deferred adopted by the resolution procedure
    forward: Option<Deferred>,
    resolved_once: bool,
    /// Shared with a queued unhandled-rejection check, which must see it
    /// even after the deferred itself was dropped
    handled: Rc<Cell<bool>>,
    reactions: Vec<Reaction>,
}

impl Drop for DeferredInner {
    fn drop(&mut self) {
        // Forwarding and reaction chains can be arbitrarily long: unlink them
        // with a worklist instead of recursive drops.
        let mut orphans: Vec<Deferred> = self.forward.take().into_iter().collect();
        orphans.extend(self.reactions.drain(..).map(Reaction::into_downstream));
        while let Some(deferred) = orphans.pop() {
            if let Ok(cell) = Rc::try_unwrap(deferred.inner) {
                let mut inner = cell.into_inner();
                orphans.extend(inner.forward.take());
                orphans.extend(inner.reactions.drain(..).map(Reaction::into_downstream));
            }
        }
    }
}

/// Deferred value handle. Clones share the same state.
#[derive(Clone)]
pub struct Deferred {
    inner: Rc<RefCell<DeferredInner>>,
}

/// A pending deferred together with its resolving functions
#[derive(Debug, Clone)]
pub struct Resolvers {
    pub deferred: Deferred,
    pub resolve: Function,
    pub reject: Function,
}

impl Deferred {
    pub(crate) fn pending() -> Self {
        let id = DeferredId::next();
        tracing::trace!(deferred = %id, "created");
        Self {
            inner: Rc::new(RefCell::new(DeferredInner {
                id,
                settlement: None,
                forward: None,
                resolved_once: false,
                handled: Rc::new(Cell::new(false)),
                reactions: Vec::new(),
            })),
        }
    }

    /// Create a deferred and synchronously run `executor(resolve, reject)`.
    ///
    /// A throw from the executor rejects the deferred unless one of the
    /// resolving functions was already called.
    pub fn new(executor: &Value) -> Result<Self, DeferredError> {
        let Value::Function(executor) = executor else {
            return Err(DeferredError::type_error(format!(
                "executor must be a function, got {}",
                executor.type_name()
            )));
        };
        Ok(Self::with_executor(|resolve, reject| {
            executor
                .call(&Value::Undefined, &[resolve.into(), reject.into()])
                .map(drop)
        }))
    }

    /// Typed form of [`Deferred::new`]
    pub fn with_executor(executor: impl FnOnce(Function, Function) -> Result<(), Value>) -> Self {
        let deferred = Self::pending();
        let (resolve, reject) = deferred.resolving_functions();
        if let Err(reason) = executor(resolve, reject) {
            if !deferred.reject_once(reason) {
                tracing::trace!(deferred = %deferred.id(), "executor threw after settling, ignored");
            }
        }
        deferred
    }

    /// Pending deferred plus the functions that settle it
    pub fn with_resolvers() -> Resolvers {
        let deferred = Self::pending();
        let (resolve, reject) = deferred.resolving_functions();
        Resolvers {
            deferred,
            resolve,
            reject,
        }
    }

    /// `value` itself if it is already a deferred, otherwise a deferred
    /// resolved with it
    pub fn resolve(value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Deferred(deferred) => deferred,
            other => {
                let deferred = Self::pending();
                deferred.resolve_once(other);
                deferred
            }
        }
    }

    /// Deferred rejected with `reason`
    pub fn reject(reason: impl Into<Value>) -> Self {
        let deferred = Self::pending();
        deferred.reject_once(reason.into());
        deferred
    }

    /// Attach reactions and return the deferred they settle.
    ///
    /// Anything that is not a function is ignored and the settlement passes
    /// through unchanged. The callbacks never run before this returns.
    pub fn then(&self, on_fulfilled: impl Into<Value>, on_rejected: impl Into<Value>) -> Self {
        let downstream = Self::pending();
        let reaction = Reaction::new(&on_fulfilled.into(), &on_rejected.into(), downstream.clone());
        reaction::attach(self, reaction);
        downstream
    }

    pub fn catch(&self, on_rejected: impl Into<Value>) -> Self {
        self.then((), on_rejected)
    }

    /// Run `on_finally()` on either outcome, then pass the incoming
    /// settlement through. A throw from `on_finally`, or a thenable it
    /// returns that rejects, replaces the settlement.
    pub fn finally(&self, on_finally: impl Into<Value>) -> Self {
        let Some(callback) = on_finally.into().as_function().cloned() else {
            return self.then((), ());
        };

        let after_fulfilled = {
            let callback = callback.clone();
            Function::unary(move |value| {
                let result = callback.call(&Value::Undefined, &[])?;
                let passthrough = Function::unary(move |_| Ok(value.clone()));
                Ok(Deferred::resolve(result).then(passthrough, ()).into())
            })
        };
        let after_rejected = Function::unary(move |reason| {
            let result = callback.call(&Value::Undefined, &[])?;
            let rethrow = Function::unary(move |_| Err(reason.clone()));
            Ok(Deferred::resolve(result).then(rethrow, ()).into())
        });
        self.then(after_fulfilled, after_rejected)
    }

    pub fn id(&self) -> DeferredId {
        self.inner.borrow().id
    }

    pub fn state(&self) -> DeferredState {
        self.settlement()
            .map_or(DeferredState::Pending, |settlement| settlement.state())
    }

    /// Settlement of the deferred, or of the end of its forwarding chain
    pub fn settlement(&self) -> Option<Settlement> {
        let deepest = self.deepest();
        let settlement = deepest.inner.borrow().settlement.clone();
        settlement
    }

    /// Fulfillment value, if fulfilled
    pub fn value(&self) -> Option<Value> {
        match self.settlement()? {
            Settlement::Fulfilled(value) => Some(value),
            Settlement::Rejected(_) => None,
        }
    }

    /// Rejection reason, if rejected
    pub fn reason(&self) -> Option<Value> {
        match self.settlement()? {
            Settlement::Rejected(reason) => Some(reason),
            Settlement::Fulfilled(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == DeferredState::Pending
    }

    pub fn is_fulfilled(&self) -> bool {
        self.state() == DeferredState::Fulfilled
    }

    pub fn is_rejected(&self) -> bool {
        self.state() == DeferredState::Rejected
    }

    /// Whether a reaction was ever attached to the end of the forwarding chain
    pub fn is_handled(&self) -> bool {
        let deepest = self.deepest();
        let handled = deepest.inner.borrow().handled.get();
        handled
    }

    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Resolve and reject functions sharing this deferred's latch
    pub(crate) fn resolving_functions(&self) -> (Function, Function) {
        let target = self.clone();
        let resolve = Function::named("resolve", move |_this, args| {
            target.resolve_once(args.first().cloned().unwrap_or_default());
            Ok(Value::Undefined)
        });
        let target = self.clone();
        let reject = Function::named("reject", move |_this, args| {
            target.reject_once(args.first().cloned().unwrap_or_default());
            Ok(Value::Undefined)
        });
        (resolve, reject)
    }

    /// First call of either resolving function wins; returns false when the
    /// latch was already set.
    fn latch(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.resolved_once {
            return false;
        }
        inner.resolved_once = true;
        true
    }

    pub(crate) fn resolve_once(&self, value: Value) -> bool {
        if !self.latch() {
            tracing::trace!(deferred = %self.id(), "already resolved, ignoring resolve");
            return false;
        }
        resolution::resolve(self, value);
        true
    }

    pub(crate) fn reject_once(&self, reason: Value) -> bool {
        if !self.latch() {
            tracing::trace!(deferred = %self.id(), "already resolved, ignoring reject");
            return false;
        }
        self.settle(Settlement::Rejected(reason));
        true
    }

    /// Terminal transition. No-op unless pending and not forwarding.
    pub(crate) fn settle(&self, settlement: Settlement) {
        let (reactions, unobserved) = {
            let mut inner = self.inner.borrow_mut();
            if inner.settlement.is_some() || inner.forward.is_some() {
                return;
            }
            let reactions = std::mem::take(&mut inner.reactions);
            let unobserved = settlement.state() == DeferredState::Rejected && !inner.handled.get();
            inner.settlement = Some(settlement.clone());
            (reactions, unobserved)
        };

        tracing::trace!(
            deferred = %self.id(),
            state = ?settlement.state(),
            reactions = reactions.len(),
            "settled"
        );
        if unobserved {
            diagnostics::track_rejection(self, settlement.value());
        }
        reaction::flush(self, reactions);
    }

    /// Start forwarding to `target`. Returns the reactions queued so far so
    /// the caller can re-attach them along the new chain.
    pub(crate) fn forward_to(&self, target: Deferred) -> Vec<Reaction> {
        let mut inner = self.inner.borrow_mut();
        inner.forward = Some(target);
        std::mem::take(&mut inner.reactions)
    }

    /// End of the forwarding chain: the first link that is settled or is not
    /// forwarding.
    pub(crate) fn deepest(&self) -> Deferred {
        let mut current = self.clone();
        loop {
            let next = current.inner.borrow().forward.clone();
            match next {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    /// Settlement of this link only, without following the chain
    pub(crate) fn own_settlement(&self) -> Option<Settlement> {
        self.inner.borrow().settlement.clone()
    }

    /// Queue `reaction` while pending. Once settled the reaction is handed
    /// back for scheduling.
    pub(crate) fn push_reaction(&self, reaction: Reaction) -> Option<Reaction> {
        let mut inner = self.inner.borrow_mut();
        inner.handled.set(true);
        if inner.settlement.is_some() {
            return Some(reaction);
        }
        inner.reactions.push(reaction);
        None
    }

    /// Flag set once a reaction is attached to this link
    pub(crate) fn handled_flag(&self) -> Rc<Cell<bool>> {
        self.inner.borrow().handled.clone()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(inner) = self.inner.try_borrow() else {
            return f.write_str("Deferred(<borrowed>)");
        };
        let mut s = f.debug_struct("Deferred");
        s.field("id", &inner.id);
        match (&inner.settlement, &inner.forward) {
            (Some(settlement), _) => s.field("settlement", settlement),
            (None, Some(forward)) => s.field("forwarding_to", &forward.inner.try_borrow().map(|i| i.id).ok()),
            (None, None) => s.field("state", &DeferredState::Pending),
        };
        s.field("reactions", &inner.reactions.len()).finish()
    }
}
