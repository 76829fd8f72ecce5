//! Aggregate Combinators
//!
//! `all`, `race`, `any` and `all_settled`, built only on `resolve` and
//! `then`. Every input goes through `Deferred::resolve` first, so plain
//! values, deferreds and foreign thenables can be mixed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::DeferredError;
use crate::deferred::Deferred;
use crate::value::{Function, Object, Value};

/// Array elements, or the `TypeError` used to reject a non-array input
fn collect_items(iterable: Value, combinator: &str) -> Result<Vec<Value>, Value> {
    match iterable {
        Value::Array(items) => Ok(items.to_vec()),
        other => Err(DeferredError::type_error(format!(
            "Deferred::{combinator} expects an array, got {}",
            other.type_name()
        ))
        .into()),
    }
}

/// Countdown shared by the per-input callbacks
struct Slots {
    values: RefCell<Vec<Value>>,
    remaining: Cell<usize>,
}

impl Slots {
    fn new(len: usize) -> Rc<Self> {
        Rc::new(Self {
            values: RefCell::new(vec![Value::Undefined; len]),
            remaining: Cell::new(len),
        })
    }

    /// Store `value` at `index`; returns every value once all slots filled
    fn fill(&self, index: usize, value: Value) -> Option<Vec<Value>> {
        self.values.borrow_mut()[index] = value;
        self.remaining.set(self.remaining.get() - 1);
        (self.remaining.get() == 0).then(|| self.values.borrow().clone())
    }
}

impl Deferred {
    /// Fulfills with every input's value, in input order, once all fulfill;
    /// rejects with the first rejection.
    pub fn all(iterable: impl Into<Value>) -> Deferred {
        let items = match collect_items(iterable.into(), "all") {
            Ok(items) => items,
            Err(reason) => return Deferred::reject(reason),
        };
        let output = Deferred::pending();
        if items.is_empty() {
            output.resolve_once(Value::from(Vec::<Value>::new()));
            return output;
        }

        let (_, reject) = output.resolving_functions();
        let slots = Slots::new(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let output = output.clone();
            let slots = slots.clone();
            let on_fulfilled = Function::unary(move |value| {
                if let Some(values) = slots.fill(index, value) {
                    output.resolve_once(Value::from(values));
                }
                Ok(Value::Undefined)
            });
            Deferred::resolve(item).then(on_fulfilled, reject.clone());
        }
        output
    }

    /// Settles like whichever input settles first. An empty input never
    /// settles.
    pub fn race(iterable: impl Into<Value>) -> Deferred {
        let items = match collect_items(iterable.into(), "race") {
            Ok(items) => items,
            Err(reason) => return Deferred::reject(reason),
        };
        let output = Deferred::pending();
        let (resolve, reject) = output.resolving_functions();
        for item in items {
            Deferred::resolve(item).then(resolve.clone(), reject.clone());
        }
        output
    }

    /// Fulfills with the first fulfillment. Rejects with an
    /// `AggregateError` holding every reason, in input order, when all
    /// inputs reject or there are none.
    pub fn any(iterable: impl Into<Value>) -> Deferred {
        let items = match collect_items(iterable.into(), "any") {
            Ok(items) => items,
            Err(reason) => return Deferred::reject(reason),
        };
        if items.is_empty() {
            return Deferred::reject(aggregate_error(Vec::new()));
        }

        let output = Deferred::pending();
        let (resolve, _) = output.resolving_functions();
        let slots = Slots::new(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let output = output.clone();
            let slots = slots.clone();
            let on_rejected = Function::unary(move |reason| {
                if let Some(reasons) = slots.fill(index, reason) {
                    output.reject_once(aggregate_error(reasons));
                }
                Ok(Value::Undefined)
            });
            Deferred::resolve(item).then(resolve.clone(), on_rejected);
        }
        output
    }

    /// Fulfills once every input settled, with one
    /// `{status, value}` / `{status, reason}` object per input.
    pub fn all_settled(iterable: impl Into<Value>) -> Deferred {
        let items = match collect_items(iterable.into(), "all_settled") {
            Ok(items) => items,
            Err(reason) => return Deferred::reject(reason),
        };
        let output = Deferred::pending();
        if items.is_empty() {
            output.resolve_once(Value::from(Vec::<Value>::new()));
            return output;
        }

        let slots = Slots::new(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let record = |status: &'static str, key: &'static str| {
                let output = output.clone();
                let slots = slots.clone();
                Function::unary(move |value| {
                    let entry = Object::new().with("status", status).with(key, value);
                    if let Some(entries) = slots.fill(index, entry.into()) {
                        output.resolve_once(Value::from(entries));
                    }
                    Ok(Value::Undefined)
                })
            };
            Deferred::resolve(item).then(record("fulfilled", "value"), record("rejected", "reason"));
        }
        output
    }
}

fn aggregate_error(errors: Vec<Value>) -> Value {
    DeferredError::AggregateError {
        message: "all deferred values were rejected".to_string(),
        errors,
    }
    .into()
}
