#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use fos_deferred::{Deferred, Function, Object, Resolvers, Value};
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per test binary. Filter with
/// `RUST_LOG`.
pub fn init_tracing() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    });
}

// ============================================================================
// Conformance Adapter
// ============================================================================

pub fn deferred() -> Resolvers {
    Deferred::with_resolvers()
}

pub fn resolved(value: impl Into<Value>) -> Deferred {
    Deferred::resolve(value)
}

pub fn rejected(reason: impl Into<Value>) -> Deferred {
    Deferred::reject(reason)
}

/// Drive the current thread's loop until nothing is left to run
pub fn settle_all() {
    fos_deferred::fos_event_loop::run_until_idle().expect("event loop stopped early");
}

/// Attach a no-op rejection handler so diagnostics stay quiet
pub fn silence(deferred: &Deferred) {
    deferred.catch(Function::unary(|_| Ok(Value::Undefined)));
}

// ============================================================================
// Recording Callbacks
// ============================================================================

/// Ordered log of callback invocations
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Rc<RefCell<Vec<(String, Value)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback that logs its argument under `label` and returns it
    pub fn returning(&self, label: &str) -> Function {
        let calls = self.calls.clone();
        let label = label.to_string();
        Function::unary(move |value| {
            calls.borrow_mut().push((label.clone(), value.clone()));
            Ok(value)
        })
    }

    /// Callback that logs its argument under `label` and throws `thrown`
    pub fn throwing(&self, label: &str, thrown: impl Into<Value>) -> Function {
        let calls = self.calls.clone();
        let label = label.to_string();
        let thrown = thrown.into();
        Function::unary(move |value| {
            calls.borrow_mut().push((label.clone(), value));
            Err(thrown.clone())
        })
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(label, _)| label.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.calls.borrow().iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn count(&self, label: &str) -> usize {
        self.calls.borrow().iter().filter(|(l, _)| l == label).count()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }
}

// ============================================================================
// Foreign Thenables
// ============================================================================

/// Object whose `then` is `then`
pub fn thenable(then: impl Fn(&Value, &[Value]) -> fos_deferred::Completion + 'static) -> Value {
    Value::object(Object::new().with("then", Function::new(then)))
}

fn resolver_arg(args: &[Value], index: usize) -> Function {
    args.get(index)
        .and_then(Value::as_function)
        .cloned()
        .expect("then called without resolving functions")
}

/// Thenable that fulfills with `value` before its `then` returns
pub fn sync_fulfilling(value: impl Into<Value>) -> Value {
    let value = value.into();
    thenable(move |_this, args| resolver_arg(args, 0).call1(value.clone()))
}

/// Thenable that rejects with `reason` before its `then` returns
pub fn sync_rejecting(reason: impl Into<Value>) -> Value {
    let reason = reason.into();
    thenable(move |_this, args| resolver_arg(args, 1).call1(reason.clone()))
}

/// Thenable that fulfills with `value` from a later microtask
pub fn async_fulfilling(value: impl Into<Value>) -> Value {
    let value = value.into();
    thenable(move |_this, args| {
        let resolve = resolver_arg(args, 0);
        let value = value.clone();
        fos_deferred::fos_event_loop::queue_microtask(move || {
            let _ = resolve.call1(value);
        });
        Ok(Value::Undefined)
    })
}

/// Thenable that rejects with `reason` from a later microtask
pub fn async_rejecting(reason: impl Into<Value>) -> Value {
    let reason = reason.into();
    thenable(move |_this, args| {
        let reject = resolver_arg(args, 1);
        let reason = reason.clone();
        fos_deferred::fos_event_loop::queue_microtask(move || {
            let _ = reject.call1(reason);
        });
        Ok(Value::Undefined)
    })
}
