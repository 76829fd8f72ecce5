//! fOS Deferred Values
//!
//! Promises/A+ compliant deferred values for the fOS JavaScript runtime.
//!
//! Features:
//! - Pending/fulfilled/rejected state machine with first-call-wins resolvers
//! - Resolution of nested deferreds and foreign thenables, at any depth
//! - `then`/`catch`/`finally` reactions, always run from the microtask queue
//! - `all`, `race`, `any` and `all_settled` combinators
//! - Unhandled-rejection diagnostics
//!
//! Reactions run on the current thread's [`fos_event_loop`]; drive it with
//! `fos_event_loop::run_until_idle()`.
//!
//! ```
//! use fos_deferred::{Deferred, Function, Value};
//!
//! let doubled = Deferred::resolve(21).then(
//!     Function::unary(|v| Ok(Value::from(v.as_number().unwrap_or(0.0) * 2.0))),
//!     (),
//! );
//! assert!(doubled.is_pending());
//!
//! fos_event_loop::run_until_idle().unwrap();
//! assert_eq!(doubled.value(), Some(Value::from(42)));
//! ```

mod combinators;
mod config;
mod deferred;
mod diagnostics;
mod reaction;
mod resolution;
mod value;

pub use config::{Config, config, configure};
pub use deferred::{Deferred, DeferredId, DeferredState, Resolvers, Settlement};
pub use diagnostics::{
    ObserverId, UnhandledRejection, on_unhandled_rejection, remove_unhandled_rejection_observer,
};
pub use value::{Completion, Function, Object, Property, Value};

pub use fos_event_loop;

/// Version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors raised as rejection reasons or returned from constructors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeferredError {
    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("AggregateError: {message}")]
    AggregateError { message: String, errors: Vec<Value> },
}

impl DeferredError {
    pub fn type_error(message: impl Into<String>) -> Self {
        DeferredError::TypeError(message.into())
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, DeferredError::TypeError(_))
    }
}
