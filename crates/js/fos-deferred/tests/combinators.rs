//! Combinator tests

mod common;

use common::*;
use fos_deferred::*;

fn numbers(values: &[i32]) -> Vec<Value> {
    values.iter().copied().map(Value::from).collect()
}

fn field(entry: &Value, key: &str) -> Value {
    entry.get(key).unwrap()
}

// ============================================================================
// all
// ============================================================================

#[test]
fn test_all_empty_fulfills_with_empty_array() {
    init_tracing();
    let result = Deferred::all(Vec::<Value>::new());
    assert_eq!(result.value(), Some(Value::from(Vec::<Value>::new())));
}

#[test]
fn test_all_mixes_values_deferreds_and_thenables() {
    init_tracing();
    let slow = deferred();
    let result = Deferred::all(vec![
        Value::from(1),
        slow.deferred.clone().into(),
        async_fulfilling(3),
        sync_fulfilling(4),
    ]);
    settle_all();
    assert!(result.is_pending());

    slow.resolve.call1(2).unwrap();
    settle_all();
    assert_eq!(result.value(), Some(Value::from(numbers(&[1, 2, 3, 4]))));
}

#[test]
fn test_all_keeps_input_order() {
    init_tracing();
    let first = deferred();
    let second = deferred();
    let result = Deferred::all(vec![first.deferred.clone().into(), second.deferred.clone().into()]);

    second.resolve.call1("second").unwrap();
    settle_all();
    first.resolve.call1("first").unwrap();
    settle_all();

    assert_eq!(
        result.value(),
        Some(Value::from(vec![Value::from("first"), Value::from("second")]))
    );
}

#[test]
fn test_all_rejects_with_first_rejection() {
    init_tracing();
    let never = deferred();
    let result = Deferred::all(vec![
        Value::from(1),
        rejected("x").into(),
        never.deferred.clone().into(),
        async_rejecting("y"),
    ]);
    silence(&result);
    settle_all();

    assert_eq!(result.reason(), Some(Value::from("x")));
}

// ============================================================================
// race
// ============================================================================

#[test]
fn test_race_settles_with_first() {
    init_tracing();
    let never = deferred();
    let result = Deferred::race(vec![never.deferred.clone().into(), Value::from("fast")]);
    settle_all();
    assert_eq!(result.value(), Some(Value::from("fast")));
}

#[test]
fn test_race_rejection_wins_when_first() {
    init_tracing();
    let slow = deferred();
    let result = Deferred::race(vec![slow.deferred.clone().into(), rejected("first").into()]);
    silence(&result);
    settle_all();

    slow.resolve.call1("late").unwrap();
    settle_all();
    assert_eq!(result.reason(), Some(Value::from("first")));
}

#[test]
fn test_race_empty_stays_pending() {
    init_tracing();
    let result = Deferred::race(Vec::<Value>::new());
    settle_all();
    assert!(result.is_pending());
}

// ============================================================================
// any
// ============================================================================

#[test]
fn test_any_fulfills_with_first_fulfillment() {
    init_tracing();
    let result = Deferred::any(vec![
        rejected("a").into(),
        async_fulfilling("b"),
        Value::from("c"),
    ]);
    settle_all();
    assert_eq!(result.value(), Some(Value::from("c")));
}

#[test]
fn test_any_all_rejected_aggregates_in_input_order() {
    init_tracing();
    let late = deferred();
    let result = Deferred::any(vec![late.deferred.clone().into(), rejected("second").into()]);
    silence(&result);
    settle_all();
    assert!(result.is_pending());

    late.reject.call1("first").unwrap();
    settle_all();

    let reason = result.reason().unwrap();
    match reason.as_error() {
        Some(DeferredError::AggregateError { errors, .. }) => {
            assert_eq!(errors, &vec![Value::from("first"), Value::from("second")]);
        }
        other => panic!("expected AggregateError, got {other:?}"),
    }
}

// ============================================================================
// all_settled
// ============================================================================

#[test]
fn test_all_settled_reports_every_outcome() {
    init_tracing();
    let result = Deferred::all_settled(vec![
        Value::from(1),
        rejected("no").into(),
        async_fulfilling("later"),
    ]);
    settle_all();

    let entries = result.value().unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 3);

    assert_eq!(field(&entries[0], "status"), Value::from("fulfilled"));
    assert_eq!(field(&entries[0], "value"), Value::from(1));
    assert_eq!(field(&entries[1], "status"), Value::from("rejected"));
    assert_eq!(field(&entries[1], "reason"), Value::from("no"));
    assert!(!entries[1].as_object().unwrap().has("value"));
    assert_eq!(field(&entries[2], "value"), Value::from("later"));
}

#[test]
fn test_all_settled_never_rejects() {
    init_tracing();
    let result = Deferred::all_settled(vec![rejected("a").into(), rejected("b").into()]);
    settle_all();
    assert!(result.is_fulfilled());
}

// ============================================================================
// Input Validation
// ============================================================================

#[test]
fn test_non_array_inputs_reject_with_type_error() {
    init_tracing();
    let result = Deferred::all(Value::object(Object::new()));
    silence(&result);
    let reason = result.reason().unwrap();
    assert_eq!(
        reason.to_string(),
        "TypeError: Deferred::all expects an array, got object"
    );
}
