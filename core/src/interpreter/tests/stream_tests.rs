//! Tests for stream registration, pushes, and async sources

use super::helpers::*;
use crate::interpreter::{
    Datum, EngineError, Evaluator, ExceptionKind, Expr, Program, StreamKind, Val, ValueKind,
};
use std::thread;

fn over(expr: Expr) -> Evaluator {
    Evaluator::new(Program::new(&expr))
}

#[test]
fn test_registration_conflict() {
    let mut evaluator = over(n(1.0));
    evaluator.register_stream("Key");

    let err = evaluator
        .register_stream_with("Key", StreamKind::Of(ValueKind::Number), None)
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::StreamConflict {
            name: "Key".into(),
            existing: "any".into(),
            requested: "Number".into(),
        }
    );

    // Same kind again is fine
    evaluator.register_stream("Key");
    assert!(evaluator
        .register_stream_with("Key", StreamKind::Any, None)
        .is_ok());
}

#[test]
fn test_initial_value_must_match_kind() {
    let mut evaluator = over(n(1.0));

    let err = evaluator
        .register_stream_with(
            "Score",
            StreamKind::Of(ValueKind::Number),
            Some(Val::text("high")),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::StreamKindMismatch { .. }));
}

#[test]
fn test_push_faults_are_synchronous() {
    let mut evaluator = started(n(1.0));

    assert_eq!(
        evaluator.push("Nope", Val::num(1.0)).unwrap_err(),
        EngineError::UnknownStream("Nope".into())
    );
    assert!(matches!(
        evaluator.push("Time", Val::text("noon")).unwrap_err(),
        EngineError::StreamKindMismatch { .. }
    ));
    assert!(evaluator.push("Time", Val::measure(1.0, "ms")).is_ok());
}

#[test]
fn test_stream_without_value() {
    let mut evaluator = over(stream("Key"));
    evaluator.register_stream("Key");
    evaluator.run().unwrap();

    let Some(Val::Exception(e)) = evaluator.latest_result() else {
        unreachable!("Expected an exception, got {}", latest(&evaluator));
    };
    assert_eq!(e.kind, ExceptionKind::StreamAbsent { name: "Key".into() });

    evaluator.push("Key", Val::text("a")).unwrap();
    assert!(evaluator.latest_result().unwrap().is_exception());

    evaluator.flush().unwrap();
    assert_eq!(latest(&evaluator), "\"a\"");
}

#[test]
fn test_registered_initial_value() {
    let mut evaluator = over(bin(stream("Score"), "+", n(1.0)));
    evaluator
        .register_stream_with("Score", StreamKind::Of(ValueKind::Number), Some(Val::num(9.0)))
        .unwrap();

    assert_eq!(evaluator.run().unwrap(), Val::num(10.0));
}

#[test]
fn test_values_from_another_thread() {
    let mut evaluator = started(time());
    let sender = evaluator.stream_sender();

    thread::spawn(move || {
        sender.send("Time", Datum::measure(5.0, "ms")).unwrap();
    })
    .join()
    .unwrap();
    assert_eq!(latest(&evaluator), "0ms");

    evaluator.flush().unwrap();
    assert_eq!(latest(&evaluator), "5ms");
}

#[test]
fn test_bad_sent_values_are_dropped() {
    let mut evaluator = started(time());
    let sender = evaluator.stream_sender();

    sender.send("Time", Datum::Text("noon".into())).unwrap();
    sender.send("Nope", Datum::Bool(true)).unwrap();
    evaluator.flush().unwrap();

    assert_eq!(latest(&evaluator), "0ms");
}

#[test]
fn test_changed_reflects_last_flush() {
    let mut evaluator = started(changed(time()));
    assert_eq!(latest(&evaluator), "⊥");

    evaluator.push("Time", Val::measure(1.0, "ms")).unwrap();
    evaluator.flush().unwrap();
    assert_eq!(latest(&evaluator), "⊤");

    evaluator.flush().unwrap();
    assert_eq!(latest(&evaluator), "⊥");
}

#[test]
fn test_changed_needs_a_stream() {
    assert_eq!(
        exception_kind(changed(n(1.0))),
        ExceptionKind::ExpectedStream
    );
}
