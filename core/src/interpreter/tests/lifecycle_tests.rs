//! Tests for the evaluator lifecycle: start, step, stop, observers, borrowing

use super::helpers::*;
use crate::interpreter::{
    EngineError, Evaluator, ExceptionKind, Expr, Program, RunState, Step, UpdateCause, Val,
};
use std::cell::RefCell;
use std::rc::Rc;

fn counter() -> Expr {
    reaction(n(1.0), changed(time()), bin(previous(), "+", n(1.0)))
}

#[test]
fn test_step_before_start() {
    let mut evaluator = Evaluator::new(Program::new(&n(1.0)));

    assert_eq!(evaluator.step().unwrap_err(), EngineError::NotStarted);
    assert_eq!(evaluator.state(), &RunState::Idle);
}

#[test]
fn test_stop_is_idempotent() {
    let mut evaluator = Evaluator::new(Program::new(&counter()));
    evaluator.stop();
    evaluator.stop();
    assert_eq!(evaluator.state(), &RunState::Idle);

    evaluator.run().unwrap();
    assert_eq!(evaluator.subscription_count(), 1);

    evaluator.stop();
    evaluator.stop();
    assert_eq!(evaluator.state(), &RunState::Stopped);
    assert_eq!(evaluator.subscription_count(), 0);
    assert_eq!(evaluator.step().unwrap_err(), EngineError::NotStarted);
}

#[test]
fn test_restart_discards_previous_run() {
    let mut evaluator = started(counter());
    evaluator.push("Time", Val::measure(1.0, "ms")).unwrap();
    evaluator.flush().unwrap();
    assert_eq!(latest(&evaluator), "2");

    evaluator.stop();
    evaluator.run().unwrap();

    assert_eq!(latest(&evaluator), "1");
    assert_eq!(evaluator.update_count(reactions_of(&evaluator)[0]), 0);
    assert_eq!(evaluator.subscription_count(), 1);
}

/// `ƒ twice(x) x·2`, `r: 1 … ∆ Time() … twice(.)`, then `r`
fn doubling() -> Expr {
    block(vec![
        func(Some("twice"), &["x"], bin(name("x"), "·", n(2.0))),
        bind(
            "r",
            reaction(n(1.0), changed(time()), call(name("twice"), vec![previous()])),
        ),
        name("r"),
    ])
}

#[test]
fn test_stop_frees_run_scopes() {
    let mut evaluator = started(doubling());
    evaluator.push("Time", Val::measure(1.0, "ms")).unwrap();
    evaluator.flush().unwrap();
    assert_eq!(latest(&evaluator), "2");
    assert!(evaluator.live_scopes() > 0);

    evaluator.stop();

    assert_eq!(evaluator.live_scopes(), 0);
}

#[test]
fn test_restart_frees_previous_scopes() {
    let mut evaluator = started(doubling());
    let first = evaluator.live_scopes();

    evaluator.start().unwrap();
    evaluator.run().unwrap();

    assert_eq!(evaluator.live_scopes(), first);
}

#[test]
fn test_flushes_do_not_accumulate_scopes() {
    let mut evaluator = started(doubling());
    for ms in 1..=3 {
        evaluator.push("Time", Val::measure(f64::from(ms), "ms")).unwrap();
        evaluator.flush().unwrap();
    }
    let settled = evaluator.live_scopes();

    for ms in 4..=20 {
        evaluator.push("Time", Val::measure(f64::from(ms), "ms")).unwrap();
        evaluator.flush().unwrap();
    }

    assert_eq!(latest(&evaluator), "1048576");
    assert_eq!(evaluator.live_scopes(), settled);
}

#[test]
fn test_run_for_yields_on_budget() {
    let mut evaluator = Evaluator::new(Program::new(&bin(n(1.0), "+", n(1.0))));
    evaluator.start().unwrap();

    assert_eq!(evaluator.run_for(2).unwrap(), Step::Yield);
    assert_eq!(evaluator.state(), &RunState::Running);
    assert!(evaluator.latest_result().is_none());

    assert_eq!(evaluator.run_for(100).unwrap(), Step::Done);
    assert_eq!(latest(&evaluator), "2");
    assert_eq!(evaluator.run_for(1).unwrap(), Step::Done);
}

#[test]
fn test_observers_see_steps_flushes_and_stop() {
    let causes: Rc<RefCell<Vec<UpdateCause>>> = Rc::new(RefCell::new(Vec::new()));
    let seen = causes.clone();

    let mut evaluator = Evaluator::new(Program::new(&counter()));
    let id = evaluator.observe(move |update| seen.borrow_mut().push(update.cause));

    evaluator.run().unwrap();
    assert!(!causes.borrow().is_empty());
    assert!(causes.borrow().iter().all(|c| *c == UpdateCause::Stepped));

    causes.borrow_mut().clear();
    evaluator.push("Time", Val::measure(1.0, "ms")).unwrap();
    evaluator.flush().unwrap();
    evaluator.stop();
    assert_eq!(
        *causes.borrow(),
        vec![UpdateCause::Flushed, UpdateCause::Stopped]
    );

    assert!(evaluator.ignore(id));
    assert!(!evaluator.ignore(id));
    causes.borrow_mut().clear();
    evaluator.run().unwrap();
    assert!(causes.borrow().is_empty());
}

#[test]
fn test_observer_receives_latest_value() {
    let results: Rc<RefCell<Vec<Option<String>>>> = Rc::new(RefCell::new(Vec::new()));
    let seen = results.clone();

    let mut evaluator = Evaluator::new(Program::new(&counter()));
    evaluator.observe(move |update| {
        if update.cause == UpdateCause::Flushed {
            seen.borrow_mut()
                .push(update.result.as_ref().map(|v| v.to_string()));
        }
    });
    evaluator.run().unwrap();
    evaluator.push("Time", Val::measure(1.0, "ms")).unwrap();
    evaluator.flush().unwrap();

    assert_eq!(*results.borrow(), vec![Some("2".to_string())]);
}

#[test]
fn test_borrowed_source() {
    let main = bin(borrow("sup1"), "+", n(1.0));
    let mut evaluator = Evaluator::with_sources(&main, &[("sup1", n(41.0))]);

    assert_eq!(evaluator.run().unwrap(), Val::num(42.0));
    assert_eq!(evaluator.latest_source_result("sup1"), Some(&Val::num(41.0)));
    assert_eq!(evaluator.latest_source_result("main"), Some(&Val::num(42.0)));
}

#[test]
fn test_borrowed_name_is_bound() {
    let main = block(vec![borrow("answer"), bin(name("answer"), "·", n(2.0))]);
    let mut evaluator = Evaluator::with_sources(&main, &[("answer", n(21.0))]);

    assert_eq!(evaluator.run().unwrap(), Val::num(42.0));
}

#[test]
fn test_cyclic_borrow() {
    let mut evaluator = Evaluator::with_sources(
        &borrow("a"),
        &[("a", borrow("b")), ("b", borrow("a"))],
    );
    let value = evaluator.run().unwrap();

    let Val::Exception(e) = value else {
        unreachable!("Expected an exception, got {value}");
    };
    assert_eq!(e.kind, ExceptionKind::CyclicBorrow { name: "a".into() });

    let mut evaluator = Evaluator::with_sources(&borrow("main"), &[]);
    assert!(matches!(
        evaluator.run().unwrap(),
        Val::Exception(e) if e.kind == ExceptionKind::CyclicBorrow { name: "main".into() }
    ));
}

#[test]
fn test_unknown_source() {
    assert_eq!(
        exception_kind(borrow("nowhere")),
        ExceptionKind::UnknownSource {
            name: "nowhere".into()
        }
    );
}
