//! Test helpers for interpreter tests
//!
//! Short constructors for syntax trees, so tests read close to the surface
//! language (`bin(n(1.0), "+", n(1.0))` for `1 + 1`).

#![allow(dead_code)]

use crate::interpreter::types::ast::MapEntry;
use crate::interpreter::types::TypeTag;
use crate::interpreter::{Evaluator, ExceptionKind, Expr, NodeId, Program, Val};

pub fn b(v: bool) -> Expr {
    Expr::Bool { v }
}

pub fn n(v: f64) -> Expr {
    Expr::Num { v, unit: None }
}

/// A number with a unit, e.g. `m(500.0, "ms")`
pub fn m(v: f64, unit: &str) -> Expr {
    Expr::Num {
        v,
        unit: Some(unit.to_string()),
    }
}

pub fn t(v: &str) -> Expr {
    Expr::Text { v: v.to_string() }
}

pub fn name(name: &str) -> Expr {
    Expr::Name {
        name: name.to_string(),
    }
}

pub fn previous() -> Expr {
    Expr::Previous
}

pub fn list(items: Vec<Expr>) -> Expr {
    Expr::List { items }
}

pub fn set(items: Vec<Expr>) -> Expr {
    Expr::Set { items }
}

pub fn map(entries: Vec<(Expr, Expr)>) -> Expr {
    Expr::Map {
        entries: entries
            .into_iter()
            .map(|(key, value)| MapEntry { key, value })
            .collect(),
    }
}

pub fn block(statements: Vec<Expr>) -> Expr {
    Expr::Block { statements }
}

pub fn bind(name: &str, value: Expr) -> Expr {
    Expr::Bind {
        name: name.to_string(),
        value: Box::new(value),
    }
}

pub fn func(name: Option<&str>, params: &[&str], body: Expr) -> Expr {
    Expr::Function {
        name: name.map(str::to_string),
        params: params.iter().map(|p| p.to_string()).collect(),
        body: Box::new(body),
    }
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args,
    }
}

/// `subject.name(args)`
pub fn method(subject: Expr, name: &str, args: Vec<Expr>) -> Expr {
    call(access(subject, name), args)
}

pub fn bin(left: Expr, op: &str, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op: op.to_string(),
        right: Box::new(right),
    }
}

pub fn un(op: &str, operand: Expr) -> Expr {
    Expr::Unary {
        op: op.to_string(),
        operand: Box::new(operand),
    }
}

pub fn cond(condition: Expr, yes: Expr, no: Expr) -> Expr {
    Expr::Conditional {
        condition: Box::new(condition),
        yes: Box::new(yes),
        no: Box::new(no),
    }
}

pub fn access(subject: Expr, name: &str) -> Expr {
    Expr::Access {
        subject: Box::new(subject),
        name: name.to_string(),
    }
}

pub fn is(operand: Expr, tag: TypeTag) -> Expr {
    Expr::Is {
        operand: Box::new(operand),
        tag,
    }
}

pub fn stream(name: &str) -> Expr {
    Expr::Stream {
        name: name.to_string(),
    }
}

/// `Time()`
pub fn time() -> Expr {
    stream("Time")
}

pub fn changed(stream: Expr) -> Expr {
    Expr::Changed {
        stream: Box::new(stream),
    }
}

/// `initial … condition … next`
pub fn reaction(initial: Expr, condition: Expr, next: Expr) -> Expr {
    Expr::Reaction {
        initial: Box::new(initial),
        condition: Box::new(condition),
        next: Box::new(next),
    }
}

/// `↓ source`
pub fn borrow(source: &str) -> Expr {
    Expr::Borrow {
        source: source.to_string(),
        name: None,
    }
}

/* ===================== Running ===================== */

/// Evaluate a program to completion
pub fn eval(expr: Expr) -> Val {
    Evaluator::evaluate(&expr).expect("Evaluation failed")
}

/// Canonical rendering of a program's value
pub fn render(expr: Expr) -> String {
    eval(expr).to_string()
}

/// Kind of the exception a program evaluates to
pub fn exception_kind(expr: Expr) -> ExceptionKind {
    let value = eval(expr);
    let Val::Exception(e) = value else {
        unreachable!("Expected an exception, got {value}");
    };
    e.kind
}

/// Start and run an evaluator over a program
pub fn started(expr: Expr) -> Evaluator {
    let mut evaluator = Evaluator::new(Program::new(&expr));
    evaluator.run().expect("Run failed");
    evaluator
}

/// Rendering of the evaluator's latest result
pub fn latest(evaluator: &Evaluator) -> String {
    evaluator
        .latest_result()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(none)".to_string())
}

/// Reaction nodes of the main program, in arena order
pub fn reactions_of(evaluator: &Evaluator) -> Vec<NodeId> {
    evaluator.program().reactions()
}
