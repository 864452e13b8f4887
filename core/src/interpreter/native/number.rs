//! Number natives
//!
//! Addition, subtraction, and comparison need equal units. Multiplication,
//! division, and powers combine them.

use super::{NativeCall, NativeStructure};
use crate::interpreter::errors::ExceptionKind;
use crate::interpreter::types::{Datum, NodeId, Number, Unit, Val, ValueKind};

pub(super) fn structure() -> NativeStructure {
    NativeStructure::new(ValueKind::Number)
        .function("+", 1, add)
        .function("-", 1, subtract)
        .function("-", 0, negate)
        .function("·", 1, multiply)
        .function("÷", 1, divide)
        .function("%", 1, remainder)
        .function("^", 1, power)
        .function("<", 1, less)
        .function(">", 1, greater)
        .function("≤", 1, at_most)
        .function("≥", 1, at_least)
        .function("roundDown", 0, round_down)
        .function("roundUp", 0, round_up)
        .function("abs", 0, abs)
        .conversion(convert)
}

fn operands(call: &NativeCall<'_>) -> Result<(Number, Number), Val> {
    match (&call.receiver, call.arg(0)) {
        (Val::Num(a), Val::Num(b)) => Ok((a.clone(), b.clone())),
        (Val::Num(_), other) => Err(call.mismatch("Number", other)),
        (other, _) => Err(call.mismatch("Number", other)),
    }
}

/// Operands whose units must agree
fn matching(call: &NativeCall<'_>) -> Result<(Number, Number), Val> {
    let (a, b) = operands(call)?;
    if a.unit != b.unit {
        return Err(call.exception(ExceptionKind::IncompatibleUnits {
            left: a.unit.to_string(),
            right: b.unit.to_string(),
        }));
    }
    Ok((a, b))
}

fn receiver(call: &NativeCall<'_>) -> Result<Number, Val> {
    match &call.receiver {
        Val::Num(n) => Ok(n.clone()),
        other => Err(call.mismatch("Number", other)),
    }
}

fn arithmetic(call: &NativeCall<'_>, f: impl Fn(f64, f64) -> f64) -> Val {
    match matching(call) {
        Ok((a, b)) => Val::Num(Number::new(f(a.value, b.value), a.unit)),
        Err(e) => e,
    }
}

fn compare(call: &NativeCall<'_>, f: impl Fn(f64, f64) -> bool) -> Val {
    match matching(call) {
        Ok((a, b)) => Val::Bool(f(a.value, b.value)),
        Err(e) => e,
    }
}

fn unary(call: &NativeCall<'_>, f: impl Fn(f64) -> f64) -> Val {
    match receiver(call) {
        Ok(n) => Val::Num(Number::new(f(n.value), n.unit)),
        Err(e) => e,
    }
}

fn add(call: &mut NativeCall<'_>) -> Val {
    arithmetic(call, |a, b| a + b)
}

fn subtract(call: &mut NativeCall<'_>) -> Val {
    arithmetic(call, |a, b| a - b)
}

fn negate(call: &mut NativeCall<'_>) -> Val {
    unary(call, |a| -a)
}

fn multiply(call: &mut NativeCall<'_>) -> Val {
    match operands(call) {
        Ok((a, b)) => Val::Num(Number::new(a.value * b.value, a.unit.product(&b.unit))),
        Err(e) => e,
    }
}

fn divide(call: &mut NativeCall<'_>) -> Val {
    match operands(call) {
        Ok((_, b)) if b.value == 0.0 => call.exception(ExceptionKind::DivisionByZero),
        Ok((a, b)) => Val::Num(Number::new(a.value / b.value, a.unit.quotient(&b.unit))),
        Err(e) => e,
    }
}

fn remainder(call: &mut NativeCall<'_>) -> Val {
    match matching(call) {
        Ok((_, b)) if b.value == 0.0 => call.exception(ExceptionKind::DivisionByZero),
        Ok((a, b)) => Val::Num(Number::new(a.value % b.value, a.unit)),
        Err(e) => e,
    }
}

fn power(call: &mut NativeCall<'_>) -> Val {
    let (a, b) = match operands(call) {
        Ok(pair) => pair,
        Err(e) => return e,
    };
    if !b.unit.is_unitless() {
        return call.mismatch("unitless Number", call.arg(0));
    }
    let whole = b.value.fract() == 0.0
        && b.value >= f64::from(i32::MIN)
        && b.value <= f64::from(i32::MAX);
    let unit = if a.unit.is_unitless() {
        Some(Unit::none())
    } else if whole {
        a.unit.power(b.value as i32)
    } else {
        None
    };
    let Some(unit) = unit else {
        return call.exception(ExceptionKind::IncompatibleUnits {
            left: a.unit.to_string(),
            right: b.to_string(),
        });
    };
    Val::Num(Number::new(a.value.powf(b.value), unit))
}

fn less(call: &mut NativeCall<'_>) -> Val {
    compare(call, |a, b| a < b)
}

fn greater(call: &mut NativeCall<'_>) -> Val {
    compare(call, |a, b| a > b)
}

fn at_most(call: &mut NativeCall<'_>) -> Val {
    compare(call, |a, b| a <= b)
}

fn at_least(call: &mut NativeCall<'_>) -> Val {
    compare(call, |a, b| a >= b)
}

fn round_down(call: &mut NativeCall<'_>) -> Val {
    unary(call, f64::floor)
}

fn round_up(call: &mut NativeCall<'_>) -> Val {
    unary(call, f64::ceil)
}

fn abs(call: &mut NativeCall<'_>) -> Val {
    unary(call, f64::abs)
}

/// `Number("5ms")`, `Number(⊤)`
fn convert(value: &Val, node: NodeId) -> Val {
    match value {
        Val::Num(_) => value.clone(),
        Val::Bool(b) => Val::num(if *b { 1.0 } else { 0.0 }),
        Val::Text(text) => match Datum::parse_literal(text) {
            number @ Datum::Num { .. } => Val::from(number),
            _ => Val::exception(
                ExceptionKind::TypeMismatch {
                    expected: "Number".into(),
                    received: value.to_string(),
                },
                Some(node),
            ),
        },
        other => Val::exception(
            ExceptionKind::TypeMismatch {
                expected: "Number".into(),
                received: other.to_string(),
            },
            Some(node),
        ),
    }
}
