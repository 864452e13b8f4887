//! List natives
//!
//! Lists are indexed from 1. Higher-order functions call back into the
//! engine through `NativeCall::apply`.

use super::{translate_each, NativeCall, NativeStructure};
use crate::interpreter::errors::ExceptionKind;
use crate::interpreter::types::{NodeId, Val, ValueKind};

pub(super) fn structure() -> NativeStructure {
    NativeStructure::new(ValueKind::List)
        .function("length", 0, length)
        .function("first", 0, first)
        .function("last", 0, last)
        .function("has", 1, has)
        .function("add", 1, add)
        .function("at", 1, at)
        .function("reverse", 0, reverse)
        .function("sans", 1, sans)
        .function("translate", 1, translate)
        .function("filter", 1, filter)
        .function("all", 1, all)
        .function("combine", 2, combine)
        .conversion(convert)
}

fn items(call: &NativeCall<'_>) -> Result<Vec<Val>, Val> {
    match &call.receiver {
        Val::List(items) => Ok(items.clone()),
        other => Err(call.mismatch("List", other)),
    }
}

fn out_of_bounds(call: &NativeCall<'_>, index: String, length: usize) -> Val {
    call.exception(ExceptionKind::IndexOutOfBounds { index, length })
}

fn length(call: &mut NativeCall<'_>) -> Val {
    items(call).map_or_else(|e| e, |items| Val::num(items.len() as f64))
}

fn first(call: &mut NativeCall<'_>) -> Val {
    match items(call) {
        Ok(items) => match items.first() {
            Some(item) => item.clone(),
            None => out_of_bounds(call, "1".into(), 0),
        },
        Err(e) => e,
    }
}

fn last(call: &mut NativeCall<'_>) -> Val {
    match items(call) {
        Ok(items) => match items.last() {
            Some(item) => item.clone(),
            None => out_of_bounds(call, "-1".into(), 0),
        },
        Err(e) => e,
    }
}

fn has(call: &mut NativeCall<'_>) -> Val {
    items(call).map_or_else(|e| e, |items| Val::Bool(items.contains(call.arg(0))))
}

fn add(call: &mut NativeCall<'_>) -> Val {
    match items(call) {
        Ok(mut items) => {
            items.push(call.arg(0).clone());
            Val::List(items)
        }
        Err(e) => e,
    }
}

fn at(call: &mut NativeCall<'_>) -> Val {
    let items = match items(call) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let index = match call.arg(0) {
        Val::Num(n) if n.unit.is_unitless() && n.value.fract() == 0.0 => n.value,
        other => return call.mismatch("whole Number", other),
    };
    if index < 1.0 || index > items.len() as f64 {
        return out_of_bounds(call, call.arg(0).to_string(), items.len());
    }
    items[index as usize - 1].clone()
}

fn reverse(call: &mut NativeCall<'_>) -> Val {
    match items(call) {
        Ok(mut items) => {
            items.reverse();
            Val::List(items)
        }
        Err(e) => e,
    }
}

fn sans(call: &mut NativeCall<'_>) -> Val {
    match items(call) {
        Ok(items) => Val::List(items.into_iter().filter(|i| i != call.arg(0)).collect()),
        Err(e) => e,
    }
}

fn translate(call: &mut NativeCall<'_>) -> Val {
    let items = match items(call) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let function = call.arg(0).clone();
    let args = items.into_iter().map(|item| vec![item]).collect();
    translate_each(call, &function, args).map_or_else(|e| e, Val::List)
}

fn filter(call: &mut NativeCall<'_>) -> Val {
    let items = match items(call) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let function = call.arg(0).clone();
    let mut kept = Vec::new();
    for item in items {
        match call.predicate(&function, vec![item.clone()]) {
            Ok(true) => kept.push(item),
            Ok(false) => {}
            Err(e) => return e,
        }
    }
    Val::List(kept)
}

fn all(call: &mut NativeCall<'_>) -> Val {
    let items = match items(call) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let function = call.arg(0).clone();
    for item in items {
        match call.predicate(&function, vec![item]) {
            Ok(true) => {}
            Ok(false) => return Val::Bool(false),
            Err(e) => return e,
        }
    }
    Val::Bool(true)
}

/// Fold from an initial value: `list.combine(0 ƒ(sum item) sum + item)`
fn combine(call: &mut NativeCall<'_>) -> Val {
    let items = match items(call) {
        Ok(items) => items,
        Err(e) => return e,
    };
    let mut acc = call.arg(0).clone();
    let function = call.arg(1).clone();
    for item in items {
        acc = call.apply(&function, vec![acc, item]);
        if acc.is_exception() {
            return acc;
        }
    }
    acc
}

/// `List({1 2})`, `List({1:2})` gives the map's values
fn convert(value: &Val, node: NodeId) -> Val {
    match value {
        Val::List(_) => value.clone(),
        Val::Set(items) => Val::List(items.clone()),
        Val::Map(pairs) => Val::List(pairs.iter().map(|(_, v)| v.clone()).collect()),
        other => Val::exception(
            ExceptionKind::TypeMismatch {
                expected: "List".into(),
                received: other.to_string(),
            },
            Some(node),
        ),
    }
}
