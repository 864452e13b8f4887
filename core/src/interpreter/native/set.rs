//! Set natives

use super::{NativeCall, NativeStructure};
use crate::interpreter::errors::ExceptionKind;
use crate::interpreter::types::{NodeId, Val, ValueKind};

pub(super) fn structure() -> NativeStructure {
    NativeStructure::new(ValueKind::Set)
        .function("size", 0, size)
        .function("has", 1, has)
        .function("add", 1, add)
        .function("remove", 1, remove)
        .function("union", 1, union)
        .function("filter", 1, filter)
        .conversion(convert)
}

fn members(call: &NativeCall<'_>) -> Result<Vec<Val>, Val> {
    match &call.receiver {
        Val::Set(items) => Ok(items.clone()),
        other => Err(call.mismatch("Set", other)),
    }
}

fn size(call: &mut NativeCall<'_>) -> Val {
    members(call).map_or_else(|e| e, |m| Val::num(m.len() as f64))
}

fn has(call: &mut NativeCall<'_>) -> Val {
    members(call).map_or_else(|e| e, |m| Val::Bool(m.contains(call.arg(0))))
}

fn add(call: &mut NativeCall<'_>) -> Val {
    members(call).map_or_else(
        |e| e,
        |m| Val::set(m.into_iter().chain([call.arg(0).clone()])),
    )
}

fn remove(call: &mut NativeCall<'_>) -> Val {
    members(call).map_or_else(
        |e| e,
        |m| Val::Set(m.into_iter().filter(|v| v != call.arg(0)).collect()),
    )
}

fn union(call: &mut NativeCall<'_>) -> Val {
    let mine = match members(call) {
        Ok(m) => m,
        Err(e) => return e,
    };
    match call.arg(0) {
        Val::Set(theirs) => Val::set(mine.into_iter().chain(theirs.iter().cloned())),
        other => call.mismatch("Set", other),
    }
}

fn filter(call: &mut NativeCall<'_>) -> Val {
    let members = match members(call) {
        Ok(m) => m,
        Err(e) => return e,
    };
    let function = call.arg(0).clone();
    let mut kept = Vec::new();
    for member in members {
        match call.predicate(&function, vec![member.clone()]) {
            Ok(true) => kept.push(member),
            Ok(false) => {}
            Err(e) => return e,
        }
    }
    Val::Set(kept)
}

/// `Set([1 1 2])` drops duplicates
fn convert(value: &Val, node: NodeId) -> Val {
    match value {
        Val::Set(_) => value.clone(),
        Val::List(items) => Val::set(items.iter().cloned()),
        other => Val::exception(
            ExceptionKind::TypeMismatch {
                expected: "Set".into(),
                received: other.to_string(),
            },
            Some(node),
        ),
    }
}
