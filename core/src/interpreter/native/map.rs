//! Map natives
//!
//! Functions passed to `filter` and `translate` receive the key and the value.

use super::{translate_each, NativeCall, NativeStructure};
use crate::interpreter::errors::ExceptionKind;
use crate::interpreter::types::{NodeId, Val, ValueKind};

pub(super) fn structure() -> NativeStructure {
    NativeStructure::new(ValueKind::Map)
        .function("size", 0, size)
        .function("has", 1, has)
        .function("get", 1, get)
        .function("set", 2, set)
        .function("unset", 1, unset)
        .function("remove", 1, remove)
        .function("filter", 1, filter)
        .function("translate", 1, translate)
        .function("keys", 0, keys)
        .function("values", 0, values)
        .conversion(convert)
}

fn entries(call: &NativeCall<'_>) -> Result<Vec<(Val, Val)>, Val> {
    match &call.receiver {
        Val::Map(pairs) => Ok(pairs.clone()),
        other => Err(call.mismatch("Map", other)),
    }
}

fn size(call: &mut NativeCall<'_>) -> Val {
    entries(call).map_or_else(|e| e, |p| Val::num(p.len() as f64))
}

fn has(call: &mut NativeCall<'_>) -> Val {
    entries(call).map_or_else(|e| e, |p| Val::Bool(p.iter().any(|(k, _)| k == call.arg(0))))
}

fn get(call: &mut NativeCall<'_>) -> Val {
    let pairs = match entries(call) {
        Ok(p) => p,
        Err(e) => return e,
    };
    match pairs.into_iter().find(|(k, _)| k == call.arg(0)) {
        Some((_, value)) => value,
        None => call.exception(ExceptionKind::MissingKey {
            key: call.arg(0).to_string(),
        }),
    }
}

fn set(call: &mut NativeCall<'_>) -> Val {
    entries(call).map_or_else(
        |e| e,
        |p| Val::map(p.into_iter().chain([(call.arg(0).clone(), call.arg(1).clone())])),
    )
}

/// Remove the entry with this key
fn unset(call: &mut NativeCall<'_>) -> Val {
    entries(call).map_or_else(
        |e| e,
        |p| Val::Map(p.into_iter().filter(|(k, _)| k != call.arg(0)).collect()),
    )
}

/// Remove every entry with this value
fn remove(call: &mut NativeCall<'_>) -> Val {
    entries(call).map_or_else(
        |e| e,
        |p| Val::Map(p.into_iter().filter(|(_, v)| v != call.arg(0)).collect()),
    )
}

fn filter(call: &mut NativeCall<'_>) -> Val {
    let pairs = match entries(call) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let function = call.arg(0).clone();
    let mut kept = Vec::new();
    for (key, value) in pairs {
        match call.predicate(&function, vec![key.clone(), value.clone()]) {
            Ok(true) => kept.push((key, value)),
            Ok(false) => {}
            Err(e) => return e,
        }
    }
    Val::Map(kept)
}

/// Replace each value with `function(key value)`
fn translate(call: &mut NativeCall<'_>) -> Val {
    let pairs = match entries(call) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let function = call.arg(0).clone();
    let keys: Vec<Val> = pairs.iter().map(|(k, _)| k.clone()).collect();
    let args = pairs.into_iter().map(|(k, v)| vec![k, v]).collect();
    match translate_each(call, &function, args) {
        Ok(values) => Val::Map(keys.into_iter().zip(values).collect()),
        Err(e) => e,
    }
}

fn keys(call: &mut NativeCall<'_>) -> Val {
    entries(call).map_or_else(|e| e, |p| Val::Set(p.into_iter().map(|(k, _)| k).collect()))
}

fn values(call: &mut NativeCall<'_>) -> Val {
    entries(call).map_or_else(|e| e, |p| Val::List(p.into_iter().map(|(_, v)| v).collect()))
}

/// `Map([[1 2] [3 4]])` pairs up two-item lists
fn convert(value: &Val, node: NodeId) -> Val {
    let mismatch = || {
        Val::exception(
            ExceptionKind::TypeMismatch {
                expected: "Map".into(),
                received: value.to_string(),
            },
            Some(node),
        )
    };
    match value {
        Val::Map(_) => value.clone(),
        Val::List(items) => {
            let mut pairs = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Val::List(pair) if pair.len() == 2 => pairs.push((pair[0].clone(), pair[1].clone())),
                    _ => return mismatch(),
                }
            }
            Val::map(pairs)
        }
        _ => mismatch(),
    }
}
