//! Text natives

use super::{count, NativeCall, NativeStructure};
use crate::interpreter::errors::ExceptionKind;
use crate::interpreter::types::{NodeId, Val, ValueKind};

/// Largest text `repeat` will build
const MAX_TEXT_BYTES: usize = 1 << 24;

pub(super) fn structure() -> NativeStructure {
    NativeStructure::new(ValueKind::Text)
        .function("+", 1, combine)
        .function("combine", 1, combine)
        .function("length", 0, length)
        .function("repeat", 1, repeat)
        .function("segment", 1, segment)
        .function("has", 1, has)
        .conversion(convert)
}

fn receiver<'c>(call: &'c NativeCall<'_>) -> Result<&'c str, Val> {
    match &call.receiver {
        Val::Text(t) => Ok(t),
        other => Err(call.mismatch("Text", other)),
    }
}

fn operands<'c>(call: &'c NativeCall<'_>) -> Result<(&'c str, &'c str), Val> {
    let text = receiver(call)?;
    match call.arg(0) {
        Val::Text(other) => Ok((text, other)),
        other => Err(call.mismatch("Text", other)),
    }
}

fn combine(call: &mut NativeCall<'_>) -> Val {
    match operands(call) {
        Ok((a, b)) => Val::text(format!("{a}{b}")),
        Err(e) => e,
    }
}

fn length(call: &mut NativeCall<'_>) -> Val {
    match receiver(call) {
        Ok(text) => Val::num(text.chars().count() as f64),
        Err(e) => e,
    }
}

fn repeat(call: &mut NativeCall<'_>) -> Val {
    let text = match receiver(call) {
        Ok(text) => text,
        Err(e) => return e,
    };
    let n = match count(call, call.arg(0)) {
        Ok(n) => n,
        Err(e) => return e,
    };
    match text.len().checked_mul(n) {
        Some(len) if len <= MAX_TEXT_BYTES => Val::text(text.repeat(n)),
        _ => call.exception(ExceptionKind::TextTooLong {
            limit: MAX_TEXT_BYTES,
        }),
    }
}

/// Split on a delimiter; an empty delimiter splits into characters
fn segment(call: &mut NativeCall<'_>) -> Val {
    match operands(call) {
        Ok((text, "")) => Val::List(text.chars().map(|c| Val::text(c.to_string())).collect()),
        Ok((text, delimiter)) => Val::List(text.split(delimiter).map(Val::text).collect()),
        Err(e) => e,
    }
}

fn has(call: &mut NativeCall<'_>) -> Val {
    match operands(call) {
        Ok((text, part)) => Val::Bool(text.contains(part)),
        Err(e) => e,
    }
}

/// `Text(5)` renders any value canonically; text converts to itself
fn convert(value: &Val, _node: NodeId) -> Val {
    match value {
        Val::Text(_) => value.clone(),
        other => Val::text(other.to_string()),
    }
}
