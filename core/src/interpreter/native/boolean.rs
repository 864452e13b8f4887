//! Boolean natives

use super::{NativeCall, NativeStructure};
use crate::interpreter::types::{Val, ValueKind};

pub(super) fn structure() -> NativeStructure {
    NativeStructure::new(ValueKind::Boolean)
        .function("&", 1, and)
        .function("|", 1, or)
        .function("~", 0, not)
}

fn operands(call: &NativeCall<'_>) -> Result<(bool, bool), Val> {
    match (&call.receiver, call.arg(0)) {
        (Val::Bool(a), Val::Bool(b)) => Ok((*a, *b)),
        (Val::Bool(_), other) => Err(call.mismatch("Boolean", other)),
        (other, _) => Err(call.mismatch("Boolean", other)),
    }
}

fn and(call: &mut NativeCall<'_>) -> Val {
    operands(call).map_or_else(|e| e, |(a, b)| Val::Bool(a && b))
}

fn or(call: &mut NativeCall<'_>) -> Val {
    operands(call).map_or_else(|e| e, |(a, b)| Val::Bool(a || b))
}

fn not(call: &mut NativeCall<'_>) -> Val {
    match &call.receiver {
        Val::Bool(b) => Val::Bool(!b),
        other => call.mismatch("Boolean", other),
    }
}
