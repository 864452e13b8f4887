//! Native dispatch bridge
//!
//! Operations on built-in values are implemented in Rust and looked up by
//! receiver kind, name, and arity. The catalogue is built once per process
//! and never changes afterwards. It also answers which native structure a
//! name refers to (`Text`, `Number`, ...), which is all the type context the
//! engine needs.
//!
//! Natives never mutate their inputs and never fail out of band: every
//! mismatch is an exception value.

mod boolean;
mod list;
mod map;
mod number;
mod set;
mod text;

use super::errors::ExceptionKind;
use super::types::{NodeId, Val, ValueKind};
use std::fmt;
use std::sync::OnceLock;

/// Global catalogue, built on first use
static CATALOGUE: OnceLock<Catalogue> = OnceLock::new();

pub fn catalogue() -> &'static Catalogue {
    CATALOGUE.get_or_init(Catalogue::build)
}

/* ===================== Engine Handle ===================== */

/// Handle back into the engine, for natives that call functions
pub trait Engine {
    /// Apply a function value to arguments and run it to completion
    fn apply(&mut self, function: &Val, args: Vec<Val>, node: NodeId) -> Val;
}

/// One native invocation
pub struct NativeCall<'a> {
    /// Expression that made the call
    pub node: NodeId,
    pub receiver: Val,
    pub args: Vec<Val>,
    engine: &'a mut dyn Engine,
}

impl<'a> NativeCall<'a> {
    pub fn new(node: NodeId, receiver: Val, args: Vec<Val>, engine: &'a mut dyn Engine) -> Self {
        NativeCall {
            node,
            receiver,
            args,
            engine,
        }
    }

    /// Argument `index`. Arity is checked before dispatch.
    pub fn arg(&self, index: usize) -> &Val {
        &self.args[index]
    }

    pub fn apply(&mut self, function: &Val, args: Vec<Val>) -> Val {
        self.engine.apply(function, args, self.node)
    }

    pub fn exception(&self, kind: ExceptionKind) -> Val {
        Val::exception(kind, Some(self.node))
    }

    pub fn mismatch(&self, expected: &str, received: &Val) -> Val {
        self.exception(ExceptionKind::TypeMismatch {
            expected: expected.to_string(),
            received: received.to_string(),
        })
    }

    /// Apply `function` and require a Boolean answer
    pub fn predicate(&mut self, function: &Val, args: Vec<Val>) -> Result<bool, Val> {
        match self.apply(function, args) {
            Val::Bool(b) => Ok(b),
            e @ Val::Exception(_) => Err(e),
            other => Err(self.mismatch("Boolean", &other)),
        }
    }
}

/* ===================== Catalogue ===================== */

pub type NativeFn = fn(&mut NativeCall<'_>) -> Val;

/// Conversion applied when a native structure's name is called
pub type Conversion = fn(&Val, NodeId) -> Val;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub call: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

#[derive(Clone)]
pub struct NativeStructure {
    pub kind: ValueKind,
    pub functions: Vec<NativeFunction>,
    pub conversion: Option<Conversion>,
}

impl fmt::Debug for NativeStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeStructure")
            .field("kind", &self.kind)
            .field("functions", &self.functions)
            .field("conversion", &self.conversion.is_some())
            .finish()
    }
}

impl NativeStructure {
    /// Every structure supports equality
    fn new(kind: ValueKind) -> Self {
        NativeStructure {
            kind,
            functions: Vec::new(),
            conversion: None,
        }
        .function("=", 1, equal)
        .function("≠", 1, not_equal)
    }

    fn function(mut self, name: &'static str, arity: usize, call: NativeFn) -> Self {
        self.functions.push(NativeFunction { name, arity, call });
        self
    }

    fn conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = Some(conversion);
        self
    }
}

#[derive(Debug)]
pub struct Catalogue {
    structures: Vec<NativeStructure>,
}

impl Catalogue {
    fn build() -> Self {
        Catalogue {
            structures: vec![
                boolean::structure(),
                number::structure(),
                text::structure(),
                list::structure(),
                set::structure(),
                map::structure(),
                NativeStructure::new(ValueKind::Structure),
                NativeStructure::new(ValueKind::Function),
                NativeStructure::new(ValueKind::Exception),
            ],
        }
    }

    /// Resolve a native structure by name
    pub fn structure(&self, name: &str) -> Option<&NativeStructure> {
        let kind = ValueKind::from_name(name)?;
        self.of(kind)
    }

    pub fn of(&self, kind: ValueKind) -> Option<&NativeStructure> {
        self.structures.iter().find(|s| s.kind == kind)
    }

    /// Locate a function by receiver kind, name, and arity
    pub fn lookup(
        &self,
        kind: ValueKind,
        name: &str,
        arity: usize,
    ) -> Result<&NativeFunction, ExceptionKind> {
        let unknown = || ExceptionKind::UnknownFunction {
            kind: kind.to_string(),
            name: name.to_string(),
        };
        let structure = self.of(kind).ok_or_else(unknown)?;
        let mut named = structure.functions.iter().filter(|f| f.name == name).peekable();
        let first = named.peek().map(|f| f.arity).ok_or_else(unknown)?;
        named
            .find(|f| f.arity == arity)
            .ok_or(ExceptionKind::ArityMismatch {
                expected: first,
                received: arity,
            })
    }

    pub fn has_function(&self, kind: ValueKind, name: &str) -> bool {
        self.of(kind)
            .is_some_and(|s| s.functions.iter().any(|f| f.name == name))
    }
}

/* ===================== Shared Natives ===================== */

fn equal(call: &mut NativeCall<'_>) -> Val {
    Val::Bool(call.receiver == *call.arg(0))
}

fn not_equal(call: &mut NativeCall<'_>) -> Val {
    Val::Bool(call.receiver != *call.arg(0))
}

/// Apply `function` to each item, stopping at the first exception
fn translate_each(
    call: &mut NativeCall<'_>,
    function: &Val,
    items: Vec<Vec<Val>>,
) -> Result<Vec<Val>, Val> {
    let mut out = Vec::with_capacity(items.len());
    for args in items {
        match call.apply(function, args) {
            e @ Val::Exception(_) => return Err(e),
            value => out.push(value),
        }
    }
    Ok(out)
}

/// Number argument as a whole count
fn count(call: &NativeCall<'_>, value: &Val) -> Result<usize, Val> {
    match value {
        Val::Num(n) if n.unit.is_unitless() && n.value >= 0.0 && n.value.is_finite() => {
            Ok(n.value.floor() as usize)
        }
        other => Err(call.mismatch("unitless whole Number", other)),
    }
}
