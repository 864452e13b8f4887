//! Runtime value types
//!
//! Values are immutable once built. Every constructor is infallible; failure
//! is itself a value (`Val::Exception`). Equality is total and structural,
//! except functions, which compare by identity of definition.

use super::ast::NodeId;
use super::env::Env;
use crate::interpreter::errors::ExceptionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/* ===================== Units ===================== */

/// Product of named base units with integer exponents (`m/s` is `m^1 s^-1`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Unit {
    exponents: BTreeMap<String, i32>,
}

impl Unit {
    pub fn none() -> Self {
        Unit::default()
    }

    /// Parse `ms`, `m/s`, `m·m`, `kg·m/s^2`. The empty string is unitless.
    pub fn parse(text: &str) -> Self {
        let mut unit = Unit::none();
        let mut parts = text.splitn(2, '/');
        let numerator = parts.next().unwrap_or_default();
        let denominator = parts.next().unwrap_or_default();
        for (side, sign) in [(numerator, 1), (denominator, -1)] {
            for factor in side.split('·').map(str::trim).filter(|f| !f.is_empty()) {
                let (name, power) = match factor.split_once('^') {
                    Some((name, power)) => (name, power.parse::<i32>().unwrap_or(1)),
                    None => (factor, 1),
                };
                unit.add(name, power * sign);
            }
        }
        unit
    }

    pub fn is_unitless(&self) -> bool {
        self.exponents.is_empty()
    }

    pub fn product(&self, other: &Unit) -> Unit {
        let mut unit = self.clone();
        for (name, power) in &other.exponents {
            unit.add(name, *power);
        }
        unit
    }

    pub fn quotient(&self, other: &Unit) -> Unit {
        let mut unit = self.clone();
        for (name, power) in &other.exponents {
            unit.add(name, -*power);
        }
        unit
    }

    /// `None` when an exponent leaves the `i32` range
    pub fn power(&self, exponent: i32) -> Option<Unit> {
        let mut unit = Unit::none();
        for (name, power) in &self.exponents {
            unit.add(name, power.checked_mul(exponent)?);
        }
        Some(unit)
    }

    fn add(&mut self, name: &str, power: i32) {
        let entry = self.exponents.entry(name.to_string()).or_insert(0);
        *entry += power;
        if *entry == 0 {
            self.exponents.remove(name);
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factor = |(name, power): (&String, i32)| {
            if power == 1 {
                name.clone()
            } else {
                format!("{name}^{power}")
            }
        };
        let numerator: Vec<String> = self
            .exponents
            .iter()
            .filter(|(_, p)| **p > 0)
            .map(|(n, p)| factor((n, *p)))
            .collect();
        let denominator: Vec<String> = self
            .exponents
            .iter()
            .filter(|(_, p)| **p < 0)
            .map(|(n, p)| factor((n, -*p)))
            .collect();
        write!(f, "{}", numerator.join("·"))?;
        if !denominator.is_empty() {
            write!(f, "/{}", denominator.join("·"))?;
        }
        Ok(())
    }
}

/* ===================== Numbers ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    pub value: f64,
    pub unit: Unit,
}

impl Number {
    pub fn new(value: f64, unit: Unit) -> Self {
        Number { value, unit }
    }

    fn same(&self, other: &Number) -> bool {
        let same_value =
            self.value == other.value || (self.value.is_nan() && other.value.is_nan());
        same_value && self.unit == other.unit
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.value;
        if v.is_nan() {
            write!(f, "NaN")?;
        } else if v.is_infinite() {
            write!(f, "{}∞", if v < 0.0 { "-" } else { "" })?;
        } else if v.fract() == 0.0 && v.abs() < 1e15 {
            write!(f, "{}", v as i64)?;
        } else {
            write!(f, "{v}")?;
        }
        write!(f, "{}", self.unit)
    }
}

/* ===================== Functions and Structures ===================== */

/// User-defined function together with the scope it closes over
#[derive(Debug)]
pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: NodeId,
    pub env: Env,
}

#[derive(Debug)]
pub struct StructureDef {
    pub name: String,
    pub fields: Vec<String>,
    pub functions: Vec<Rc<Closure>>,
    pub env: Env,
}

impl StructureDef {
    pub fn function(&self, name: &str) -> Option<&Rc<Closure>> {
        self.functions.iter().find(|f| f.name.as_deref() == Some(name))
    }
}

#[derive(Debug, Clone)]
pub struct StructureVal {
    pub def: Rc<StructureDef>,
    /// Field values, in the order of `def.fields`
    pub fields: Vec<Val>,
}

impl StructureVal {
    pub fn field(&self, name: &str) -> Option<&Val> {
        self.def
            .fields
            .iter()
            .position(|f| f == name)
            .and_then(|i| self.fields.get(i))
    }
}

impl PartialEq for StructureVal {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.def, &other.def) && self.fields == other.fields
    }
}

#[derive(Debug, Clone)]
pub enum Function {
    Closure(Rc<Closure>),
    /// A structure function bound to its receiver
    Method {
        receiver: Box<Val>,
        closure: Rc<Closure>,
    },
    /// A catalogue function bound to its receiver
    Native {
        receiver: Box<Val>,
        name: String,
    },
    /// Calling a user structure's name builds an instance
    Constructor(Rc<StructureDef>),
    /// Calling a native structure's name converts its argument
    Conversion(ValueKind),
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Closure(a), Function::Closure(b)) => Rc::ptr_eq(a, b),
            (
                Function::Method {
                    receiver: ra,
                    closure: a,
                },
                Function::Method {
                    receiver: rb,
                    closure: b,
                },
            ) => Rc::ptr_eq(a, b) && ra == rb,
            (
                Function::Native {
                    receiver: ra,
                    name: a,
                },
                Function::Native {
                    receiver: rb,
                    name: b,
                },
            ) => a == b && ra == rb,
            (Function::Constructor(a), Function::Constructor(b)) => Rc::ptr_eq(a, b),
            (Function::Conversion(a), Function::Conversion(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Closure(c) => match &c.name {
                Some(name) => write!(f, "ƒ {name}"),
                None => write!(f, "ƒ"),
            },
            Function::Method { receiver, closure } => {
                let owner = match receiver.as_ref() {
                    Val::Structure(s) => s.def.name.clone(),
                    other => other.kind().name().to_string(),
                };
                write!(f, "ƒ {owner}.{}", closure.name.as_deref().unwrap_or_default())
            }
            Function::Native { receiver, name } => write!(f, "ƒ {}.{name}", receiver.kind().name()),
            Function::Constructor(def) => write!(f, "ƒ {}", def.name),
            Function::Conversion(kind) => write!(f, "ƒ {}", kind.name()),
        }
    }
}

/* ===================== Exceptions ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExceptionKind,
    /// The expression that produced the exception
    pub node: Option<NodeId>,
}

/* ===================== Values ===================== */

/// Closed set of value kinds, also the names of native structures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Boolean,
    Number,
    Text,
    List,
    Set,
    Map,
    Structure,
    Function,
    Exception,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Boolean => "Boolean",
            ValueKind::Number => "Number",
            ValueKind::Text => "Text",
            ValueKind::List => "List",
            ValueKind::Set => "Set",
            ValueKind::Map => "Map",
            ValueKind::Structure => "Structure",
            ValueKind::Function => "Function",
            ValueKind::Exception => "Exception",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            ValueKind::Boolean,
            ValueKind::Number,
            ValueKind::Text,
            ValueKind::List,
            ValueKind::Set,
            ValueKind::Map,
            ValueKind::Structure,
            ValueKind::Function,
            ValueKind::Exception,
        ]
        .into_iter()
        .find(|k| k.name() == name)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime value type
#[derive(Debug, Clone)]
pub enum Val {
    Bool(bool),
    Num(Number),
    Text(String),
    List(Vec<Val>),
    /// Distinct members in insertion order
    Set(Vec<Val>),
    /// Distinct keys in insertion order
    Map(Vec<(Val, Val)>),
    Structure(StructureVal),
    Function(Function),
    Exception(Exception),
}

impl Val {
    pub fn num(value: f64) -> Self {
        Val::Num(Number::new(value, Unit::none()))
    }

    /// A number with a unit, e.g. `Val::measure(500.0, "ms")`
    pub fn measure(value: f64, unit: &str) -> Self {
        Val::Num(Number::new(value, Unit::parse(unit)))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Val::Text(text.into())
    }

    /// Build a set, dropping structurally equal duplicates
    pub fn set(items: impl IntoIterator<Item = Val>) -> Self {
        let mut members: Vec<Val> = Vec::new();
        for item in items {
            if !members.contains(&item) {
                members.push(item);
            }
        }
        Val::Set(members)
    }

    /// Build a map; a repeated key keeps its first position and last value
    pub fn map(entries: impl IntoIterator<Item = (Val, Val)>) -> Self {
        let mut pairs: Vec<(Val, Val)> = Vec::new();
        for (key, value) in entries {
            match pairs.iter_mut().find(|(k, _)| *k == key) {
                Some(pair) => pair.1 = value,
                None => pairs.push((key, value)),
            }
        }
        Val::Map(pairs)
    }

    pub fn exception(kind: ExceptionKind, node: Option<NodeId>) -> Self {
        Val::Exception(Exception { kind, node })
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Val::Bool(_) => ValueKind::Boolean,
            Val::Num(_) => ValueKind::Number,
            Val::Text(_) => ValueKind::Text,
            Val::List(_) => ValueKind::List,
            Val::Set(_) => ValueKind::Set,
            Val::Map(_) => ValueKind::Map,
            Val::Structure(_) => ValueKind::Structure,
            Val::Function(_) => ValueKind::Function,
            Val::Exception(_) => ValueKind::Exception,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Val::Exception(_))
    }

    pub fn as_exception(&self) -> Option<&Exception> {
        match self {
            Val::Exception(e) => Some(e),
            _ => None,
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Num(a), Val::Num(b)) => a.same(b),
            (Val::Text(a), Val::Text(b)) => a == b,
            (Val::List(a), Val::List(b)) => a == b,
            // Membership, not order
            (Val::Set(a), Val::Set(b)) => a.len() == b.len() && a.iter().all(|v| b.contains(v)),
            (Val::Map(a), Val::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Val::Structure(a), Val::Structure(b)) => a == b,
            (Val::Function(a), Val::Function(b)) => a == b,
            (Val::Exception(a), Val::Exception(b)) => a.kind == b.kind,
            _ => false,
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Val]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Canonical rendering, used both for display and as a test oracle
impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Bool(true) => write!(f, "⊤"),
            Val::Bool(false) => write!(f, "⊥"),
            Val::Num(n) => write!(f, "{n}"),
            Val::Text(t) => write!(f, "\"{t}\""),
            Val::List(items) => {
                write!(f, "[")?;
                join(f, items)?;
                write!(f, "]")
            }
            Val::Set(items) => {
                write!(f, "{{")?;
                join(f, items)?;
                write!(f, "}}")
            }
            Val::Map(pairs) if pairs.is_empty() => write!(f, "{{:}}"),
            Val::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
            Val::Structure(s) => {
                write!(f, "{}(", s.def.name)?;
                for (i, (name, value)) in s.def.fields.iter().zip(&s.fields).enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{name}:{value}")?;
                }
                write!(f, ")")
            }
            Val::Function(func) => write!(f, "{func}"),
            Val::Exception(e) => write!(f, "!{}", e.kind),
        }
    }
}

/* ===================== Host Data ===================== */

/// Plain data that can cross threads, used by asynchronous stream sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Datum {
    Bool(bool),
    Num { value: f64, unit: String },
    Text(String),
    List(Vec<Datum>),
    Set(Vec<Datum>),
    Map(Vec<(Datum, Datum)>),
}

impl Datum {
    pub fn measure(value: f64, unit: &str) -> Self {
        Datum::Num {
            value,
            unit: unit.to_string(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Datum::Bool(_) => ValueKind::Boolean,
            Datum::Num { .. } => ValueKind::Number,
            Datum::Text(_) => ValueKind::Text,
            Datum::List(_) => ValueKind::List,
            Datum::Set(_) => ValueKind::Set,
            Datum::Map(_) => ValueKind::Map,
        }
    }

    /// Convert plain JSON. Arrays become lists, objects become text-keyed maps.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        Some(match json {
            serde_json::Value::Null => return None,
            serde_json::Value::Bool(b) => Datum::Bool(*b),
            serde_json::Value::Number(n) => Datum::measure(n.as_f64()?, ""),
            serde_json::Value::String(s) => Datum::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Datum::List(items.iter().map(Datum::from_json).collect::<Option<_>>()?)
            }
            serde_json::Value::Object(fields) => Datum::Map(
                fields
                    .iter()
                    .map(|(k, v)| Some((Datum::Text(k.clone()), Datum::from_json(v)?)))
                    .collect::<Option<_>>()?,
            ),
        })
    }

    /// Parse a command-line literal: `⊤`, `⊥`, `500ms`, `-2.5`, JSON, or bare text
    pub fn parse_literal(text: &str) -> Self {
        match text.trim() {
            "⊤" | "true" => return Datum::Bool(true),
            "⊥" | "false" => return Datum::Bool(false),
            _ => {}
        }
        let trimmed = text.trim();
        let split = trimmed
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*c == '-' && *i == 0)))
            .map(|(i, _)| i)
            .unwrap_or(trimmed.len());
        if split > 0 {
            if let Ok(value) = trimmed[..split].parse::<f64>() {
                let unit = &trimmed[split..];
                if unit.chars().all(|c| c.is_alphabetic() || "/·^-0123456789".contains(c)) {
                    return Datum::measure(value, unit);
                }
            }
        }
        serde_json::from_str::<serde_json::Value>(trimmed)
            .ok()
            .and_then(|json| Datum::from_json(&json))
            .unwrap_or_else(|| Datum::Text(trimmed.to_string()))
    }
}

impl From<Datum> for Val {
    fn from(datum: Datum) -> Self {
        match datum {
            Datum::Bool(b) => Val::Bool(b),
            Datum::Num { value, unit } => Val::measure(value, &unit),
            Datum::Text(t) => Val::Text(t),
            Datum::List(items) => Val::List(items.into_iter().map(Val::from).collect()),
            Datum::Set(items) => Val::set(items.into_iter().map(Val::from)),
            Datum::Map(pairs) => Val::map(pairs.into_iter().map(|(k, v)| (Val::from(k), Val::from(v)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_rendering() {
        assert_eq!(Val::num(3.0).to_string(), "3");
        assert_eq!(Val::num(-1.0).to_string(), "-1");
        assert_eq!(Val::num(0.5).to_string(), "0.5");
        assert_eq!(Val::measure(500.0, "ms").to_string(), "500ms");
        assert_eq!(Val::measure(2.0, "m/s").to_string(), "2m/s");
        assert_eq!(Val::measure(4.0, "m^2").to_string(), "4m^2");
    }

    #[test]
    fn test_unit_algebra() {
        let metre = Unit::parse("m");
        let second = Unit::parse("s");

        assert_eq!(metre.quotient(&second), Unit::parse("m/s"));
        assert_eq!(metre.product(&metre), Unit::parse("m^2"));
        assert!(metre.quotient(&metre).is_unitless());
        assert_eq!(Unit::parse("m/s").power(2), Some(Unit::parse("m^2/s^2")));
        assert_eq!(Unit::parse("m^2").power(i32::MAX), None);
        assert!(Unit::parse("").is_unitless());
    }

    #[test]
    fn test_collection_rendering() {
        let list = Val::List(vec![Val::num(1.0), Val::num(2.0)]);
        assert_eq!(list.to_string(), "[1 2]");
        assert_eq!(Val::set([Val::num(1.0), Val::num(1.0), Val::num(2.0)]).to_string(), "{1 2}");
        assert_eq!(Val::map([]).to_string(), "{:}");
        assert_eq!(
            Val::map([(Val::text("a"), Val::num(1.0))]).to_string(),
            "{\"a\":1}"
        );
        assert_eq!(Val::Bool(true).to_string(), "⊤");
        assert_eq!(Val::Bool(false).to_string(), "⊥");
    }

    #[test]
    fn test_structural_equality() {
        let a = Val::List(vec![Val::num(1.0), Val::num(2.0)]);
        let b = Val::List(vec![Val::num(1.0), Val::num(2.0)]);
        let c = Val::List(vec![Val::num(1.0)]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        // Sets and maps compare by membership
        assert_eq!(
            Val::set([Val::num(1.0), Val::num(2.0)]),
            Val::set([Val::num(2.0), Val::num(1.0)])
        );
        assert_eq!(
            Val::map([(Val::num(1.0), Val::text("a")), (Val::num(2.0), Val::text("b"))]),
            Val::map([(Val::num(2.0), Val::text("b")), (Val::num(1.0), Val::text("a"))])
        );

        // Units participate in equality
        assert_ne!(Val::measure(1.0, "m"), Val::measure(1.0, "s"));
        assert_ne!(Val::num(1.0), Val::text("1"));
    }

    #[test]
    fn test_map_repeated_key_keeps_last_value() {
        let map = Val::map([
            (Val::text("k"), Val::num(1.0)),
            (Val::text("k"), Val::num(2.0)),
        ]);
        assert_eq!(map.to_string(), "{\"k\":2}");
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(Datum::parse_literal("500ms"), Datum::measure(500.0, "ms"));
        assert_eq!(Datum::parse_literal("-2.5"), Datum::measure(-2.5, ""));
        assert_eq!(Datum::parse_literal("⊤"), Datum::Bool(true));
        assert_eq!(
            Datum::parse_literal("[1, 2]"),
            Datum::List(vec![Datum::measure(1.0, ""), Datum::measure(2.0, "")])
        );
        assert_eq!(Datum::parse_literal("hello"), Datum::Text("hello".into()));
    }

    #[test]
    fn test_datum_conversion() {
        let value = Val::from(Datum::measure(1.0, "ms"));
        assert_eq!(value, Val::measure(1.0, "ms"));
        assert_eq!(Datum::measure(1.0, "ms").kind(), ValueKind::Number);
    }
}
