//! Expression evaluation
//!
//! Most nodes evaluate their operands left to right (one frame each) and then
//! combine the values here. Combining either completes the node or enters a
//! single follow-up node, such as a function body or a conditional branch.

use super::calls;
use super::errors::{EngineError, ExceptionKind};
use super::runtime::Runtime;
use super::types::{
    Closure, Env, Function, NodeId, NodeKind, Number, StructureDef, TypeTag, Unit, Val,
};
use std::rc::Rc;

/// What a node does once its operands are evaluated
#[derive(Debug)]
pub enum Outcome {
    Complete(Val),
    /// Evaluate `body` in `env`; its value becomes the node's value
    Enter { body: NodeId, env: Env },
}

/* ===================== Operands ===================== */

/// The `index`th operand of a node, if it has that many
pub fn operand(kind: &NodeKind, index: usize) -> Option<NodeId> {
    match kind {
        NodeKind::List(items) | NodeKind::Set(items) | NodeKind::Block(items) => {
            items.get(index).copied()
        }
        NodeKind::Map(entries) => entries
            .get(index / 2)
            .map(|(k, v)| if index % 2 == 0 { *k } else { *v }),
        NodeKind::Call { callee, args } => match index {
            0 => Some(*callee),
            i => args.get(i - 1).copied(),
        },
        NodeKind::Binary { left, right, .. } => match index {
            0 => Some(*left),
            1 => Some(*right),
            _ => None,
        },
        NodeKind::Bind { value: only, .. }
        | NodeKind::Unary { operand: only, .. }
        | NodeKind::Is { operand: only, .. }
        | NodeKind::Access { subject: only, .. }
        | NodeKind::Conditional {
            condition: only, ..
        } => (index == 0).then_some(*only),
        _ => None,
    }
}

/// Whether the node sees exceptions from its operands instead of propagating them
pub fn inspects_exceptions(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::Is { .. })
}

/* ===================== Combining ===================== */

fn missing(node: NodeId) -> EngineError {
    EngineError::defect(format!("operands of {node} were not evaluated"))
}

fn exception(kind: ExceptionKind, node: NodeId) -> Outcome {
    Outcome::Complete(Val::exception(kind, Some(node)))
}

/// Combine a node's evaluated operands
pub fn finish(
    rt: &mut Runtime,
    node: NodeId,
    kind: &NodeKind,
    mut values: Vec<Val>,
    env: &Env,
) -> Result<Outcome, EngineError> {
    let value = match kind {
        NodeKind::Bool(b) => Val::Bool(*b),
        NodeKind::Num { value, unit } => Val::Num(Number::new(
            *value,
            unit.as_deref().map(Unit::parse).unwrap_or_default(),
        )),
        NodeKind::Text(text) => Val::text(text.clone()),
        NodeKind::List(_) => Val::List(values),
        NodeKind::Set(_) => Val::set(values),
        NodeKind::Map(_) => {
            let mut values = values.into_iter();
            let mut pairs = Vec::new();
            while let (Some(key), Some(value)) = (values.next(), values.next()) {
                pairs.push((key, value));
            }
            Val::map(pairs)
        }

        NodeKind::Name(name) => resolve(rt, node, name, env),
        NodeKind::Previous => match env.lookup(".") {
            Some(prior) => prior,
            None => return Ok(exception(ExceptionKind::UnboundName { name: ".".into() }, node)),
        },
        NodeKind::Block(_) => match values.pop() {
            Some(last) => last,
            None => return Ok(exception(ExceptionKind::NoValue, node)),
        },
        NodeKind::Bind { name, .. } => {
            let value = values.pop().ok_or_else(|| missing(node))?;
            env.define(name.clone(), value.clone());
            value
        }

        NodeKind::Function { name, params, body } => {
            let closure = Val::Function(Function::Closure(Rc::new(Closure {
                name: name.clone(),
                params: params.clone(),
                body: *body,
                env: env.clone(),
            })));
            // Defined in the enclosing scope, which the body closes over, so it can recurse
            if let Some(name) = name {
                env.define(name.clone(), closure.clone());
            }
            closure
        }
        NodeKind::Structure {
            name,
            fields,
            functions,
        } => {
            let def = StructureDef {
                name: name.clone(),
                fields: fields.clone(),
                functions: functions
                    .iter()
                    .map(|f| {
                        Rc::new(Closure {
                            name: Some(f.name.clone()),
                            params: f.params.clone(),
                            body: f.body,
                            env: env.clone(),
                        })
                    })
                    .collect(),
                env: env.clone(),
            };
            let constructor = Val::Function(Function::Constructor(Rc::new(def)));
            env.define(name.clone(), constructor.clone());
            constructor
        }

        NodeKind::Call { .. } => {
            if values.is_empty() {
                return Err(missing(node));
            }
            let callee = values.remove(0);
            return calls::invoke(rt, node, &callee, values);
        }
        NodeKind::Binary { op, .. } => {
            let [left, right]: [Val; 2] = values.try_into().map_err(|_| missing(node))?;
            return calls::dispatch(rt, node, left, op, vec![right]);
        }
        NodeKind::Unary { op, .. } => {
            let operand = values.pop().ok_or_else(|| missing(node))?;
            return calls::dispatch(rt, node, operand, op, Vec::new());
        }
        NodeKind::Conditional { yes, no, .. } => {
            return match values.pop().ok_or_else(|| missing(node))? {
                Val::Bool(choice) => Ok(Outcome::Enter {
                    body: if choice { *yes } else { *no },
                    env: env.clone(),
                }),
                other => Ok(exception(
                    ExceptionKind::TypeMismatch {
                        expected: "Boolean".into(),
                        received: other.to_string(),
                    },
                    node,
                )),
            };
        }
        NodeKind::Access { name, .. } => {
            let subject = values.pop().ok_or_else(|| missing(node))?;
            calls::access(rt, node, subject, name)
        }
        NodeKind::Is { tag, .. } => {
            let operand = values.pop().ok_or_else(|| missing(node))?;
            Val::Bool(is(&operand, tag))
        }

        NodeKind::Stream(name) => rt.read_stream(name, node),
        NodeKind::Changed(stream) => rt.stream_changed(*stream, node),

        NodeKind::Reaction { .. } | NodeKind::Borrow { .. } => {
            return Err(EngineError::defect(format!(
                "{node} needs its own frame kind"
            )))
        }
    };
    Ok(Outcome::Complete(value))
}

/// Resolve a name: scope chain, then native structures
fn resolve(rt: &Runtime, node: NodeId, name: &str, env: &Env) -> Val {
    if let Some(value) = env.lookup(name) {
        return value;
    }
    match rt.catalogue.structure(name) {
        Some(structure) if structure.conversion.is_some() => {
            Val::Function(Function::Conversion(structure.kind))
        }
        _ => Val::exception(
            ExceptionKind::UnboundName {
                name: name.to_string(),
            },
            Some(node),
        ),
    }
}

/// Type test. A number matches only with exactly the tag's unit.
fn is(value: &Val, tag: &TypeTag) -> bool {
    match (tag, value) {
        (TypeTag::Bool, Val::Bool(_))
        | (TypeTag::Text, Val::Text(_))
        | (TypeTag::List, Val::List(_))
        | (TypeTag::Set, Val::Set(_))
        | (TypeTag::Map, Val::Map(_))
        | (TypeTag::Function, Val::Function(_))
        | (TypeTag::Exception, Val::Exception(_)) => true,
        (TypeTag::Number { unit }, Val::Num(n)) => {
            n.unit == unit.as_deref().map(Unit::parse).unwrap_or_default()
        }
        (TypeTag::Structure { name }, Val::Structure(s)) => s.def.name == *name,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_order() {
        let call = NodeKind::Call {
            callee: NodeId(4),
            args: vec![NodeId(1), NodeId(2)],
        };
        assert_eq!(operand(&call, 0), Some(NodeId(4)));
        assert_eq!(operand(&call, 2), Some(NodeId(2)));
        assert_eq!(operand(&call, 3), None);

        let map = NodeKind::Map(vec![(NodeId(0), NodeId(1)), (NodeId(2), NodeId(3))]);
        let order: Vec<_> = (0..5).map(|i| operand(&map, i)).collect();
        assert_eq!(
            order,
            vec![Some(NodeId(0)), Some(NodeId(1)), Some(NodeId(2)), Some(NodeId(3)), None]
        );

        // Branches are entered, not evaluated as operands
        let conditional = NodeKind::Conditional {
            condition: NodeId(0),
            yes: NodeId(1),
            no: NodeId(2),
        };
        assert_eq!(operand(&conditional, 1), None);
    }

    #[test]
    fn test_type_tags() {
        let unitless = TypeTag::Number { unit: None };
        let seconds = TypeTag::Number {
            unit: Some("s".into()),
        };

        assert!(is(&Val::num(1.0), &unitless));
        assert!(!is(&Val::measure(1.0, "s"), &unitless));
        assert!(is(&Val::measure(1.0, "s"), &seconds));
        assert!(!is(&Val::text("hi"), &unitless));
        assert!(is(
            &Val::exception(ExceptionKind::NoValue, None),
            &TypeTag::Exception
        ));
    }
}
