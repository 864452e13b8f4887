//! Function application and method dispatch
//!
//! Interpreted functions are entered as a new frame. Native functions run
//! synchronously through the catalogue and complete the call in place.

use super::errors::{EngineError, ExceptionKind};
use super::expressions::Outcome;
use super::native::NativeCall;
use super::runtime::Runtime;
use super::types::{Closure, Function, NodeId, StructureVal, Val};
use std::rc::Rc;
use tracing::trace;

fn exception(kind: ExceptionKind, node: NodeId) -> Outcome {
    Outcome::Complete(Val::exception(kind, Some(node)))
}

fn arity(expected: usize, received: usize, node: NodeId) -> Option<Outcome> {
    (expected != received).then(|| exception(ExceptionKind::ArityMismatch { expected, received }, node))
}

/// Apply `callee` to evaluated arguments
pub fn invoke(
    rt: &mut Runtime,
    node: NodeId,
    callee: &Val,
    args: Vec<Val>,
) -> Result<Outcome, EngineError> {
    let Val::Function(function) = callee else {
        return Ok(exception(
            ExceptionKind::NotCallable {
                received: callee.to_string(),
            },
            node,
        ));
    };

    match function {
        Function::Closure(closure) => Ok(enter(closure, None, args, node)),
        Function::Method { receiver, closure } => {
            Ok(enter(closure, Some(receiver.as_ref()), args, node))
        }
        Function::Native { receiver, name } => native(rt, node, receiver, name, args),
        Function::Constructor(def) => {
            if let Some(mismatch) = arity(def.fields.len(), args.len(), node) {
                return Ok(mismatch);
            }
            Ok(Outcome::Complete(Val::Structure(StructureVal {
                def: def.clone(),
                fields: args,
            })))
        }
        Function::Conversion(kind) => {
            if let Some(mismatch) = arity(1, args.len(), node) {
                return Ok(mismatch);
            }
            match rt.catalogue.of(*kind).and_then(|s| s.conversion) {
                Some(convert) => Ok(Outcome::Complete(convert(&args[0], node))),
                None => Ok(exception(
                    ExceptionKind::NotCallable {
                        received: callee.to_string(),
                    },
                    node,
                )),
            }
        }
    }
}

/// Bind parameters in a child of the closure's scope. Structure functions
/// also see the receiver's fields.
fn enter(closure: &Rc<Closure>, receiver: Option<&Val>, args: Vec<Val>, node: NodeId) -> Outcome {
    if let Some(mismatch) = arity(closure.params.len(), args.len(), node) {
        return mismatch;
    }
    let env = closure.env.child();
    if let Some(Val::Structure(s)) = receiver {
        for (name, value) in s.def.fields.iter().zip(&s.fields) {
            env.define(name.clone(), value.clone());
        }
    }
    for (param, arg) in closure.params.iter().zip(args) {
        env.define(param.clone(), arg);
    }
    trace!(node = %node, function = ?closure.name, "entering function body");
    Outcome::Enter {
        body: closure.body,
        env,
    }
}

/// Operator dispatch: a structure's own function of that name, else the catalogue
pub fn dispatch(
    rt: &mut Runtime,
    node: NodeId,
    receiver: Val,
    op: &str,
    args: Vec<Val>,
) -> Result<Outcome, EngineError> {
    if let Val::Structure(s) = &receiver {
        if let Some(closure) = s.def.function(op).cloned() {
            return Ok(enter(&closure, Some(&receiver), args, node));
        }
    }
    native(rt, node, &receiver, op, args)
}

fn native(
    rt: &mut Runtime,
    node: NodeId,
    receiver: &Val,
    name: &str,
    args: Vec<Val>,
) -> Result<Outcome, EngineError> {
    let catalogue = rt.catalogue;
    let function = match catalogue.lookup(receiver.kind(), name, args.len()) {
        Ok(function) => function,
        Err(kind) => return Ok(exception(kind, node)),
    };
    let value = {
        let mut call = NativeCall::new(node, receiver.clone(), args, rt);
        (function.call)(&mut call)
    };
    // A defect inside a nested evaluation surfaces here, not as a value
    if let Some(defect) = rt.take_defect() {
        return Err(defect);
    }
    Ok(Outcome::Complete(value))
}

/// `subject.name`: a field, a structure function, or a catalogue function,
/// the latter two bound to the subject
pub fn access(rt: &Runtime, node: NodeId, subject: Val, name: &str) -> Val {
    if let Val::Structure(s) = &subject {
        if let Some(value) = s.field(name) {
            return value.clone();
        }
        if let Some(closure) = s.def.function(name).cloned() {
            return Val::Function(Function::Method {
                receiver: Box::new(subject),
                closure,
            });
        }
    }
    if rt.catalogue.has_function(subject.kind(), name) {
        return Val::Function(Function::Native {
            receiver: Box::new(subject),
            name: name.to_string(),
        });
    }
    let owner = match &subject {
        Val::Structure(s) => s.def.name.clone(),
        other => other.kind().to_string(),
    };
    Val::exception(
        ExceptionKind::UnknownField {
            subject: owner,
            name: name.to_string(),
        },
        Some(node),
    )
}
