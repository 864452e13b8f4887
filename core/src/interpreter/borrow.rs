//! Borrowing between sources
//!
//! `↓ name` evaluates another source of the same program (once per pass) and
//! binds its value in the borrowing scope.

use super::errors::{EngineError, ExceptionKind};
use super::runtime::Runtime;
use super::types::{BorrowPhase, FrameKind, NodeKind, Val};
use super::vm::{complete, push_frame, Machine};
use tracing::debug;

pub fn execute_borrow(
    machine: &mut Machine,
    rt: &mut Runtime,
    phase: BorrowPhase,
) -> Result<(), EngineError> {
    let program = rt.program.clone();
    let Some(frame) = machine.frames.last() else {
        return Err(EngineError::defect("borrow step without a frame"));
    };
    let (node, env) = (frame.node, frame.env.clone());
    let Some(NodeKind::Borrow { source, name }) = program.get(node) else {
        return Err(EngineError::defect(format!(
            "borrow frame over non-borrow node {node}"
        )));
    };
    let binding = name.clone().unwrap_or_else(|| source.clone());

    match phase {
        BorrowPhase::Enter => {
            let Some(root) = program.source(source).map(|s| s.root) else {
                let unknown = ExceptionKind::UnknownSource {
                    name: source.clone(),
                };
                complete(machine, &mut rt.node_values, Val::exception(unknown, Some(node)));
                return Ok(());
            };
            if let Some(value) = rt.borrowed.get(source).cloned() {
                env.define(binding, value.clone());
                complete(machine, &mut rt.node_values, value);
                return Ok(());
            }
            if rt.borrowing.contains(source) {
                let cyclic = ExceptionKind::CyclicBorrow {
                    name: source.clone(),
                };
                complete(machine, &mut rt.node_values, Val::exception(cyclic, Some(node)));
                return Ok(());
            }
            debug!(source = %source, "borrowing source");
            rt.borrowing.push(source.clone());
            if let Some(frame) = machine.frames.last_mut() {
                frame.kind = FrameKind::Borrow {
                    phase: BorrowPhase::Source,
                };
            }
            push_frame(machine, &program, root, rt.scopes.root());
        }

        BorrowPhase::Source => {
            rt.borrowing.retain(|s| s != source);
            let value = machine
                .frames
                .last_mut()
                .and_then(|f| f.values.pop())
                .ok_or_else(|| EngineError::defect(format!("source {source} produced no value")))?;
            rt.borrowed.insert(source.clone(), value.clone());
            rt.source_results.insert(source.clone(), value.clone());
            env.define(binding, value.clone());
            complete(machine, &mut rt.node_values, value);
        }
    }
    Ok(())
}
