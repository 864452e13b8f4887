//! Core execution loop
//!
//! `step()` advances the top frame by one unit of work: push one child frame,
//! combine evaluated operands (which may apply one native call), or complete
//! one frame.
//!
//! ## Function Organization
//! 1. run_until_done() / run_for() - drivers that call step repeatedly
//! 2. step() - dispatches on the top frame's kind

use super::borrow::execute_borrow;
use super::errors::EngineError;
use super::expressions::{finish, inspects_exceptions, operand, Outcome};
use super::reactions::execute_reaction;
use super::runtime::Runtime;
use super::types::FrameKind;
use super::vm::{complete, push_frame, Machine, Step};
use tracing::trace;

/* ===================== Public API ===================== */

/// Run the machine until its root expression has a value
pub fn run_until_done(machine: &mut Machine, rt: &mut Runtime) -> Result<(), EngineError> {
    loop {
        match step(machine, rt)? {
            Step::Done => return Ok(()),
            Step::Continue | Step::Yield => continue,
        }
    }
}

/// Run at most `budget` steps
///
/// Returns `Step::Yield` when the budget runs out first.
pub fn run_for(machine: &mut Machine, rt: &mut Runtime, budget: usize) -> Result<Step, EngineError> {
    for _ in 0..budget {
        if step(machine, rt)? == Step::Done {
            return Ok(Step::Done);
        }
    }
    Ok(if machine.is_done() { Step::Done } else { Step::Yield })
}

/// Execute one step of the machine
pub fn step(machine: &mut Machine, rt: &mut Runtime) -> Result<Step, EngineError> {
    let Some(frame) = machine.frames.last() else {
        return Ok(Step::Done);
    };
    let kind = frame.kind;
    trace!(node = %frame.node, depth = machine.depth(), kind = ?kind, "step");

    match kind {
        FrameKind::Operands => execute_operands(machine, rt)?,
        FrameKind::Body => execute_body(machine, rt)?,
        FrameKind::Reaction { phase } => execute_reaction(machine, rt, phase)?,
        FrameKind::Borrow { phase } => execute_borrow(machine, rt, phase)?,
    }

    Ok(if machine.is_done() {
        Step::Done
    } else {
        Step::Continue
    })
}

/* ===================== Frame Kinds ===================== */

fn execute_operands(machine: &mut Machine, rt: &mut Runtime) -> Result<(), EngineError> {
    let program = rt.program.clone();
    let Some(frame) = machine.frames.last_mut() else {
        return Err(EngineError::defect("operand step without a frame"));
    };
    let node = frame.node;
    let kind = program
        .get(node)
        .ok_or_else(|| EngineError::defect(format!("frame over unknown node {node}")))?;

    // An exception from any operand becomes this node's value
    let propagated = match frame.values.last() {
        Some(value) if value.is_exception() && !inspects_exceptions(kind) => Some(value.clone()),
        _ => None,
    };
    if let Some(exception) = propagated {
        complete(machine, &mut rt.node_values, exception);
        return Ok(());
    }

    if let Some(child) = operand(kind, frame.values.len()) {
        let env = frame.env.clone();
        push_frame(machine, &program, child, env);
        return Ok(());
    }

    let values = std::mem::take(&mut frame.values);
    let env = frame.env.clone();
    match finish(rt, node, kind, values, &env)? {
        Outcome::Complete(value) => complete(machine, &mut rt.node_values, value),
        Outcome::Enter { body, env } => {
            if let Some(frame) = machine.frames.last_mut() {
                frame.kind = FrameKind::Body;
            }
            push_frame(machine, &program, body, env);
        }
    }
    Ok(())
}

/// The delegated frame finished; pass its value through
fn execute_body(machine: &mut Machine, rt: &mut Runtime) -> Result<(), EngineError> {
    let value = machine
        .frames
        .last_mut()
        .and_then(|f| f.values.pop())
        .ok_or_else(|| EngineError::defect("body frame resumed without a value"))?;
    complete(machine, &mut rt.node_values, value);
    Ok(())
}
