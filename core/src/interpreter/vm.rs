//! Machine state
//!
//! A `Machine` holds one evaluation in flight:
//! - frames: stack of active expressions
//! - result: the root frame's value, once it completes

use super::errors::ExceptionKind;
use super::types::{
    BorrowPhase, Env, Frame, FrameKind, NodeId, NodeKind, Program, ReactionPhase, Val,
};
use std::collections::HashMap;
use tracing::warn;

/* ===================== Machine ===================== */

#[derive(Debug)]
pub struct Machine {
    /// Stack of execution frames; the last one is active
    pub frames: Vec<Frame>,

    /// Value of the root expression, set when its frame completes
    pub result: Option<Val>,

    /// Frame count beyond which pushes yield a depth exception
    pub max_depth: usize,
}

impl Machine {
    /// Create a machine whose root frame evaluates `root` in `env`
    pub fn new(program: &Program, root: NodeId, env: Env, max_depth: usize) -> Self {
        let mut machine = Machine {
            frames: Vec::new(),
            result: None,
            max_depth,
        };
        push_frame(&mut machine, program, root, env);
        machine
    }

    pub fn is_done(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/* ===================== Frame Management ===================== */

/// Push a frame for `node`
///
/// Blocks open a child scope; every other node evaluates in `env`. Past the
/// depth bound the node is not entered and its value is a depth exception.
pub fn push_frame(machine: &mut Machine, program: &Program, node: NodeId, env: Env) {
    if machine.frames.len() >= machine.max_depth {
        warn!(node = %node, limit = machine.max_depth, "frame depth limit reached");
        let limit = machine.max_depth;
        deliver(
            machine,
            Val::exception(ExceptionKind::DepthLimit { limit }, Some(node)),
        );
        return;
    }

    let (kind, env) = match program.get(node) {
        Some(NodeKind::Block(_)) => (FrameKind::Operands, env.child()),
        Some(NodeKind::Reaction { .. }) => (
            FrameKind::Reaction {
                phase: ReactionPhase::Enter,
            },
            env,
        ),
        Some(NodeKind::Borrow { .. }) => (
            FrameKind::Borrow {
                phase: BorrowPhase::Enter,
            },
            env,
        ),
        _ => (FrameKind::Operands, env),
    };
    machine.frames.push(Frame::new(node, kind, env));
}

/// Pop the active frame, recording `value` as its node's latest value and
/// handing it to the enclosing frame
pub fn complete(machine: &mut Machine, node_values: &mut HashMap<NodeId, Val>, value: Val) {
    if let Some(frame) = machine.frames.pop() {
        node_values.insert(frame.node, value.clone());
    }
    deliver(machine, value);
}

fn deliver(machine: &mut Machine, value: Val) {
    match machine.frames.last_mut() {
        Some(parent) => parent.values.push(value),
        None => machine.result = Some(value),
    }
}

/* ===================== Step Result ===================== */

/// Result of driving a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More work remains
    Continue,
    /// A bounded run used up its budget before finishing
    Yield,
    /// The root expression has a value
    Done,
}
