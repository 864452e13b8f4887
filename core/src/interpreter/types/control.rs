//! Execution frame types

use super::ast::NodeId;
use super::env::Env;
use super::phase::{BorrowPhase, ReactionPhase};
use super::values::Val;

/* ===================== Frames ===================== */

/// Frame kind - how the engine advances a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Evaluating child operands left to right, then combining them
    Operands,
    /// Waiting on one delegated frame (function body, chosen branch) whose
    /// value becomes this frame's value
    Body,
    Reaction { phase: ReactionPhase },
    Borrow { phase: BorrowPhase },
}

/// Execution frame - one per expression being evaluated
///
/// The frame stack replaces the host call stack, so evaluation can be
/// suspended between any two steps and discarded at any point.
#[derive(Debug, Clone)]
pub struct Frame {
    pub node: NodeId,

    pub kind: FrameKind,

    /// Values produced by completed child frames, in order
    pub values: Vec<Val>,

    /// Scope this frame evaluates in
    pub env: Env,
}

impl Frame {
    pub fn new(node: NodeId, kind: FrameKind, env: Env) -> Self {
        Frame {
            node,
            kind,
            values: Vec::new(),
            env,
        }
    }
}
