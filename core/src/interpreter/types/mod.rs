//! Type definitions for the engine
//!
//! - Syntax tree and node arena (`Expr`, `Program`)
//! - Runtime values (`Val`) and scopes (`Env`)
//! - Frames and their phases

pub mod ast;
pub mod control;
pub mod env;
pub mod phase;
pub mod values;

pub use ast::{Expr, NodeId, NodeKind, Program, Source, TypeTag};
pub use control::{Frame, FrameKind};
pub use env::{Env, ScopeRegistry};
pub use phase::{BorrowPhase, ReactionPhase};
pub use values::{
    Closure, Datum, Exception, Function, Number, StructureDef, StructureVal, Unit, Val, ValueKind,
};
