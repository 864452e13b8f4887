//! # Reactive tree-walking interpreter
//!
//! ## Core Principles
//!
//! 1. **Stack-driven execution**: all evaluation state lives in a frame
//!    stack, never the host call stack, so a run can be stepped and stopped
//!    at any point
//! 2. **Exceptions are values**: failures travel through the program like
//!    any other result; only engine defects abort a run
//! 3. **Memoized reactions**: a reaction's value is recomputed only when a
//!    stream it watches advanced at a flush
//! 4. **Pooled input**: pushes are buffered until `flush`, so many events
//!    between flushes cost one recomputation

pub mod borrow;
pub mod calls;
pub mod errors;
pub mod evaluator;
pub mod exec_loop;
pub mod expressions;
pub mod native;
pub mod reactions;
pub mod runtime;
pub mod streams;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use errors::{EngineError, ExceptionKind};
pub use evaluator::{Evaluator, ObserverId, RunState, Update, UpdateCause};
pub use reactions::ReactionState;
pub use streams::{StreamKind, StreamSender};
pub use types::{Datum, Expr, NodeId, Program, Val, ValueKind};
pub use vm::Step;
