//! Execution phase enums for frames with more than one stage
//!
//! Ordinary expression frames only need their operand cursor. Reactions and
//! borrows go through fixed stages, tracked here.

use serde::{Deserialize, Serialize};

/// Execution phase for a reaction reached for the first time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReactionPhase {
    /// Look up the memo, or begin evaluating the initial value
    Enter = 0,
    /// Initial value pending
    Initial = 1,
    /// Stream selector pending
    Condition = 2,
}

/// Execution phase for Borrow expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BorrowPhase {
    Enter = 0,
    /// The borrowed source's root is evaluating
    Source = 1,
}
