//! Fault tiers
//!
//! `ExceptionKind` describes value-level failures. They travel through the
//! program as ordinary `Val::Exception` values and never abort a run.
//!
//! `EngineError` covers the other two tiers: engine defects (fatal, the run
//! halts) and host faults (rejected synchronously at the call site).

use thiserror::Error;

/* ===================== Value-Level Exceptions ===================== */

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExceptionKind {
    #[error("type mismatch: expected {expected}, received {received}")]
    TypeMismatch { expected: String, received: String },

    #[error("unbound name {name}")]
    UnboundName { name: String },

    #[error("missing stream {name}")]
    MissingStream { name: String },

    #[error("stream {name} has no value yet")]
    StreamAbsent { name: String },

    #[error("expected {expected} inputs, received {received}")]
    ArityMismatch { expected: usize, received: usize },

    #[error("{kind} has no function {name}")]
    UnknownFunction { kind: String, name: String },

    #[error("{subject} has no field {name}")]
    UnknownField { subject: String, name: String },

    #[error("{received} is not a function")]
    NotCallable { received: String },

    #[error("incompatible units {left} and {right}")]
    IncompatibleUnits { left: String, right: String },

    #[error("reaction condition does not reference a stream")]
    ExpectedStream,

    #[error("reaction reached while another reaction is evaluating")]
    NestedReaction,

    #[error("source {name} borrows itself")]
    CyclicBorrow { name: String },

    #[error("unknown source {name}")]
    UnknownSource { name: String },

    #[error("evaluation exceeded {limit} nested frames")]
    DepthLimit { limit: usize },

    #[error("index {index} is out of bounds for length {length}")]
    IndexOutOfBounds { index: String, length: usize },

    #[error("no entry for key {key}")]
    MissingKey { key: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("block has no value")]
    NoValue,

    #[error("text would exceed {limit} bytes")]
    TextTooLong { limit: usize },

    /// A nested evaluation was cut short by an engine defect
    #[error("evaluation interrupted")]
    Interrupted,
}

/* ===================== Engine and Host Faults ===================== */

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Internal invariant violated. The run halts.
    #[error("engine defect: {0}")]
    Defect(String),

    /// The run halted earlier and must be restarted by the host
    #[error("run halted: {0}")]
    Halted(String),

    #[error("evaluator has not been started")]
    NotStarted,

    #[error("stream {name} is already registered as {existing}, not {requested}")]
    StreamConflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("stream {name} carries {expected} values, received {received}")]
    StreamKindMismatch {
        name: String,
        expected: String,
        received: String,
    },

    #[error("unknown stream {0}")]
    UnknownStream(String),

    #[error("stream {0} no longer accepts values")]
    StreamClosed(String),
}

impl EngineError {
    pub fn defect(message: impl Into<String>) -> Self {
        EngineError::Defect(message.into())
    }

    /// Whether this error stops the run, as opposed to rejecting one host call
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Defect(_) | EngineError::Halted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_messages() {
        let kind = ExceptionKind::TypeMismatch {
            expected: "Number".into(),
            received: "\"x\"".into(),
        };
        assert_eq!(kind.to_string(), "type mismatch: expected Number, received \"x\"");
        assert_eq!(
            ExceptionKind::ArityMismatch {
                expected: 2,
                received: 1
            }
            .to_string(),
            "expected 2 inputs, received 1"
        );
    }

    #[test]
    fn test_fatal_tiers() {
        assert!(EngineError::defect("corrupt").is_fatal());
        assert!(!EngineError::UnknownStream("Key".into()).is_fatal());
        assert_eq!(
            EngineError::defect("corrupt").to_string(),
            "engine defect: corrupt"
        );
    }
}
