pub mod cli;
pub mod config;
pub mod interpreter;

// Re-export the embedding surface
pub use config::EngineConfig;
pub use interpreter::{EngineError, Evaluator, Expr, Program, Val};
