//! Tests for the interpreter
//!
//! Organized by feature area

mod helpers;

mod lifecycle_tests;
mod native_tests;
mod stream_tests;
