//! scitest exec - runs the program under test
//!
//! Provides the process-backed [`ExecutionService`](scitest_core::ExecutionService):
//! - Creates a scratch directory per test and copies its inputs in
//! - Runs the executable there with an optional timeout
//! - Captures stdout/stderr as `<prefix>.stdout` and `<prefix>.stderr`

pub mod fixture;
pub mod runner;

pub use fixture::{prepare, ScratchDir, ScratchOutput};
pub use runner::ProcessExecutor;
