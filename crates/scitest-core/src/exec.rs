//! Execution collaborator seam.
//!
//! The engine never runs programs itself. It hands an [`Invocation`] to an
//! [`ExecutionService`] and gets back a [`ProgramOutput`] handle for the
//! queries to read, or an [`ExecutionError`] that fails just that test.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::query::ProgramOutput;

/// Result type for execution operations
pub type ExecResult<T> = std::result::Result<T, ExecutionError>;

/// Why a program run did not produce usable output.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with {}: {stderr_tail}", .code.map_or("a signal".to_string(), |c| format!("status {c}")))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("could not prepare test directory: {reason}")]
    Fixture { reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One input file to place in the test directory before the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Absolute (or base-dir resolved) path of the source file.
    pub source: PathBuf,
    /// Path relative to the test directory.
    pub dest: PathBuf,
}

/// Everything the collaborator needs to run one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub suite_name: String,
    pub test_name: String,
    /// Output files are named `<prefix>.<ext>`.
    pub prefix: String,
    pub args: Vec<String>,
    pub inputs: Vec<InputFile>,
}

/// Runs the program under test.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Run once and return a handle over the files it left behind.
    async fn run(&self, invocation: &Invocation) -> ExecResult<Box<dyn ProgramOutput>>;
}
