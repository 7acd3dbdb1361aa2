//! In-memory stand-ins for the execution collaborator (testing only)
//!
//! `MemoryOutput` serves file contents from a map, `ScriptedExecutor`
//! replays a fixed outcome per test and records the invocations it saw.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::exec::{ExecResult, ExecutionError, ExecutionService, Invocation};
use crate::query::{ExtractionError, ProgramOutput};

// ---------------------------------------------------------------------------
// MemoryOutput
// ---------------------------------------------------------------------------

/// Program output held in memory, keyed by file extension.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    prefix: String,
    files: HashMap<String, String>,
}

impl MemoryOutput {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            files: HashMap::new(),
        }
    }

    pub fn with_file(mut self, ext: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(ext.into(), contents.into());
        self
    }

    pub fn with_stdout(self, contents: impl Into<String>) -> Self {
        self.with_file("stdout", contents)
    }
}

impl ProgramOutput for MemoryOutput {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn read(&self, file_ext: &str) -> Result<String, ExtractionError> {
        self.files.get(file_ext).cloned().ok_or_else(|| {
            ExtractionError::new(format!("File {}.{} not found", self.prefix, file_ext))
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Script {
    Output(HashMap<String, String>),
    Fail(String),
}

/// Execution service that answers from a per-test script.
///
/// Tests without a script fail with a spawn error.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<String, Script>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `test_name` with `stdout` as the `.stdout` file.
    pub fn with_stdout(self, test_name: &str, stdout: impl Into<String>) -> Self {
        self.with_file(test_name, "stdout", stdout)
    }

    pub fn with_file(
        mut self,
        test_name: &str,
        ext: impl Into<String>,
        contents: impl Into<String>,
    ) -> Self {
        let entry = self
            .scripts
            .entry(test_name.to_string())
            .or_insert_with(|| Script::Output(HashMap::new()));
        if let Script::Output(files) = entry {
            files.insert(ext.into(), contents.into());
        } else {
            *entry = Script::Output(HashMap::from([(ext.into(), contents.into())]));
        }
        self
    }

    /// Make `test_name` fail with a non-zero exit.
    pub fn with_failure(mut self, test_name: &str, stderr: impl Into<String>) -> Self {
        self.scripts
            .insert(test_name.to_string(), Script::Fail(stderr.into()));
        self
    }

    /// Invocations received so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ExecutionService for ScriptedExecutor {
    async fn run(&self, invocation: &Invocation) -> ExecResult<Box<dyn ProgramOutput>> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        match self.scripts.get(&invocation.test_name) {
            Some(Script::Output(files)) => {
                let output = files
                    .iter()
                    .fold(MemoryOutput::new(&invocation.prefix), |out, (ext, text)| {
                        out.with_file(ext.clone(), text.clone())
                    });
                Ok(Box::new(output))
            }
            Some(Script::Fail(stderr)) => Err(ExecutionError::NonZeroExit {
                program: "scripted".to_string(),
                code: Some(1),
                stderr_tail: stderr.clone(),
            }),
            None => Err(ExecutionError::Spawn {
                program: "scripted".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no script for test {:?}", invocation.test_name),
                ),
            }),
        }
    }
}
