//! Process execution of the program under test.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scitest_core::exec::{ExecResult, ExecutionError, ExecutionService, Invocation};
use scitest_core::query::ProgramOutput;
use tokio::process::Command;

use crate::fixture::{prepare, ScratchOutput};

/// Lines of stderr kept in a [`ExecutionError::NonZeroExit`] message.
const STDERR_TAIL_LINES: usize = 5;

/// Runs one executable per test inside a fresh scratch directory.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    exe_path: PathBuf,
    scratch_root: PathBuf,
    /// Zero disables the timeout.
    timeout_secs: u64,
    keep_scratch: bool,
}

impl ProcessExecutor {
    pub fn new(exe_path: impl Into<PathBuf>) -> Self {
        Self {
            exe_path: exe_path.into(),
            scratch_root: std::env::temp_dir().join("scitest"),
            timeout_secs: 0,
            keep_scratch: false,
        }
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_keep_scratch(mut self, keep: bool) -> Self {
        self.keep_scratch = keep;
        self
    }

    pub fn exe_path(&self) -> &Path {
        &self.exe_path
    }

    /// The child runs in the scratch directory, so a relative path with a
    /// directory part is anchored to our own working directory first.
    fn program(&self) -> ExecResult<PathBuf> {
        let has_dir = self
            .exe_path
            .parent()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if self.exe_path.is_relative() && has_dir {
            let cwd = std::env::current_dir().map_err(|e| ExecutionError::Io {
                path: ".".to_string(),
                source: e,
            })?;
            Ok(cwd.join(&self.exe_path))
        } else {
            Ok(self.exe_path.clone())
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

async fn write_capture(path: PathBuf, bytes: &[u8]) -> ExecResult<()> {
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| ExecutionError::Io {
            path: path.display().to_string(),
            source,
        })
}

#[async_trait]
impl ExecutionService for ProcessExecutor {
    async fn run(&self, invocation: &Invocation) -> ExecResult<Box<dyn ProgramOutput>> {
        let start = Instant::now();
        let program = self.program()?;
        let program_name = program.display().to_string();

        let root = self.scratch_root.clone();
        let owned = invocation.clone();
        let keep = self.keep_scratch;
        let scratch = tokio::task::spawn_blocking(move || prepare(&root, &owned, keep))
            .await
            .map_err(|e| ExecutionError::Fixture {
                reason: format!("setup task failed: {e}"),
            })??;

        tracing::debug!(
            test = %invocation.test_name,
            dir = %scratch.path().display(),
            args = ?invocation.args,
            "starting program"
        );

        let child = Command::new(&program)
            .args(&invocation.args)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: program_name.clone(),
                source,
            })?;

        let waited = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| ExecutionError::Timeout {
                program: program_name.clone(),
                secs: self.timeout_secs,
            })?
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|source| ExecutionError::Spawn {
            program: program_name.clone(),
            source,
        })?;

        let output_handle = ScratchOutput::new(scratch, invocation.prefix.clone());
        write_capture(output_handle.file_path("stdout"), &output.stdout).await?;
        write_capture(output_handle.file_path("stderr"), &output.stderr).await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecutionError::NonZeroExit {
                program: program_name,
                code: output.status.code(),
                stderr_tail: tail(&stderr, STDERR_TAIL_LINES),
            });
        }

        tracing::debug!(test = %invocation.test_name, duration_ms, "program finished");
        Ok(Box::new(output_handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("only", 5), "only");
        assert_eq!(tail("", 5), "");
    }

    #[test]
    fn test_bare_program_name_left_for_path_lookup() {
        let exec = ProcessExecutor::new("sh");
        assert_eq!(exec.program().unwrap(), PathBuf::from("sh"));

        let exec = ProcessExecutor::new("bin/solver");
        let resolved = exec.program().unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("bin/solver"));
    }
}
