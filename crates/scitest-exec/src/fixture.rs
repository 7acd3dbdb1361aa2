//! Scratch directory setup and the output handle over it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use scitest_core::exec::{ExecResult, ExecutionError, InputFile, Invocation};
use scitest_core::query::{ExtractionError, ProgramOutput};
use scitest_core::suite::stays_inside;
use tempfile::TempDir;

fn io_error(path: &Path, source: io::Error) -> ExecutionError {
    ExecutionError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// A test's working directory. Removed on drop unless kept.
#[derive(Debug)]
pub enum ScratchDir {
    Temporary(TempDir),
    Kept(PathBuf),
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        match self {
            ScratchDir::Temporary(dir) => dir.path(),
            ScratchDir::Kept(path) => path,
        }
    }
}

/// Copy a file, or a directory tree, to `dest`.
fn copy_tree(source: &Path, dest: &Path) -> ExecResult<()> {
    let meta = fs::metadata(source).map_err(|e| io_error(source, e))?;
    if meta.is_dir() {
        fs::create_dir_all(dest).map_err(|e| io_error(dest, e))?;
        for entry in fs::read_dir(source).map_err(|e| io_error(source, e))? {
            let entry = entry.map_err(|e| io_error(source, e))?;
            copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::copy(source, dest).map_err(|e| io_error(source, e))?;
    }
    Ok(())
}

fn copy_input(root: &Path, input: &InputFile) -> ExecResult<()> {
    if !stays_inside(&input.dest) {
        return Err(ExecutionError::Fixture {
            reason: format!(
                "input destination {} leaves the test directory",
                input.dest.display()
            ),
        });
    }
    copy_tree(&input.source, &root.join(&input.dest))
}

/// Create a scratch directory under `scratch_root` and copy the inputs into it.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn prepare(scratch_root: &Path, invocation: &Invocation, keep: bool) -> ExecResult<ScratchDir> {
    fs::create_dir_all(scratch_root).map_err(|e| io_error(scratch_root, e))?;
    let dir = tempfile::Builder::new()
        .prefix(&format!("{}-{}-", invocation.suite_name, invocation.test_name))
        .tempdir_in(scratch_root)
        .map_err(|e| io_error(scratch_root, e))?;

    for input in &invocation.inputs {
        copy_input(dir.path(), input)?;
    }

    Ok(if keep {
        ScratchDir::Kept(dir.into_path())
    } else {
        ScratchDir::Temporary(dir)
    })
}

/// Output of one run: files named `<prefix>.<ext>` inside the scratch directory.
#[derive(Debug)]
pub struct ScratchOutput {
    dir: ScratchDir,
    prefix: String,
}

impl ScratchOutput {
    pub fn new(dir: ScratchDir, prefix: impl Into<String>) -> Self {
        Self {
            dir,
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn file_path(&self, file_ext: &str) -> PathBuf {
        self.dir.path().join(format!("{}.{}", self.prefix, file_ext))
    }
}

impl ProgramOutput for ScratchOutput {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn read(&self, file_ext: &str) -> Result<String, ExtractionError> {
        let path = self.file_path(file_ext);
        match fs::read(&path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ExtractionError::new(format!(
                "File {}.{} not found",
                self.prefix, file_ext
            ))),
            Err(e) => Err(ExtractionError::new(format!(
                "Could not read {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(inputs: Vec<InputFile>) -> Invocation {
        Invocation {
            suite_name: "demo".into(),
            test_name: "t1".into(),
            prefix: "t1".into(),
            args: vec![],
            inputs,
        }
    }

    #[test]
    fn test_inputs_copied_including_directories() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.dat"), "1 2 3").unwrap();
        fs::create_dir_all(src.path().join("mesh/fine")).unwrap();
        fs::write(src.path().join("mesh/fine/m.txt"), "mesh").unwrap();
        let root = TempDir::new().unwrap();

        let scratch = prepare(
            root.path(),
            &invocation(vec![
                InputFile { source: src.path().join("a.dat"), dest: "in/a.dat".into() },
                InputFile { source: src.path().join("mesh"), dest: "mesh".into() },
            ]),
            false,
        )
        .unwrap();

        assert_eq!(fs::read_to_string(scratch.path().join("in/a.dat")).unwrap(), "1 2 3");
        assert_eq!(
            fs::read_to_string(scratch.path().join("mesh/fine/m.txt")).unwrap(),
            "mesh"
        );
        let name = scratch.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("demo-t1-"));
    }

    #[test]
    fn test_escaping_destination_rejected() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.dat"), "x").unwrap();
        let root = TempDir::new().unwrap();
        let err = prepare(
            root.path(),
            &invocation(vec![InputFile {
                source: src.path().join("a.dat"),
                dest: "../a.dat".into(),
            }]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::Fixture { .. }));
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let root = TempDir::new().unwrap();
        let err = prepare(
            root.path(),
            &invocation(vec![InputFile {
                source: root.path().join("nope"),
                dest: "nope".into(),
            }]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::Io { .. }));
    }

    #[test]
    fn test_scratch_removed_unless_kept() {
        let root = TempDir::new().unwrap();
        let temp = prepare(root.path(), &invocation(vec![]), false).unwrap();
        let temp_path = temp.path().to_path_buf();
        drop(temp);
        assert!(!temp_path.exists());

        let kept = prepare(root.path(), &invocation(vec![]), true).unwrap();
        let kept_path = kept.path().to_path_buf();
        drop(kept);
        assert!(kept_path.is_dir());
    }

    #[test]
    fn test_output_reads_prefixed_files() {
        let root = TempDir::new().unwrap();
        let scratch = prepare(root.path(), &invocation(vec![]), false).unwrap();
        fs::write(scratch.path().join("t1.stdout"), "E = 1.5\n").unwrap();
        let output = ScratchOutput::new(scratch, "t1");
        assert_eq!(output.read("stdout").unwrap(), "E = 1.5\n");
        assert_eq!(
            output.read("log").unwrap_err().reason,
            "File t1.log not found"
        );
    }
}
