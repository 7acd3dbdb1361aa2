//! Harness configuration: YAML file merged with command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG: &str = "config.yml";

/// Everything a subcommand may need. All fields are optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub test_dirs: Vec<PathBuf>,
    pub ref_dirs: Vec<PathBuf>,
    pub query_dirs: Vec<PathBuf>,
    pub exe_path: Option<PathBuf>,
    pub test_out: Option<PathBuf>,
    pub bench_out: Option<PathBuf>,
    pub ref_ver: Option<String>,
    pub cmp_ver: Option<String>,
    pub out_ver: Option<String>,
    /// Empty means every discovered suite.
    pub test_suites: Vec<String>,
    pub scratch_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub keep_scratch: bool,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Directory searched recursively for suite-*.yml (repeatable)
    #[arg(long = "test-dir")]
    pub test_dirs: Vec<PathBuf>,

    /// Directory holding ref-*.yml records (repeatable)
    #[arg(long = "ref-dir")]
    pub ref_dirs: Vec<PathBuf>,

    /// Directory holding query-*.yml definitions (repeatable)
    #[arg(long = "query-dir")]
    pub query_dirs: Vec<PathBuf>,

    /// Program under test
    #[arg(long = "exe", env = "SCITEST_EXE")]
    pub exe_path: Option<PathBuf>,

    /// Where test- records are written
    #[arg(long)]
    pub test_out: Option<PathBuf>,

    /// Where ref- records are written
    #[arg(long)]
    pub bench_out: Option<PathBuf>,

    /// Reference version to compare against (default: latest found)
    #[arg(long)]
    pub ref_ver: Option<String>,

    /// Stored version to compare with the reference
    #[arg(long)]
    pub cmp_ver: Option<String>,

    /// Version stamped on written records (default: today)
    #[arg(long)]
    pub out_ver: Option<String>,

    /// Only run these suites (repeatable)
    #[arg(short = 's', long = "suite")]
    pub test_suites: Vec<String>,

    /// Parent directory of per-test scratch directories
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Kill the program after this many seconds (0 disables)
    #[arg(long = "timeout")]
    pub timeout_secs: Option<u64>,

    /// Leave scratch directories behind for inspection
    #[arg(long)]
    pub keep_scratch: bool,
}

/// A config field a subcommand cannot do without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    TestDirs,
    RefDirs,
    QueryDirs,
    ExePath,
    TestOut,
    BenchOut,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::TestDirs => "test_dirs",
            Field::RefDirs => "ref_dirs",
            Field::QueryDirs => "query_dirs",
            Field::ExePath => "exe_path",
            Field::TestOut => "test_out",
            Field::BenchOut => "bench_out",
        }
    }
}

fn anchor(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn anchor_all(base: &Path, paths: &mut [PathBuf]) {
    for path in paths {
        anchor(base, path);
    }
}

impl HarnessConfig {
    /// Parse a config file; relative paths are taken relative to its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    /// Load `explicit` (which must exist), else [`DEFAULT_CONFIG`] if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG).is_file() => Self::load(Path::new(DEFAULT_CONFIG)),
            None => {
                tracing::debug!("no config file, using command-line values only");
                Ok(Self::default())
            }
        }
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        anchor_all(base, &mut self.test_dirs);
        anchor_all(base, &mut self.ref_dirs);
        anchor_all(base, &mut self.query_dirs);
        for path in [
            &mut self.test_out,
            &mut self.bench_out,
            &mut self.scratch_dir,
        ]
        .into_iter()
        .flatten()
        {
            anchor(base, path);
        }
        // A bare program name is looked up on PATH, so only anchor real paths.
        if let Some(exe) = &mut self.exe_path {
            if exe.components().count() > 1 {
                anchor(base, exe);
            }
        }
    }

    /// Apply command-line values: scalars replace, non-empty lists replace.
    pub fn apply(&mut self, o: Overrides) {
        fn list<T>(target: &mut Vec<T>, value: Vec<T>) {
            if !value.is_empty() {
                *target = value;
            }
        }
        fn scalar<T>(target: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *target = value;
            }
        }
        list(&mut self.test_dirs, o.test_dirs);
        list(&mut self.ref_dirs, o.ref_dirs);
        list(&mut self.query_dirs, o.query_dirs);
        list(&mut self.test_suites, o.test_suites);
        scalar(&mut self.exe_path, o.exe_path);
        scalar(&mut self.test_out, o.test_out);
        scalar(&mut self.bench_out, o.bench_out);
        scalar(&mut self.ref_ver, o.ref_ver);
        scalar(&mut self.cmp_ver, o.cmp_ver);
        scalar(&mut self.out_ver, o.out_ver);
        scalar(&mut self.scratch_dir, o.scratch_dir);
        scalar(&mut self.timeout_secs, o.timeout_secs);
        self.keep_scratch |= o.keep_scratch;
    }

    fn has(&self, field: Field) -> bool {
        match field {
            Field::TestDirs => !self.test_dirs.is_empty(),
            Field::RefDirs => !self.ref_dirs.is_empty(),
            Field::QueryDirs => !self.query_dirs.is_empty(),
            Field::ExePath => self.exe_path.is_some(),
            Field::TestOut => self.test_out.is_some(),
            Field::BenchOut => self.bench_out.is_some(),
        }
    }

    /// Fail with every missing field named at once.
    pub fn require(&self, fields: &[Field]) -> Result<()> {
        let missing: Vec<&str> = fields
            .iter()
            .filter(|f| !self.has(**f))
            .map(Field::name)
            .collect();
        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }
        Ok(())
    }

    /// `test_suites` as the filter expected by suite loading.
    pub fn suite_filter(&self) -> Option<&[String]> {
        (!self.test_suites.is_empty()).then_some(self.test_suites.as_slice())
    }
}
