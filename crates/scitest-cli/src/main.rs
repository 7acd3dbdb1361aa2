//! scitest - integration-test harness for scientific programs
//!
//! ## Commands
//!
//! - `test`: run suites and compare with reference records
//! - `bench`: run suites and store the results as new reference records
//! - `compare`: compare two stored versions without running anything
//! - `clean`: delete test records
//! - `check-config`: load every definition and print a summary

mod config;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use scitest_core::store::{
    clean_test_records, discover_records, load_query_dirs, load_record, load_suites,
    record_versions, select_records, write_record,
};
use scitest_core::{
    compare_suite_results, obs, reporting, telemetry, Baseline, FileLoader, LoadingContext,
    RecordFile, RecordKind, Suite, SuiteReport, SuiteResult, SuiteRunner, TypeKind, TypeRegistry,
    Version, WriteMode,
};
use scitest_exec::ProcessExecutor;

use config::{Field, HarnessConfig, Overrides};

#[derive(Parser)]
#[command(name = "scitest")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Integration-test harness for scientific programs", long_about = None)]
struct Cli {
    /// Config file (default: config.yml in the working directory, if present)
    #[arg(short, long, global = true, env = "SCITEST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and a JSON report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run suites and compare the results with a reference version
    Test {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run suites and store the results as reference records
    Bench {
        #[command(flatten)]
        overrides: Overrides,

        /// Replace an existing reference record of the same version
        #[arg(long)]
        overwrite: bool,
    },

    /// Compare two stored versions without running the program
    Compare {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Delete test records from the test output directory
    Clean {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Load all definitions and print what was found
    CheckConfig {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// How results are printed.
#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    telemetry::init_tracing(cli.json, level);

    let output = Output {
        json: cli.json,
        verbose: cli.verbose,
    };
    let mut config = HarnessConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Test { overrides } => {
            config.apply(overrides);
            cmd_test(&config, output).await
        }
        Commands::Bench {
            overrides,
            overwrite,
        } => {
            config.apply(overrides);
            cmd_bench(&config, overwrite, output).await
        }
        Commands::Compare { overrides } => {
            config.apply(overrides);
            cmd_compare(&config, output)
        }
        Commands::Clean { overrides } => {
            config.apply(overrides);
            cmd_clean(&config)
        }
        Commands::CheckConfig { overrides } => {
            config.apply(overrides);
            cmd_check_config(&config, output)
        }
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

/// Query definitions and suites loaded for one command.
struct Session {
    ctx: LoadingContext,
    suites: Vec<Suite>,
}

impl Session {
    fn load(config: &HarnessConfig, with_suites: bool) -> Result<Self> {
        let mut ctx = LoadingContext::new(TypeRegistry::builtin());
        load_query_dirs(&mut ctx, &config.query_dirs, &FileLoader)
            .context("Failed to load query definitions")?;
        let suites = if with_suites {
            load_suites(&config.test_dirs, config.suite_filter(), &ctx, &FileLoader)
                .context("Failed to load suites")?
        } else {
            Vec::new()
        };
        Ok(Self { ctx, suites })
    }
}

fn parse_version(field: &str, token: &str) -> Result<Version> {
    Version::parse(token).with_context(|| format!("Invalid {field} {token:?}"))
}

fn out_version(config: &HarnessConfig) -> Result<Version> {
    match &config.out_ver {
        Some(token) => parse_version("out_ver", token),
        None => Ok(Version::today()),
    }
}

/// `requested`, or the latest version among `records`.
fn pick_version(field: &str, requested: Option<&str>, records: &[RecordFile]) -> Result<Version> {
    match requested {
        Some(token) => parse_version(field, token),
        None => Version::latest(&record_versions(records))
            .with_context(|| format!("Cannot pick a default {field}"))?
            .with_context(|| format!("No records found to pick a default {field} from")),
    }
}

fn executor(config: &HarnessConfig) -> Result<ProcessExecutor> {
    let exe = config
        .exe_path
        .clone()
        .context("Missing required configuration: exe_path")?;
    let mut executor = ProcessExecutor::new(exe)
        .with_timeout_secs(config.timeout_secs.unwrap_or(0))
        .with_keep_scratch(config.keep_scratch);
    if let Some(dir) = &config.scratch_dir {
        executor = executor.with_scratch_root(dir);
    }
    Ok(executor)
}

fn required_dir<'c>(dir: &'c Option<PathBuf>, field: &str) -> Result<&'c Path> {
    dir.as_deref()
        .with_context(|| format!("Missing required configuration: {field}"))
}

fn print_reports(reports: &[SuiteReport], output: Output) -> Result<()> {
    if output.json {
        println!("{}", reporting::render_json(reports)?);
    } else {
        for report in reports {
            print!("{}", reporting::render_text(report, output.verbose));
        }
        println!();
        println!("{}", reporting::render_summary(reports));
    }
    Ok(())
}

fn verdict(reports: &[SuiteReport]) -> Result<()> {
    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed == 0 {
        Ok(())
    } else {
        bail!("{failed} of {} suite(s) failed", reports.len())
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Run suites against the reference and write test records
async fn cmd_test(config: &HarnessConfig, output: Output) -> Result<()> {
    config.require(&[
        Field::QueryDirs,
        Field::TestDirs,
        Field::RefDirs,
        Field::ExePath,
        Field::TestOut,
    ])?;
    let session = Session::load(config, true)?;
    let test_out = required_dir(&config.test_out, "test_out")?;

    let references = discover_records(&config.ref_dirs, &[RecordKind::Reference])?;
    let ref_ver = pick_version("ref_ver", config.ref_ver.as_deref(), &references)?;
    let selected = select_records(&references, &ref_ver)?;
    let out_ver = out_version(config)?;
    let executor = executor(config)?;

    info!(ref_ver = %ref_ver, out_ver = %out_ver, suites = session.suites.len(), "running tests");
    let mut runner = SuiteRunner::new(&session.ctx, &executor);
    let mut reports = Vec::new();
    for suite in &session.suites {
        let reference = selected
            .get(&suite.name)
            .map(|file| load_record(file, &session.ctx, &FileLoader))
            .transpose()?;
        let baseline = match &reference {
            Some(record) => Baseline::Reference(record),
            None => Baseline::Missing { version: &ref_ver },
        };
        let run = runner.run_suite(suite, baseline, &out_ver).await;
        let path = write_record(
            &run.record,
            test_out,
            RecordKind::Test,
            WriteMode::Overwrite,
            &session.ctx,
            &FileLoader,
        )?;
        obs::emit_record_written(&path, "test");
        reports.push(run.report);
    }

    print_reports(&reports, output)?;
    verdict(&reports)
}

/// Run suites and store the results as reference records
async fn cmd_bench(config: &HarnessConfig, overwrite: bool, output: Output) -> Result<()> {
    config.require(&[
        Field::QueryDirs,
        Field::TestDirs,
        Field::ExePath,
        Field::BenchOut,
    ])?;
    let session = Session::load(config, true)?;
    let bench_out = required_dir(&config.bench_out, "bench_out")?;
    let out_ver = out_version(config)?;
    let executor = executor(config)?;
    let mode = if overwrite {
        WriteMode::Overwrite
    } else {
        WriteMode::CreateNew
    };

    let mut runner = SuiteRunner::new(&session.ctx, &executor);
    let mut reports = Vec::new();
    for suite in &session.suites {
        let run = runner.run_suite(suite, Baseline::None, &out_ver).await;
        let path = write_record(
            &run.record,
            bench_out,
            RecordKind::Reference,
            mode,
            &session.ctx,
            &FileLoader,
        )
        .with_context(|| format!("Failed to store benchmark for suite {}", suite.name))?;
        obs::emit_record_written(&path, "ref");
        if !output.json {
            println!("✓ {} -> {}", suite.name, path.display());
        }
        reports.push(run.report);
    }

    print_reports(&reports, output)?;
    verdict(&reports)
}

/// Candidate records at `version`: test records first, references fill the gaps.
fn candidate_records<'r>(
    tests: &'r [RecordFile],
    references: &'r [RecordFile],
    version: &Version,
) -> Result<BTreeMap<String, &'r RecordFile>> {
    let mut selected = select_records(tests, version)?;
    for (suite, file) in select_records(references, version)? {
        selected.entry(suite).or_insert(file);
    }
    Ok(selected)
}

/// Compare stored records of two versions
fn cmd_compare(config: &HarnessConfig, output: Output) -> Result<()> {
    config.require(&[Field::QueryDirs, Field::RefDirs])?;
    let session = Session::load(config, false)?;

    let references = discover_records(&config.ref_dirs, &[RecordKind::Reference])?;
    let tests = match &config.test_out {
        Some(dir) => discover_records(std::slice::from_ref(dir), &[RecordKind::Test])?,
        None => Vec::new(),
    };
    let ref_ver = pick_version("ref_ver", config.ref_ver.as_deref(), &references)?;
    let cmp_ver = pick_version("cmp_ver", config.cmp_ver.as_deref(), &tests)?;

    let baseline = select_records(&references, &ref_ver)?;
    let candidates = candidate_records(&tests, &references, &cmp_ver)?;

    let mut names: BTreeSet<&str> = baseline
        .keys()
        .chain(candidates.keys())
        .map(String::as_str)
        .collect();
    if let Some(filter) = config.suite_filter() {
        let unknown: Vec<&String> = filter.iter().filter(|n| !names.contains(n.as_str())).collect();
        if !unknown.is_empty() {
            bail!("No records for requested suites: {unknown:?}");
        }
        names.retain(|n| filter.iter().any(|f| f == n));
    }

    let run_id = obs::new_run_id();
    let mut reports = Vec::new();
    for name in names {
        let load = |file: Option<&&RecordFile>, version: &Version| -> Result<SuiteResult> {
            match file {
                Some(file) => Ok(load_record(file, &session.ctx, &FileLoader)?),
                None => Ok(SuiteResult::new(name, version.clone())),
            }
        };
        let reference = load(baseline.get(name), &ref_ver)?;
        let candidate = load(candidates.get(name), &cmp_ver)?;
        reports.push(compare_suite_results(
            &reference,
            &candidate,
            &session.ctx,
            &run_id,
        ));
    }

    print_reports(&reports, output)?;
    verdict(&reports)
}

/// Delete test records
fn cmd_clean(config: &HarnessConfig) -> Result<()> {
    config.require(&[Field::TestOut])?;
    let test_out = required_dir(&config.test_out, "test_out")?;
    let removed = clean_test_records(test_out)?;
    for path in &removed {
        info!(path = %path.display(), "removed test record");
    }
    println!("✓ Removed {} test record(s) from {}", removed.len(), test_out.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct ConfigSummary {
    query_types: Vec<String>,
    quantity_types: Vec<String>,
    queries: usize,
    query_sets: Vec<String>,
    suites: BTreeMap<String, usize>,
    reference_versions: Vec<String>,
}

fn summarize(config: &HarnessConfig) -> Result<ConfigSummary> {
    config.require(&[Field::QueryDirs, Field::TestDirs])?;
    let session = Session::load(config, true)?;
    let references = discover_records(&config.ref_dirs, &[RecordKind::Reference])?;
    let registry = session.ctx.registry();
    Ok(ConfigSummary {
        query_types: registry.names(TypeKind::Query).into_iter().map(String::from).collect(),
        quantity_types: registry
            .names(TypeKind::Quantity)
            .into_iter()
            .map(String::from)
            .collect(),
        queries: session.ctx.query_count(),
        query_sets: session.ctx.query_set_names().map(String::from).collect(),
        suites: session
            .suites
            .iter()
            .map(|s| (s.name.clone(), s.tests.len()))
            .collect(),
        reference_versions: record_versions(&references)
            .iter()
            .map(Version::to_string)
            .collect(),
    })
}

/// Load everything and print a summary
fn cmd_check_config(config: &HarnessConfig, output: Output) -> Result<()> {
    let summary = summarize(config)?;
    if output.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("✓ Configuration loaded");
    println!("Query types: {}", summary.query_types.join(", "));
    println!("Quantity types: {}", summary.quantity_types.join(", "));
    println!("Queries: {}", summary.queries);
    println!("Query sets: {}", summary.query_sets.join(", "));
    println!("Suites:");
    for (name, tests) in &summary.suites {
        println!("  - {name} ({tests} tests)");
    }
    if summary.reference_versions.is_empty() {
        println!("Reference versions: none");
    } else {
        println!("Reference versions: {}", summary.reference_versions.join(", "));
    }
    Ok(())
}
