//! Suite runner: execute each test, run its query sets, compare.
//!
//! Tests run one at a time in suite order; query sets and queries run in
//! declared order. An execution failure fails that test only.

use std::time::Instant;

use serde::Serialize;

use crate::compare::{compare_test, SuiteReport, TestComparison, TestOutcome};
use crate::exec::ExecutionService;
use crate::obs;
use crate::resolver::LoadingContext;
use crate::results::{ResultSet, SuiteResult};
use crate::suite::Suite;
use crate::version::Version;

/// Where a suite run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "test_index", rename_all = "snake_case")]
pub enum RunPhase {
    Loaded,
    Executing(usize),
    Comparing(usize),
    Reported,
}

/// What fresh results are compared against.
#[derive(Debug, Clone, Copy)]
pub enum Baseline<'r> {
    /// Nothing to compare with (benchmark generation).
    None,
    /// A reference version was requested but this suite has no record for it.
    Missing { version: &'r Version },
    Reference(&'r SuiteResult),
}

impl Baseline<'_> {
    fn version_label(&self) -> String {
        match self {
            Baseline::None => "none".to_string(),
            Baseline::Missing { version } => version.to_string(),
            Baseline::Reference(r) => r.version.to_string(),
        }
    }
}

/// Outcome of running one suite.
#[derive(Debug, Clone)]
pub struct SuiteRun {
    /// Fresh results, stamped with the output version; tests that failed to execute are absent.
    pub record: SuiteResult,
    pub report: SuiteReport,
}

impl SuiteRun {
    pub fn passed(&self) -> bool {
        self.report.passed()
    }
}

/// Drives one suite at a time through execute and compare.
pub struct SuiteRunner<'a> {
    ctx: &'a LoadingContext,
    executor: &'a dyn ExecutionService,
    run_id: String,
    phase: RunPhase,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(ctx: &'a LoadingContext, executor: &'a dyn ExecutionService) -> Self {
        Self {
            ctx,
            executor,
            run_id: obs::new_run_id(),
            phase: RunPhase::Loaded,
        }
    }

    /// Use a fixed run id instead of a random one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::trace!(?phase, "suite run phase");
        self.phase = phase;
    }

    /// Run every query set of a test against its program output.
    fn run_query_sets(
        &self,
        suite: &Suite,
        names: &[String],
        output: &dyn crate::query::ProgramOutput,
    ) -> Vec<ResultSet> {
        names
            .iter()
            .filter_map(|name| match self.ctx.query_set(name) {
                Some(set) => Some(set.run(output)),
                None => {
                    tracing::warn!(suite = %suite.name, query_set = %name, "query set vanished from context");
                    None
                }
            })
            .collect()
    }

    /// Execute `suite` and compare it with `baseline`.
    pub async fn run_suite(
        &mut self,
        suite: &Suite,
        baseline: Baseline<'_>,
        out_version: &Version,
    ) -> SuiteRun {
        let start = Instant::now();
        let _span = obs::SuiteSpan::enter(&self.run_id, &suite.name);
        let reference_label = baseline.version_label();
        obs::emit_suite_started(
            &suite.name,
            suite.tests.len(),
            (!matches!(baseline, Baseline::None)).then_some(reference_label.as_str()),
        );

        let mut record = SuiteResult::new(suite.name.clone(), out_version.clone());
        let mut report = SuiteReport::new(
            suite.name.clone(),
            reference_label,
            out_version.to_string(),
            self.run_id.clone(),
        );
        self.enter(RunPhase::Loaded);

        for (index, test) in suite.tests.iter().enumerate() {
            self.enter(RunPhase::Executing(index));
            let output = match self.executor.run(&test.invocation(&suite.name)).await {
                Ok(output) => output,
                Err(err) => {
                    obs::emit_test_execution_failed(&test.name, &err);
                    report
                        .tests
                        .push(TestComparison::execution_failed(&test.name, err.to_string()));
                    continue;
                }
            };
            let sets = self.run_query_sets(suite, &test.query_sets, output.as_ref());
            drop(output);
            let errors = sets
                .iter()
                .flat_map(|s| &s.results)
                .filter(|r| r.is_error())
                .count();
            obs::emit_test_executed(&test.name, sets.len(), errors);

            self.enter(RunPhase::Comparing(index));
            let comparison = match baseline {
                Baseline::None => TestComparison {
                    test_name: test.name.clone(),
                    outcome: TestOutcome::Executed {
                        query_sets: Vec::new(),
                    },
                },
                Baseline::Missing { .. } => compare_test(&test.name, None, &sets, self.ctx),
                Baseline::Reference(reference) => compare_test(
                    &test.name,
                    reference.result_sets(&test.name),
                    &sets,
                    self.ctx,
                ),
            };
            for set in comparison.query_sets() {
                let failed = set.queries().iter().filter(|q| !q.passed()).count();
                obs::emit_query_set_compared(&test.name, &set.query_set, set.queries().len(), failed);
            }
            report.tests.push(comparison);
            record.insert(test.name.clone(), sets);
        }

        self.enter(RunPhase::Reported);
        obs::emit_suite_finished(
            &suite.name,
            start.elapsed().as_millis() as u64,
            report.failed_queries().len(),
            report.passed(),
        );
        SuiteRun { record, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{QueryVerdict, SetOutcome};
    use crate::fakes::ScriptedExecutor;
    use crate::registry::TypeRegistry;
    use crate::results::QueryResult;
    use crate::value::Value;
    use serde_json::json;
    use std::path::Path;

    fn setup() -> (LoadingContext, Suite) {
        let mut ctx = LoadingContext::new(TypeRegistry::builtin());
        ctx.load_file(
            Path::new("query-a.yml"),
            &json!({
                "queries": [{"query-name": "line_count", "query-type": "CountQuery",
                             "quantity": "IntegerQuantity", "properties": {"file_ext": "stdout"}}],
                "query-sets": [{"query-set-name": "qs1", "queries": ["line_count"]}]
            }),
        )
        .unwrap();
        let suite = Suite::from_data(
            &json!({"suite-name": "demo", "tests": [
                {"test-name": "t1", "queries": ["qs1"]},
                {"test-name": "t2", "queries": ["qs1"]}
            ]}),
            Path::new("suite-demo.yml"),
            &ctx,
        )
        .unwrap();
        (ctx, suite)
    }

    fn reference(t1: i64, t2: i64) -> SuiteResult {
        let mut r = SuiteResult::new("demo", Version::parse("v1.0.0").unwrap());
        for (test, n) in [("t1", t1), ("t2", t2)] {
            r.insert(
                test,
                vec![ResultSet::new("qs1", vec![QueryResult::value("line_count", Value::Int(n))])],
            );
        }
        r
    }

    #[tokio::test]
    async fn test_suite_passes_and_records() {
        let (ctx, suite) = setup();
        let exec = ScriptedExecutor::new()
            .with_stdout("t1", "a\nb\nc\n")
            .with_stdout("t2", "a\n");
        let reference = reference(3, 1);
        let out = Version::parse("d2024-05-01").unwrap();

        let mut runner = SuiteRunner::new(&ctx, &exec).with_run_id("r1");
        let run = runner
            .run_suite(&suite, Baseline::Reference(&reference), &out)
            .await;

        assert!(run.passed());
        assert_eq!(runner.phase(), RunPhase::Reported);
        assert_eq!(run.report.run_id, "r1");
        assert_eq!(run.record.version, out);
        assert_eq!(
            run.record.result_set("t1", "qs1").unwrap().results,
            vec![QueryResult::value("line_count", Value::Int(3))]
        );
        let names: Vec<_> = exec.invocations().into_iter().map(|i| i.test_name).collect();
        assert_eq!(names, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_execution_failure_does_not_stop_suite() {
        let (ctx, suite) = setup();
        let exec = ScriptedExecutor::new()
            .with_failure("t1", "crashed")
            .with_stdout("t2", "a\n");
        let reference = reference(3, 1);
        let out = Version::parse("v1.1.0").unwrap();

        let run = SuiteRunner::new(&ctx, &exec)
            .run_suite(&suite, Baseline::Reference(&reference), &out)
            .await;

        assert!(!run.passed());
        assert!(matches!(run.report.tests[0].outcome, TestOutcome::ExecutionFailed { .. }));
        assert!(run.report.tests[1].passed());
        assert!(run.record.result_sets("t1").is_none());
        assert!(run.record.result_sets("t2").is_some());
    }

    #[tokio::test]
    async fn test_missing_reference_fails() {
        let (ctx, suite) = setup();
        let exec = ScriptedExecutor::new().with_stdout("t1", "").with_stdout("t2", "");
        let wanted = Version::parse("v9.0.0").unwrap();
        let run = SuiteRunner::new(&ctx, &exec)
            .run_suite(&suite, Baseline::Missing { version: &wanted }, &Version::today())
            .await;
        assert!(!run.passed());
        assert_eq!(run.report.reference_version, "v9.0.0");
        assert_eq!(
            run.report.tests[0].query_sets()[0].outcome,
            SetOutcome::MissingReference
        );
    }

    #[tokio::test]
    async fn test_benchmark_mode_only_needs_execution() {
        let (ctx, suite) = setup();
        let exec = ScriptedExecutor::new().with_stdout("t1", "x\n").with_stdout("t2", "");
        let run = SuiteRunner::new(&ctx, &exec)
            .run_suite(&suite, Baseline::None, &Version::parse("v2.0.0").unwrap())
            .await;
        assert!(run.passed());
        assert_eq!(run.report.total_queries(), 0);
        assert_eq!(run.record.results.len(), 2);
    }

    #[tokio::test]
    async fn test_regression_reported_per_query() {
        let (ctx, suite) = setup();
        let exec = ScriptedExecutor::new().with_stdout("t1", "a\nb\n").with_stdout("t2", "a\n");
        let reference = reference(3, 1);
        let run = SuiteRunner::new(&ctx, &exec)
            .run_suite(&suite, Baseline::Reference(&reference), &Version::today())
            .await;
        let failed = run.report.failed_queries();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "t1");
        assert!(matches!(failed[0].2.verdict, QueryVerdict::ToleranceFailure { .. }));
    }
}
