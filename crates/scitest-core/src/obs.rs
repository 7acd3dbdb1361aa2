//! Structured observability hooks for suite run lifecycle events.
//!
//! Events are emitted at `info!` level (or `warn!` for failures) with an
//! `event` field, inside a [`SuiteSpan`] carrying the run id. Filter with
//! `SCITEST_LOG`, e.g. `SCITEST_LOG=scitest_core=info`.

use tracing::{info, warn};

/// RAII guard that enters a suite-scoped span for the duration of a suite run.
///
/// ```ignore
/// let _span = SuiteSpan::enter(&run_id, "demo");
/// // every event below carries run_id and suite
/// ```
pub struct SuiteSpan {
    _span: tracing::span::EnteredSpan,
}

impl SuiteSpan {
    pub fn enter(run_id: &str, suite_name: &str) -> Self {
        let span = tracing::info_span!("scitest.suite", run_id = %run_id, suite = %suite_name);
        Self {
            _span: span.entered(),
        }
    }
}

/// Fresh random run id.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn emit_suite_started(suite_name: &str, tests: usize, reference_version: Option<&str>) {
    info!(
        event = "suite.started",
        suite = %suite_name,
        tests = tests,
        reference_version = reference_version.unwrap_or("none"),
    );
}

pub fn emit_test_executed(test_name: &str, query_sets: usize, errors: usize) {
    info!(
        event = "test.executed",
        test = %test_name,
        query_sets = query_sets,
        error_results = errors,
    );
}

pub fn emit_test_execution_failed(test_name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "test.execution_failed", test = %test_name, error = %error);
}

pub fn emit_query_set_compared(test_name: &str, query_set: &str, total: usize, failed: usize) {
    info!(
        event = "query_set.compared",
        test = %test_name,
        query_set = %query_set,
        total = total,
        failed = failed,
    );
}

pub fn emit_suite_finished(suite_name: &str, duration_ms: u64, failed_queries: usize, passed: bool) {
    info!(
        event = "suite.finished",
        suite = %suite_name,
        duration_ms = duration_ms,
        failed_queries = failed_queries,
        passed = passed,
    );
}

pub fn emit_record_written(path: &std::path::Path, kind: &str) {
    info!(event = "record.written", path = %path.display(), kind = %kind);
}
