//! Comparison of candidate results against a reference.
//!
//! Verdicts are kept distinct so a report can tell a regressed value
//! (`ToleranceFailure`) from a stale reference (`SchemaMismatch`).

use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;
use crate::resolver::LoadingContext;
use crate::results::{Outcome, QueryResult, ResultSet, SuiteResult};
use crate::value::Value;

/// Cell text for an error result.
pub const ERROR_CELL: &str = "ERROR";

// ---------------------------------------------------------------------------
// Query level
// ---------------------------------------------------------------------------

/// Which side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Reference,
    Candidate,
}

/// Outcome of comparing one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum QueryVerdict {
    /// Values agree within tolerance, or both sides are errors.
    Pass,
    ToleranceFailure { message: String },
    /// Exactly one side is an error.
    ErrorMismatch { reference_error: bool },
    /// The query is absent from one side.
    SchemaMismatch { missing_in: Side },
}

impl QueryVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, QueryVerdict::Pass)
    }
}

/// One row of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryComparison {
    pub query_name: String,
    #[serde(flatten)]
    pub verdict: QueryVerdict,
    /// Short rendering of the reference value (`None` when absent).
    pub reference: Option<String>,
    /// Short rendering of the candidate value (`None` when absent).
    pub candidate: Option<String>,
    /// Human-readable explanation.
    pub message: String,
}

impl QueryComparison {
    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }
}

fn cell(result: &QueryResult, quantity: Option<&dyn Quantity>) -> String {
    match (&result.outcome, quantity) {
        (Outcome::Error, _) => ERROR_CELL.to_string(),
        (Outcome::Value(v), Some(q)) => q.str_short(v, q.width()),
        (Outcome::Value(v), None) => v.to_string(),
    }
}

fn values_agree(
    reference: &Value,
    candidate: &Value,
    quantity: Option<&dyn Quantity>,
) -> (bool, String) {
    match quantity {
        Some(q) => (
            q.equal(reference, candidate),
            q.compare_msg(reference, candidate),
        ),
        None if reference == candidate => (true, "Values are consistent".to_string()),
        None => (false, format!("Expected {reference} got {candidate}")),
    }
}

/// Compare one query; either side may be missing.
pub fn compare_query(
    query_name: &str,
    reference: Option<&QueryResult>,
    candidate: Option<&QueryResult>,
    quantity: Option<&dyn Quantity>,
) -> QueryComparison {
    let (verdict, message) = match (reference, candidate) {
        (None, None) => (
            QueryVerdict::SchemaMismatch {
                missing_in: Side::Reference,
            },
            "Query missing on both sides".to_string(),
        ),
        (None, Some(_)) => (
            QueryVerdict::SchemaMismatch {
                missing_in: Side::Reference,
            },
            "Query not in reference".to_string(),
        ),
        (Some(_), None) => (
            QueryVerdict::SchemaMismatch {
                missing_in: Side::Candidate,
            },
            "Query not in test results".to_string(),
        ),
        (Some(r), Some(c)) => match (&r.outcome, &c.outcome) {
            (Outcome::Error, Outcome::Error) => {
                (QueryVerdict::Pass, "Both results are errors".to_string())
            }
            (Outcome::Error, Outcome::Value(_)) => (
                QueryVerdict::ErrorMismatch {
                    reference_error: true,
                },
                "Reference is an error, test produced a value".to_string(),
            ),
            (Outcome::Value(_), Outcome::Error) => (
                QueryVerdict::ErrorMismatch {
                    reference_error: false,
                },
                "Test result is an error".to_string(),
            ),
            (Outcome::Value(rv), Outcome::Value(cv)) => match values_agree(rv, cv, quantity) {
                (true, msg) => (QueryVerdict::Pass, msg),
                (false, msg) => (
                    QueryVerdict::ToleranceFailure {
                        message: msg.clone(),
                    },
                    msg,
                ),
            },
        },
    };
    QueryComparison {
        query_name: query_name.to_string(),
        verdict,
        reference: reference.map(|r| cell(r, quantity)),
        candidate: candidate.map(|c| cell(c, quantity)),
        message,
    }
}

// ---------------------------------------------------------------------------
// Query set and test level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SetOutcome {
    Compared { queries: Vec<QueryComparison> },
    /// No stored result set for this test and query set.
    MissingReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySetComparison {
    pub query_set: String,
    #[serde(flatten)]
    pub outcome: SetOutcome,
}

impl QuerySetComparison {
    pub fn passed(&self) -> bool {
        match &self.outcome {
            SetOutcome::Compared { queries } => queries.iter().all(QueryComparison::passed),
            SetOutcome::MissingReference => false,
        }
    }

    pub fn queries(&self) -> &[QueryComparison] {
        match &self.outcome {
            SetOutcome::Compared { queries } => queries,
            SetOutcome::MissingReference => &[],
        }
    }
}

/// Compare two result sets of the same query set, candidate order first.
pub fn compare_result_sets(
    reference: &ResultSet,
    candidate: &ResultSet,
    ctx: &LoadingContext,
) -> QuerySetComparison {
    let mut queries: Vec<QueryComparison> = candidate
        .results
        .iter()
        .map(|c| {
            compare_query(
                &c.query_name,
                reference.get(&c.query_name),
                Some(c),
                ctx.quantity_of(&c.query_name),
            )
        })
        .collect();
    queries.extend(
        reference
            .results
            .iter()
            .filter(|r| candidate.get(&r.query_name).is_none())
            .map(|r| compare_query(&r.query_name, Some(r), None, ctx.quantity_of(&r.query_name))),
    );
    QuerySetComparison {
        query_set: candidate.query_set.clone(),
        outcome: SetOutcome::Compared { queries },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome {
    Executed { query_sets: Vec<QuerySetComparison> },
    /// The program could not be run; no queries were evaluated.
    ExecutionFailed { message: String },
    /// Present in the reference only.
    MissingCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestComparison {
    pub test_name: String,
    #[serde(flatten)]
    pub outcome: TestOutcome,
}

impl TestComparison {
    pub fn passed(&self) -> bool {
        match &self.outcome {
            TestOutcome::Executed { query_sets } => {
                query_sets.iter().all(QuerySetComparison::passed)
            }
            TestOutcome::ExecutionFailed { .. } | TestOutcome::MissingCandidate => false,
        }
    }

    pub fn query_sets(&self) -> &[QuerySetComparison] {
        match &self.outcome {
            TestOutcome::Executed { query_sets } => query_sets,
            _ => &[],
        }
    }

    pub fn execution_failed(test_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            outcome: TestOutcome::ExecutionFailed {
                message: message.into(),
            },
        }
    }
}

/// Compare all result sets of one test. `reference` is `None` when the test has no stored results.
pub fn compare_test(
    test_name: &str,
    reference: Option<&[ResultSet]>,
    candidate: &[ResultSet],
    ctx: &LoadingContext,
) -> TestComparison {
    let query_sets = candidate
        .iter()
        .map(|c| {
            match reference.and_then(|sets| sets.iter().find(|r| r.query_set == c.query_set)) {
                Some(r) => compare_result_sets(r, c, ctx),
                None => QuerySetComparison {
                    query_set: c.query_set.clone(),
                    outcome: SetOutcome::MissingReference,
                },
            }
        })
        .collect();
    TestComparison {
        test_name: test_name.to_string(),
        outcome: TestOutcome::Executed { query_sets },
    }
}

// ---------------------------------------------------------------------------
// Suite level
// ---------------------------------------------------------------------------

/// Aggregated verdict of one suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite_name: String,
    pub reference_version: String,
    pub candidate_version: String,
    pub run_id: String,
    pub tests: Vec<TestComparison>,
}

impl SuiteReport {
    pub fn new(
        suite_name: impl Into<String>,
        reference_version: impl Into<String>,
        candidate_version: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            suite_name: suite_name.into(),
            reference_version: reference_version.into(),
            candidate_version: candidate_version.into(),
            run_id: run_id.into(),
            tests: Vec::new(),
        }
    }

    /// A suite passes iff every test passes.
    pub fn passed(&self) -> bool {
        self.tests.iter().all(TestComparison::passed)
    }

    pub fn total_queries(&self) -> usize {
        self.tests
            .iter()
            .flat_map(|t| t.query_sets())
            .map(|s| s.queries().len())
            .sum()
    }

    /// Failed query rows as `(test, query set, comparison)`.
    pub fn failed_queries(&self) -> Vec<(&str, &str, &QueryComparison)> {
        self.tests
            .iter()
            .flat_map(|t| {
                t.query_sets().iter().flat_map(move |s| {
                    s.queries()
                        .iter()
                        .filter(|q| !q.passed())
                        .map(move |q| (t.test_name.as_str(), s.query_set.as_str(), q))
                })
            })
            .collect()
    }

    pub fn failed_tests(&self) -> Vec<&TestComparison> {
        self.tests.iter().filter(|t| !t.passed()).collect()
    }
}

/// Compare two stored records without running anything.
pub fn compare_suite_results(
    reference: &SuiteResult,
    candidate: &SuiteResult,
    ctx: &LoadingContext,
    run_id: &str,
) -> SuiteReport {
    let mut report = SuiteReport::new(
        candidate.suite_name.clone(),
        reference.version.to_string(),
        candidate.version.to_string(),
        run_id,
    );
    for (test_name, sets) in &candidate.results {
        report.tests.push(compare_test(
            test_name,
            reference.result_sets(test_name),
            sets,
            ctx,
        ));
    }
    for test_name in reference.test_names() {
        if !candidate.contains_test(test_name) {
            report.tests.push(TestComparison {
                test_name: test_name.to_string(),
                outcome: TestOutcome::MissingCandidate,
            });
        }
    }
    report
}
