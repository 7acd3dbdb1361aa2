//! Human-readable and JSON rendering of suite reports.

use std::fmt::Write as _;

use crate::compare::{QuerySetComparison, SetOutcome, SuiteReport, TestOutcome};
use crate::error::Result;

const HEADERS: [&str; 5] = ["Query", "Pass?", "Test", "Ref.", "Result"];
const MISSING_CELL: &str = "-";

fn mark(passed: bool) -> &'static str {
    if passed {
        "✓"
    } else {
        "✗"
    }
}

/// Table rows of one query set, header excluded.
fn rows(set: &QuerySetComparison) -> Vec<[String; 5]> {
    set.queries()
        .iter()
        .map(|q| {
            [
                q.query_name.clone(),
                mark(q.passed()).to_string(),
                q.candidate.clone().unwrap_or_else(|| MISSING_CELL.to_string()),
                q.reference.clone().unwrap_or_else(|| MISSING_CELL.to_string()),
                q.message.clone(),
            ]
        })
        .collect()
}

fn write_row(out: &mut String, cells: [&str; 5], widths: &[usize; 5]) {
    let mut text = String::new();
    for (i, (cell, w)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            text.push_str("  ");
        }
        text.push_str(cell);
        let pad = w.saturating_sub(cell.chars().count());
        text.extend(std::iter::repeat(' ').take(pad));
    }
    let _ = writeln!(out, "    {}", text.trim_end());
}

fn render_table(out: &mut String, rows: &[[String; 5]]) {
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    write_row(out, HEADERS, &widths);
    let rule = widths.map(|w| "-".repeat(w));
    write_row(out, rule.each_ref().map(String::as_str), &widths);
    for row in rows {
        write_row(out, row.each_ref().map(String::as_str), &widths);
    }
}

/// Render one suite report as text.
///
/// With `verbose` every query row is shown; otherwise passing query sets
/// collapse to a single line.
pub fn render_text(report: &SuiteReport, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Suite {} ({} vs. {}): {}",
        report.suite_name,
        report.candidate_version,
        report.reference_version,
        if report.passed() { "✓ PASSED" } else { "✗ FAILED" }
    );
    for test in &report.tests {
        let _ = writeln!(out, "  {} {}", mark(test.passed()), test.test_name);
        match &test.outcome {
            TestOutcome::ExecutionFailed { message } => {
                let _ = writeln!(out, "    execution failed: {message}");
            }
            TestOutcome::MissingCandidate => {
                let _ = writeln!(out, "    no test results for this test");
            }
            TestOutcome::Executed { query_sets } => {
                for set in query_sets {
                    match &set.outcome {
                        SetOutcome::MissingReference => {
                            let _ = writeln!(
                                out,
                                "  {} {}: no reference results",
                                mark(false),
                                set.query_set
                            );
                        }
                        SetOutcome::Compared { .. } if set.passed() && !verbose => {
                            let _ = writeln!(
                                out,
                                "  {} {} ({} queries)",
                                mark(true),
                                set.query_set,
                                set.queries().len()
                            );
                        }
                        SetOutcome::Compared { .. } => {
                            let _ = writeln!(out, "  {} {}", mark(set.passed()), set.query_set);
                            render_table(&mut out, &rows(set));
                        }
                    }
                }
            }
        }
    }
    out
}

/// One-line totals over all suites of a run.
pub fn render_summary(reports: &[SuiteReport]) -> String {
    let total: usize = reports.iter().map(SuiteReport::total_queries).sum();
    let failed: usize = reports.iter().map(|r| r.failed_queries().len()).sum();
    let failed_tests: usize = reports.iter().map(|r| r.failed_tests().len()).sum();
    if reports.iter().all(SuiteReport::passed) {
        "✓ All tests passed!".to_string()
    } else if failed_tests > 0 && failed == 0 {
        format!("✗ {failed_tests} test(s) failed")
    } else {
        format!("✗ {failed} of {total} queries failed")
    }
}

/// Serialize reports as a pretty JSON array.
pub fn render_json(reports: &[SuiteReport]) -> Result<String> {
    Ok(serde_json::to_string_pretty(reports)?)
}
