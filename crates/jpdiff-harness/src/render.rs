//! Plain-text rendering of a [`RunReport`].

use std::fmt::Write;

use crate::aggregate::{MismatchKind, percent};
use crate::oracle::OracleVerdict;
use crate::report::{CaseRecord, RunReport};

const RULE_WIDTH: usize = 80;
const VALUE_PREVIEW_CHARS: usize = 100;

/// Render the full console report: header, one line per case, summary,
/// category breakdown, failure list, and overall compatibility.
#[must_use]
pub fn render_console(report: &RunReport) -> String {
    let mut out = String::with_capacity(4096);
    let rule = "=".repeat(RULE_WIDTH);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "JSONPATH DIFFERENTIAL COMPARISON");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Timestamp (unix ms): {}", report.timestamp);
    let _ = writeln!(out, "Implementations: {}", report.implementations.join(" vs "));
    let _ = writeln!(out, "Data hash: {}", report.data_hash);
    let _ = writeln!(out, "Total Test Cases: {}", report.results.len());
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);

    let total = report.results.len();
    for record in &report.results {
        render_case_line(&mut out, record, total);
    }

    render_summary(&mut out, report);

    let _ = writeln!(out);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "OVERALL COMPATIBILITY: {:.1}%",
        report.summary.overall_percent()
    );
    let _ = writeln!(out, "{rule}");
    out
}

fn render_case_line(out: &mut String, record: &CaseRecord, total: usize) {
    let status = if record.comparison.perfect_match {
        "MATCH"
    } else {
        "DIFF "
    };
    let counts: Vec<String> = record
        .results
        .iter()
        .map(|r| match r.result.error() {
            Some(_) => format!("{}=ERR", r.implementation),
            None => format!("{}={}", r.implementation, r.result.count()),
        })
        .collect();
    let _ = write!(
        out,
        "[{}/{}] {status} {} ({}) {}",
        record.index + 1,
        total,
        record.name,
        record.category,
        counts.join(" ")
    );
    if let Some(kind) = record.mismatches.first() {
        let _ = write!(out, " <{kind}>");
    }
    let _ = writeln!(out);
}

fn render_summary(out: &mut String, report: &RunReport) {
    let summary = &report.summary;
    let rule = "=".repeat(RULE_WIDTH);
    let total = summary.total;

    let _ = writeln!(out);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "SUMMARY REPORT");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Total Tests: {total}");
    for (label, value) in [
        ("Perfect Matches", summary.perfect_matches),
        ("Count Matches", summary.count_matches),
        ("Value Matches", summary.value_matches),
        ("Path Matches", summary.path_matches),
        ("Error Handling Matches", summary.error_matches),
    ] {
        let _ = writeln!(out, "{label}: {value} ({:.1}%)", percent(value, total));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "BY CATEGORY:");
    for category in &summary.categories {
        let _ = writeln!(
            out,
            "  {}: {}/{} ({:.1}%)",
            category.category,
            category.matches,
            category.total,
            category.percent()
        );
    }

    let fully_working: Vec<&str> = summary
        .fully_working_categories()
        .map(|c| c.category.as_str())
        .collect();
    let needs_attention: Vec<&str> = summary
        .needs_attention_categories()
        .map(|c| c.category.as_str())
        .collect();
    let _ = writeln!(out);
    let _ = writeln!(out, "Fully working: {}", list_or_none(&fully_working));
    let _ = writeln!(out, "Needs attention: {}", list_or_none(&needs_attention));

    let kinds: Vec<String> = MismatchKind::ALL
        .iter()
        .filter(|&&kind| summary.mismatches.get(kind) > 0)
        .map(|&kind| format!("{kind}={}", summary.mismatches.get(kind)))
        .collect();
    if !kinds.is_empty() {
        let _ = writeln!(out, "Mismatch kinds: {}", kinds.join(" "));
    }

    let oracle = &summary.oracle;
    if oracle.declared > 0 {
        let _ = writeln!(
            out,
            "Expected counts: {} declared, {} agree with all, {} with some, {} with none",
            oracle.declared, oracle.agrees_with_all, oracle.agrees_with_some, oracle.disagrees_with_all
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "FAILED TESTS:");
    let mut failed = report.failed_cases().peekable();
    if failed.peek().is_none() {
        let _ = writeln!(out, "  All tests matched perfectly.");
    }
    for (position, record) in failed.enumerate() {
        render_failure(out, position + 1, record);
    }
    for record in report.results.iter().filter(|r| r.comparison.perfect_match) {
        if let Some(oracle) = &record.oracle {
            if *oracle != OracleVerdict::AgreesWithAll {
                let _ = writeln!(out, "  note: {}: {}", record.name, oracle.label());
            }
        }
    }
}

fn render_failure(out: &mut String, position: usize, record: &CaseRecord) {
    let _ = writeln!(out, "  {position}. {}", record.name);
    let _ = writeln!(out, "     Query: {}", record.query);
    for entry in &record.results {
        let suffix = if entry.result.error().is_some() {
            " (ERROR)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "     {}: {} results{suffix}",
            entry.implementation,
            entry.result.count()
        );
        if let Some(message) = entry.result.error() {
            let _ = writeln!(out, "       {}", preview(message));
        }
    }
    let _ = writeln!(out, "     Issues: {}", record.comparison.issue_tags().join(" "));
    if !record.mismatches.is_empty() {
        let kinds: Vec<&str> = record.mismatches.iter().map(|k| k.as_str()).collect();
        let _ = writeln!(out, "     Kinds: {}", kinds.join(", "));
    }
    if let Some(oracle) = &record.oracle {
        let _ = writeln!(out, "     Expected count: {}", oracle.label());
    }
}

fn list_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        "(none)".to_owned()
    } else {
        items.join(", ")
    }
}

fn preview(text: &str) -> String {
    let mut shown: String = text.chars().take(VALUE_PREVIEW_CHARS).collect();
    if text.chars().nth(VALUE_PREVIEW_CHARS).is_some() {
        shown.push_str("...");
    }
    shown
}
