//! Persisted run report.
//!
//! The JSON artifact and the console rendering are both produced from one
//! [`RunReport`] value. The artifact is write-once: it is written to a
//! temporary sibling and renamed into place.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use jpdiff_error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{MismatchKind, RunSummary};
use crate::comparator::Comparison;
use crate::execution::{ExecutionResult, FailureKind};
use crate::oracle::OracleVerdict;
use crate::orchestrator::{CaseOutcome, RunOutcome};

/// Schema identifier embedded in every report.
pub const REPORT_SCHEMA_VERSION: &str = "jpdiff.report.v1";

/// How much of each execution result the report keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportDetail {
    /// Entire `ExecutionResult`s.
    #[default]
    Full,
    /// `count`, `error`, and `hasValues` only.
    Reduced,
}

/// Reduced projection of an [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReducedResult {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub has_values: bool,
}

impl From<&ExecutionResult> for ReducedResult {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            count: result.count,
            error: result.error.clone(),
            failure: result.failure,
            has_values: result.has_values(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportedResult {
    Full(ExecutionResult),
    Reduced(ReducedResult),
}

impl ReportedResult {
    fn project(result: &ExecutionResult, detail: ReportDetail) -> Self {
        match detail {
            ReportDetail::Full => Self::Full(result.clone()),
            ReportDetail::Reduced => Self::Reduced(ReducedResult::from(result)),
        }
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        match self {
            Self::Full(result) => result.count,
            Self::Reduced(result) => result.count,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Full(result) => result.error.as_deref(),
            Self::Reduced(result) => result.error.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationRecord {
    pub implementation: String,
    #[serde(flatten)]
    pub result: ReportedResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRecord {
    pub left: String,
    pub right: String,
    #[serde(flatten)]
    pub comparison: Comparison,
}

/// Per-case entry of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub index: usize,
    pub name: String,
    pub query: String,
    pub fixture_key: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_count: Option<usize>,
    pub results: Vec<ImplementationRecord>,
    pub comparisons: Vec<PairRecord>,
    /// Verdict over every pair.
    pub comparison: Comparison,
    pub mismatches: Vec<MismatchKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleVerdict>,
}

impl CaseRecord {
    fn from_outcome(outcome: &CaseOutcome, detail: ReportDetail) -> Self {
        let name_of = |index: usize| {
            outcome
                .results
                .get(index)
                .map(|r| r.implementation.clone())
                .unwrap_or_default()
        };
        Self {
            index: outcome.index,
            name: outcome.case.name.clone(),
            query: outcome.case.query.clone(),
            fixture_key: outcome.case.fixture_key.clone(),
            category: outcome.case.category.clone(),
            description: outcome.case.description.clone(),
            expected_count: outcome.case.expected_count,
            results: outcome
                .results
                .iter()
                .map(|r| ImplementationRecord {
                    implementation: r.implementation.clone(),
                    result: ReportedResult::project(&r.result, detail),
                })
                .collect(),
            comparisons: outcome
                .comparisons
                .iter()
                .map(|pair| PairRecord {
                    left: name_of(pair.left),
                    right: name_of(pair.right),
                    comparison: pair.comparison,
                })
                .collect(),
            comparison: outcome.verdict,
            mismatches: outcome.mismatches.clone(),
            oracle: outcome.oracle.clone(),
        }
    }
}

/// Timestamped snapshot of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub schema_version: String,
    /// Unix milliseconds at run start.
    pub timestamp: u64,
    pub elapsed_ms: u64,
    pub implementations: Vec<String>,
    pub data_hash: String,
    pub detail: ReportDetail,
    pub summary: RunSummary,
    pub results: Vec<CaseRecord>,
}

impl RunReport {
    #[must_use]
    pub fn from_outcome(outcome: &RunOutcome, detail: ReportDetail) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_owned(),
            timestamp: outcome.started_at_ms,
            elapsed_ms: outcome.elapsed_ms,
            implementations: outcome.implementations.clone(),
            data_hash: outcome.data_hash.clone(),
            detail,
            summary: outcome.summary.clone(),
            results: outcome
                .cases
                .iter()
                .map(|case| CaseRecord::from_outcome(case, detail))
                .collect(),
        }
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseRecord> {
        self.results.iter().filter(|r| !r.comparison.perfect_match)
    }

    /// Pretty JSON of the whole report.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| HarnessError::Serialization(format!("report_serialize_failed: {err}")))
    }

    /// Pretty JSON of the summary alone. Stable across runs over the same
    /// inputs with deterministic adapters.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn summary_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.summary)
            .map_err(|err| HarnessError::Serialization(format!("summary_serialize_failed: {err}")))
    }
}

/// Write `report` to `path` atomically.
///
/// # Errors
///
/// Returns `Serialization` if encoding fails and `Io` if the directory or
/// file cannot be written.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = report.to_json()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".jpdiff-report-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    staged.write_all(json.as_bytes())?;
    staged.write_all(b"\n")?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| HarnessError::Io(err.error))?;

    info!(
        path = %path.display(),
        cases = report.results.len(),
        detail = ?report.detail,
        "report written"
    );
    Ok(())
}
