//! Expected-count oracle check.
//!
//! A case may declare `expectedCount`. Declared counts have been wrong
//! before (hand-written expectations contradicted by every implementation),
//! so the oracle is checked, never trusted: it yields an [`OracleVerdict`]
//! alongside the differential comparison and never changes `perfectMatch`.

use serde::{Deserialize, Serialize};

use crate::execution::ExecutionResult;

/// How a declared expected count relates to the implementations' results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum OracleVerdict {
    /// Every implementation produced the expected count.
    AgreesWithAll,
    /// Only the listed implementations produced the expected count.
    AgreesWithSome {
        agreeing: Vec<String>,
        disagreeing: Vec<String>,
    },
    /// No implementation produced the expected count; the expectation
    /// itself is suspect.
    DisagreesWithAll,
}

impl OracleVerdict {
    /// Compare `expected` with each `(implementation, result)` pair.
    ///
    /// An errored result never agrees, even when `expected` is zero: a
    /// declared count describes a successful evaluation.
    #[must_use]
    pub fn evaluate<'a, I>(expected: usize, results: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a ExecutionResult)>,
    {
        let mut agreeing = Vec::new();
        let mut disagreeing = Vec::new();
        for (implementation, result) in results {
            if !result.is_error() && result.count == expected {
                agreeing.push(implementation.to_owned());
            } else {
                disagreeing.push(implementation.to_owned());
            }
        }
        if disagreeing.is_empty() {
            Self::AgreesWithAll
        } else if agreeing.is_empty() {
            Self::DisagreesWithAll
        } else {
            Self::AgreesWithSome {
                agreeing,
                disagreeing,
            }
        }
    }

    /// Short label for console output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AgreesWithAll => "oracle agrees with all implementations",
            Self::AgreesWithSome { .. } => "oracle agrees with some implementations",
            Self::DisagreesWithAll => "oracle disagrees with all implementations",
        }
    }
}

/// Oracle outcome tallies over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleTally {
    pub declared: usize,
    pub agrees_with_all: usize,
    pub agrees_with_some: usize,
    pub disagrees_with_all: usize,
}

impl OracleTally {
    pub fn record(&mut self, verdict: Option<&OracleVerdict>) {
        let Some(verdict) = verdict else {
            return;
        };
        self.declared += 1;
        match verdict {
            OracleVerdict::AgreesWithAll => self.agrees_with_all += 1,
            OracleVerdict::AgreesWithSome { .. } => self.agrees_with_some += 1,
            OracleVerdict::DisagreesWithAll => self.disagrees_with_all += 1,
        }
    }
}
