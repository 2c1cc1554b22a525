//! Result comparator.
//!
//! Compares two [`ExecutionResult`]s on four independent axes. Every axis is
//! always computed, so a count mismatch never hides a value or error
//! mismatch in the report.
//!
//! # Equivalence rules
//!
//! - `values`: ordered sequence, element-wise structural equality
//!   ([`json_equal`]). Order is part of the signal.
//! - `paths`: ordered sequence, exact string equality. Path syntax is never
//!   canonicalized.
//! - `error`: presence only; message text is implementation specific.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::execution::ExecutionResult;

/// Verdict for one pair of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub count_match: bool,
    pub values_match: bool,
    pub paths_match: bool,
    pub error_match: bool,
    pub perfect_match: bool,
}

impl Comparison {
    /// Assemble a comparison from its four axes.
    #[must_use]
    pub const fn from_axes(
        count_match: bool,
        values_match: bool,
        paths_match: bool,
        error_match: bool,
    ) -> Self {
        Self {
            count_match,
            values_match,
            paths_match,
            error_match,
            perfect_match: count_match && values_match && paths_match && error_match,
        }
    }

    /// Agreement on every axis.
    #[must_use]
    pub const fn perfect() -> Self {
        Self::from_axes(true, true, true, true)
    }

    /// Axis-wise conjunction, used to fold several adapter pairs into one
    /// case verdict.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        Self::from_axes(
            self.count_match && other.count_match,
            self.values_match && other.values_match,
            self.paths_match && other.paths_match,
            self.error_match && other.error_match,
        )
    }

    /// Short tags for the failing axes, e.g. `["COUNT", "ERRORS"]`.
    #[must_use]
    pub fn issue_tags(&self) -> Vec<&'static str> {
        let mut tags = Vec::new();
        if !self.count_match {
            tags.push("COUNT");
        }
        if !self.values_match {
            tags.push("VALUES");
        }
        if !self.paths_match {
            tags.push("PATHS");
        }
        if !self.error_match {
            tags.push("ERRORS");
        }
        tags
    }
}

/// Compare two results for the same case.
#[must_use]
pub fn compare(a: &ExecutionResult, b: &ExecutionResult) -> Comparison {
    let count_match = a.count == b.count;
    let values_match = sequences_equal(&a.values, &b.values);
    let paths_match = a.paths == b.paths;
    let error_match = a.is_error() == b.is_error();
    Comparison::from_axes(count_match, values_match, paths_match, error_match)
}

fn sequences_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y))
}

/// Structural equality over JSON values.
///
/// Arrays compare element-wise in order. Objects compare as maps: same key
/// set, equal value per key, member order irrelevant. Numbers compare by
/// value, so `1` equals `1.0`; integers that fit `i64`/`u64` are compared
/// exactly before any float conversion.
#[must_use]
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => sequences_equal(x, y),
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, xv)| y.get(key).is_some_and(|yv| json_equal(xv, yv)))
        }
        _ => false,
    }
}

#[allow(clippy::float_cmp)]
fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    if (x.is_i64() || x.is_u64()) && (y.is_i64() || y.is_u64()) {
        // One negative i64 and one u64 above i64::MAX.
        return false;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
