//! Normalized execution results and the adapter output protocol.
//!
//! Every implementation under test, whatever its transport, ends up as an
//! [`ExecutionResult`]: either a success carrying parallel `values`/`paths`
//! sequences, or a failure carrying an error message and nothing else.
//!
//! # Protocol
//!
//! Out-of-process implementations print a single JSON object:
//!
//! ```text
//! {"count": 1, "values": [1], "paths": ["$['a'][0]"]}
//! {"error": "unsupported negative index", "count": 0, "values": [], "paths": []}
//! ```
//!
//! [`ExecutionResult::from_protocol_json`] decodes that object and rejects
//! anything that would make a result partially successful.

use std::fmt;

use jpdiff_error::HarnessError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One match produced by an implementation: a normalized path and the value
/// it reaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub path: String,
    pub value: Value,
}

impl QueryMatch {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Why an execution produced no result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The case's fixture key did not resolve.
    FixtureNotFound,
    /// Spawn failure, crash, non-zero exit, or panic.
    ExecutionFailure,
    /// The invocation exceeded the global timeout.
    Timeout,
    /// The implementation rejected the query through the protocol.
    ImplementationError,
    /// Output did not follow the protocol.
    MalformedOutput,
}

impl FailureKind {
    /// Map a case-scoped harness error onto a failure kind.
    ///
    /// Run-scoped errors never reach a result; they map to
    /// `ExecutionFailure` so the conversion stays total.
    #[must_use]
    pub const fn from_error(err: &HarnessError) -> Self {
        match err {
            HarnessError::FixtureNotFound { .. } => Self::FixtureNotFound,
            HarnessError::AdapterTimeout { .. } => Self::Timeout,
            HarnessError::ImplementationError { .. } => Self::ImplementationError,
            HarnessError::MalformedOutput { .. } => Self::MalformedOutput,
            _ => Self::ExecutionFailure,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FixtureNotFound => "FIXTURE_NOT_FOUND",
            Self::ExecutionFailure => "EXECUTION_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::ImplementationError => "IMPLEMENTATION_ERROR",
            Self::MalformedOutput => "MALFORMED_OUTPUT",
        })
    }
}

/// Normalized outcome of running one query against one implementation.
///
/// Construct through [`ExecutionResult::success`] or
/// [`ExecutionResult::failure`]; both keep `count`, `values`, and `paths`
/// consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub count: usize,
    pub values: Vec<Value>,
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// Successful result from an ordered list of matches.
    #[must_use]
    pub fn success(matches: Vec<QueryMatch>) -> Self {
        let count = matches.len();
        let (paths, values): (Vec<String>, Vec<Value>) =
            matches.into_iter().map(|m| (m.path, m.value)).unzip();
        Self {
            count,
            values,
            paths,
            error: None,
            failure: None,
        }
    }

    /// Failed result; count is zero and both sequences are empty.
    #[must_use]
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            count: 0,
            values: Vec::new(),
            paths: Vec::new(),
            error: Some(message.into()),
            failure: Some(kind),
        }
    }

    /// Failed result derived from a case-scoped harness error.
    #[must_use]
    pub fn from_error(err: &HarnessError) -> Self {
        Self::failure(FailureKind::from_error(err), err.to_string())
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    /// Decode one protocol object emitted by `implementation`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::MalformedOutput`] when the text is not a JSON
    /// object, a member has the wrong type, or `count`, `values`, and `paths`
    /// disagree. Returns [`HarnessError::ImplementationError`] when the object
    /// reports an error.
    pub fn from_protocol_json(implementation: &str, text: &str) -> Result<Self, HarnessError> {
        let parsed: Value = serde_json::from_str(text.trim()).map_err(|err| {
            HarnessError::malformed_output(implementation, format!("invalid JSON: {err}"))
        })?;
        let Value::Object(object) = parsed else {
            return Err(HarnessError::malformed_output(
                implementation,
                "expected a JSON object",
            ));
        };

        match object.get("error") {
            None | Some(Value::Null) => {}
            Some(Value::String(message)) if message.is_empty() => {}
            Some(Value::String(message)) => {
                return Err(HarnessError::ImplementationError {
                    implementation: implementation.to_owned(),
                    message: message.clone(),
                });
            }
            Some(other) => {
                return Err(HarnessError::ImplementationError {
                    implementation: implementation.to_owned(),
                    message: other.to_string(),
                });
            }
        }

        let values = match object.get("values") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values.clone(),
            Some(_) => {
                return Err(HarnessError::malformed_output(
                    implementation,
                    "'values' must be an array",
                ));
            }
        };

        let paths = match object.get("paths") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(paths)) => paths
                .iter()
                .map(|p| p.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    HarnessError::malformed_output(implementation, "'paths' must hold strings")
                })?,
            Some(_) => {
                return Err(HarnessError::malformed_output(
                    implementation,
                    "'paths' must be an array",
                ));
            }
        };

        if values.len() != paths.len() {
            return Err(HarnessError::malformed_output(
                implementation,
                format!(
                    "values/paths length mismatch: values={} paths={}",
                    values.len(),
                    paths.len()
                ),
            ));
        }

        let count = match object.get("count") {
            None | Some(Value::Null) => values.len(),
            Some(value) => value
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    HarnessError::malformed_output(
                        implementation,
                        "'count' must be a non-negative integer",
                    )
                })?,
        };
        if count != values.len() {
            return Err(HarnessError::malformed_output(
                implementation,
                format!("count={count} disagrees with {} values", values.len()),
            ));
        }

        Ok(Self {
            count,
            values,
            paths,
            error: None,
            failure: None,
        })
    }

    /// Like [`Self::from_protocol_json`] but never fails: decoding errors
    /// become failure results.
    #[must_use]
    pub fn decode_or_failure(implementation: &str, text: &str) -> Self {
        Self::from_protocol_json(implementation, text).unwrap_or_else(|err| Self::from_error(&err))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_keeps_paths_and_values_parallel() {
        let result = ExecutionResult::success(vec![
            QueryMatch::new("$['a'][0]", json!(1)),
            QueryMatch::new("$['a'][1]", json!(2)),
        ]);
        assert_eq!(result.count, 2);
        assert_eq!(result.values, vec![json!(1), json!(2)]);
        assert_eq!(result.paths, vec!["$['a'][0]", "$['a'][1]"]);
        assert!(!result.is_error());
    }

    #[test]
    fn failure_is_never_partial() {
        let result = ExecutionResult::failure(FailureKind::Timeout, "took too long");
        assert_eq!(result.count, 0);
        assert!(result.values.is_empty());
        assert!(result.paths.is_empty());
        assert_eq!(result.failure, Some(FailureKind::Timeout));
    }

    #[test]
    fn decode_success_object() {
        let result = ExecutionResult::from_protocol_json(
            "go",
            r#"{"count":1,"values":[1],"paths":["$.a[0]"]}"#,
        )
        .expect("valid protocol object");
        assert_eq!(result.count, 1);
        assert_eq!(result.paths, vec!["$.a[0]"]);
    }

    #[test]
    fn decode_error_object() {
        let err = ExecutionResult::from_protocol_json(
            "go",
            r#"{"error":"unsupported negative index","count":0,"values":[],"paths":[]}"#,
        )
        .expect_err("error object should surface as an error");
        assert!(matches!(err, HarnessError::ImplementationError { .. }));

        let result = ExecutionResult::from_error(&err);
        assert_eq!(result.failure, Some(FailureKind::ImplementationError));
        assert_eq!(
            result.error.as_deref(),
            Some("go: unsupported negative index")
        );
    }

    #[test]
    fn decode_rejects_count_mismatch() {
        let err = ExecutionResult::from_protocol_json(
            "go",
            r#"{"count":3,"values":[1],"paths":["$.a[0]"]}"#,
        )
        .expect_err("count must agree with values");
        assert!(matches!(err, HarnessError::MalformedOutput { .. }));
    }

    #[test]
    fn decode_rejects_ragged_sequences() {
        let result = ExecutionResult::decode_or_failure(
            "go",
            r#"{"count":2,"values":[1,2],"paths":["$.a[0]"]}"#,
        );
        assert_eq!(result.failure, Some(FailureKind::MalformedOutput));
        assert_eq!(result.count, 0);
    }

    #[test]
    fn decode_rejects_non_object() {
        let result = ExecutionResult::decode_or_failure("go", "panic: runtime error");
        assert_eq!(result.failure, Some(FailureKind::MalformedOutput));
    }

    #[test]
    fn decode_tolerates_missing_count_and_empty_error() {
        let result = ExecutionResult::from_protocol_json(
            "js",
            r#"{"error":"","values":["x"],"paths":["$[0]"]}"#,
        )
        .expect("empty error string is not a failure");
        assert_eq!(result.count, 1);
    }

    #[test]
    fn serialization_omits_error_fields_on_success() {
        let result = ExecutionResult::success(vec![QueryMatch::new("$", json!(null))]);
        let encoded = serde_json::to_value(&result).expect("serialize");
        assert!(encoded.get("error").is_none());
        assert!(encoded.get("failure").is_none());
        assert_eq!(encoded["count"], json!(1));
    }

    #[test]
    fn failure_kind_display() {
        assert_eq!(FailureKind::Timeout.to_string(), "TIMEOUT");
        assert_eq!(
            FailureKind::FixtureNotFound.to_string(),
            "FIXTURE_NOT_FOUND"
        );
    }
}
