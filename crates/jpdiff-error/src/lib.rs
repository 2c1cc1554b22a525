use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Primary error type for the jpdiff harness.
///
/// Variants fall into two scopes. Case-scoped errors (a missing fixture, an
/// implementation that crashed or hung) are contained by the harness and
/// turned into comparable failure results. Run-scoped errors (unparseable
/// suite documents, invalid configuration) abort the run before any case
/// executes.
#[derive(Error, Debug)]
pub enum HarnessError {
    // === Case-scoped ===
    /// A case references a fixture key that the registry does not hold.
    #[error("fixture not found: '{key}'")]
    FixtureNotFound { key: String },

    /// The implementation under test crashed, exited non-zero, or could not
    /// be started.
    #[error("{implementation}: execution failed: {detail}")]
    AdapterExecutionFailure {
        implementation: String,
        detail: String,
    },

    /// The implementation did not finish within the invocation bound.
    #[error("{implementation}: timed out after {}ms", .timeout.as_millis())]
    AdapterTimeout {
        implementation: String,
        timeout: Duration,
    },

    /// The implementation reported a query error through the protocol.
    #[error("{implementation}: {message}")]
    ImplementationError {
        implementation: String,
        message: String,
    },

    /// The implementation produced output that does not follow the
    /// invocation protocol.
    #[error("{implementation}: malformed output: {detail}")]
    MalformedOutput {
        implementation: String,
        detail: String,
    },

    // === Run-scoped ===
    /// A fixture registry, case set, or suite document failed to parse or
    /// validate.
    #[error("malformed input '{source_name}': {detail}")]
    MalformedInput { source_name: String, detail: String },

    /// The harness configuration is unusable.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    /// A required input file does not exist.
    #[error("input not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// Report encoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scope of a [`HarnessError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorScope {
    /// Contained within one case; the run continues.
    Case,
    /// Fatal to the whole run.
    Run,
}

impl HarnessError {
    /// Which scope this error belongs to.
    #[allow(clippy::match_same_arms)]
    pub const fn scope(&self) -> ErrorScope {
        match self {
            Self::FixtureNotFound { .. }
            | Self::AdapterExecutionFailure { .. }
            | Self::AdapterTimeout { .. }
            | Self::ImplementationError { .. }
            | Self::MalformedOutput { .. } => ErrorScope::Case,
            Self::MalformedInput { .. }
            | Self::InvalidConfig { .. }
            | Self::InputNotFound { .. }
            | Self::Serialization(_)
            | Self::Io(_) => ErrorScope::Run,
        }
    }

    /// Whether this error must abort the run.
    pub const fn is_fatal(&self) -> bool {
        matches!(self.scope(), ErrorScope::Run)
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::FixtureNotFound { .. } => {
                Some("Add the fixture to the registry or fix the case's fixtureKey")
            }
            Self::AdapterTimeout { .. } => {
                Some("Raise timeout_ms or check the implementation for an infinite loop")
            }
            Self::AdapterExecutionFailure { .. } => {
                Some("Run the adapter command by hand to inspect its stderr")
            }
            Self::MalformedInput { .. } => Some("Validate the document with a JSON linter"),
            Self::InvalidConfig { .. } => Some("At least two uniquely named adapters are required"),
            Self::InputNotFound { .. } => Some("Check the path, relative paths resolve from the config file"),
            _ => None,
        }
    }

    /// Process exit code for the runner binary.
    pub const fn exit_code(&self) -> u8 {
        match self.scope() {
            ErrorScope::Case => 1,
            ErrorScope::Run => 2,
        }
    }

    /// Create a malformed-input error.
    pub fn malformed(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedInput {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Create an execution-failure error.
    pub fn execution(implementation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::AdapterExecutionFailure {
            implementation: implementation.into(),
            detail: detail.into(),
        }
    }

    /// Create a malformed-output error.
    pub fn malformed_output(implementation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedOutput {
            implementation: implementation.into(),
            detail: detail.into(),
        }
    }
}

/// Result type alias using `HarnessError`.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_fixture_not_found() {
        let err = HarnessError::FixtureNotFound {
            key: "missing_fixture".to_owned(),
        };
        assert_eq!(err.to_string(), "fixture not found: 'missing_fixture'");
    }

    #[test]
    fn error_display_timeout() {
        let err = HarnessError::AdapterTimeout {
            implementation: "reference".to_owned(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "reference: timed out after 250ms");
    }

    #[test]
    fn error_display_malformed_input() {
        let err = HarnessError::malformed("suite.json", "expected value at line 1 column 1");
        assert_eq!(
            err.to_string(),
            "malformed input 'suite.json': expected value at line 1 column 1"
        );
    }

    #[test]
    fn scope_mapping() {
        assert_eq!(
            HarnessError::FixtureNotFound { key: "x".to_owned() }.scope(),
            ErrorScope::Case
        );
        assert_eq!(
            HarnessError::execution("go", "exit status 2").scope(),
            ErrorScope::Case
        );
        assert_eq!(
            HarnessError::malformed_output("go", "not json").scope(),
            ErrorScope::Case
        );
        assert_eq!(HarnessError::malformed("a", "b").scope(), ErrorScope::Run);
        assert_eq!(HarnessError::invalid_config("x").scope(), ErrorScope::Run);
    }

    #[test]
    fn only_run_scoped_errors_are_fatal() {
        assert!(HarnessError::malformed("cases.json", "eof").is_fatal());
        assert!(HarnessError::invalid_config("one adapter").is_fatal());
        assert!(
            !HarnessError::AdapterTimeout {
                implementation: "x".to_owned(),
                timeout: Duration::from_secs(1),
            }
            .is_fatal()
        );
    }

    #[test]
    fn exit_codes() {
        assert_eq!(HarnessError::malformed("a", "b").exit_code(), 2);
        assert_eq!(HarnessError::execution("a", "b").exit_code(), 1);
    }

    #[test]
    fn suggestions() {
        assert!(
            HarnessError::FixtureNotFound { key: "k".to_owned() }
                .suggestion()
                .is_some()
        );
        assert!(HarnessError::Serialization("x".to_owned()).suggestion().is_none());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HarnessError = io.into();
        assert!(matches!(err, HarnessError::Io(_)));
        assert!(err.is_fatal());
    }
}
