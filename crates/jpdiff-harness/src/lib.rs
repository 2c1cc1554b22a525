//! Differential conformance harness for JSONPath query engines.
//!
//! Runs the same declarative cases against two or more independent JSONPath
//! implementations, normalizes every answer into an [`ExecutionResult`], and
//! reports where the implementations agree or diverge: by count, by value
//! sequence, by path sequence, and by error-versus-success outcome.
//!
//! The harness never evaluates JSONPath itself and is not a correctness
//! oracle. A case's `expectedCount` is checked against every implementation
//! but never decides a match.
//!
//! Data flow: [`FixtureRegistry`] + [`CaseSet`] → [`Orchestrator`] →
//! [`QueryAdapter`]s → [`comparator::compare`] → [`aggregate::Aggregator`] →
//! [`RunReport`].

pub mod adapter;
pub mod aggregate;
pub mod cases;
pub mod comparator;
pub mod config;
pub mod execution;
pub mod fixtures;
pub mod oracle;
pub mod orchestrator;
pub mod render;
pub mod report;
pub mod subprocess;

pub use adapter::{InProcessAdapter, QueryAdapter};
pub use cases::{Case, CaseSet, Suite};
pub use config::HarnessConfig;
pub use execution::{ExecutionResult, FailureKind, QueryMatch};
pub use fixtures::FixtureRegistry;
pub use jpdiff_error::{ErrorScope, HarnessError, Result};
pub use orchestrator::{Orchestrator, RunConfig, RunOutcome};
pub use report::{ReportDetail, RunReport};
pub use subprocess::{AdapterCommand, DocumentMode, SubprocessAdapter};
