//! Adapter abstraction over implementations under test.
//!
//! An adapter runs one query against one document with one implementation
//! and always returns an [`ExecutionResult`]. Crashes, panics, hangs, and
//! garbage output are converted to failure results inside the adapter; they
//! never reach the orchestrator as a fault.
//!
//! Two transports ship with the harness:
//!
//! - [`InProcessAdapter`]: a Rust closure, run on a helper thread so the
//!   timeout can be enforced and panics contained.
//! - [`crate::subprocess::SubprocessAdapter`]: an external program speaking
//!   the JSON output protocol on stdout.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use jpdiff_error::HarnessError;
use serde_json::Value;
use tracing::{debug, warn};

use crate::execution::{ExecutionResult, FailureKind, QueryMatch};

/// Uniform execution interface to one implementation under test.
pub trait QueryAdapter: Send + Sync {
    /// Implementation label used in reports. Unique within a run.
    fn name(&self) -> &str;

    /// Run `query` against `document`, giving up after `timeout`.
    ///
    /// Must not panic and must not block meaningfully longer than
    /// `timeout`.
    fn invoke(&self, query: &str, document: &Value, timeout: Duration) -> ExecutionResult;
}

impl<T: QueryAdapter + ?Sized> QueryAdapter for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invoke(&self, query: &str, document: &Value, timeout: Duration) -> ExecutionResult {
        (**self).invoke(query, document, timeout)
    }
}

impl<T: QueryAdapter + ?Sized> QueryAdapter for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invoke(&self, query: &str, document: &Value, timeout: Duration) -> ExecutionResult {
        (**self).invoke(query, document, timeout)
    }
}

/// Signature of an in-process JSONPath evaluator.
///
/// Returns the ordered matches, or the implementation's error message.
pub type QueryFn = dyn Fn(&str, &Value) -> Result<Vec<QueryMatch>, String> + Send + Sync;

/// Adapter around a Rust function or library call.
#[derive(Clone)]
pub struct InProcessAdapter {
    name: String,
    query_fn: Arc<QueryFn>,
}

impl fmt::Debug for InProcessAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessAdapter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl InProcessAdapter {
    pub fn new<F>(name: impl Into<String>, query_fn: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Vec<QueryMatch>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            query_fn: Arc::new(query_fn),
        }
    }
}

impl QueryAdapter for InProcessAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, query: &str, document: &Value, timeout: Duration) -> ExecutionResult {
        let (tx, rx) = mpsc::sync_channel(1);
        let query_fn = Arc::clone(&self.query_fn);
        let owned_query = query.to_owned();
        let owned_document = document.clone();

        let spawned = thread::Builder::new()
            .name(format!("jpdiff-{}", self.name))
            .spawn(move || {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| query_fn(&owned_query, &owned_document)));
                // The receiver is gone when the invocation already timed out.
                let _ = tx.send(outcome);
            });
        if let Err(err) = spawned {
            return ExecutionResult::from_error(&HarnessError::execution(
                &self.name,
                format!("failed to start evaluation thread: {err}"),
            ));
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(Ok(matches))) => {
                debug!(
                    implementation = %self.name,
                    count = matches.len(),
                    "in-process evaluation finished"
                );
                ExecutionResult::success(matches)
            }
            Ok(Ok(Err(message))) => ExecutionResult::from_error(&HarnessError::ImplementationError {
                implementation: self.name.clone(),
                message,
            }),
            Ok(Err(payload)) => {
                let detail = format!("panicked: {}", panic_message(payload.as_ref()));
                warn!(implementation = %self.name, %detail, "in-process evaluator panicked");
                ExecutionResult::from_error(&HarnessError::execution(&self.name, detail))
            }
            Err(RecvTimeoutError::Timeout) => {
                // The helper thread is detached; it is abandoned, not joined.
                warn!(
                    implementation = %self.name,
                    timeout_ms = timeout.as_millis(),
                    "in-process evaluation timed out"
                );
                ExecutionResult::from_error(&HarnessError::AdapterTimeout {
                    implementation: self.name.clone(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => ExecutionResult::failure(
                FailureKind::ExecutionFailure,
                format!("{}: evaluation thread exited without a result", self.name),
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
