//! Run orchestrator.
//!
//! Drives every case through every adapter, compares all unordered adapter
//! pairs, classifies disagreements, and folds the verdicts into a
//! [`RunSummary`]. Cases are reported in case-set order whatever the worker
//! count.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jpdiff_error::{HarnessError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::adapter::QueryAdapter;
use crate::aggregate::{Aggregator, MismatchKind, RunSummary, classify_pair, merge_kinds};
use crate::cases::{Case, CaseSet, suite_fingerprint};
use crate::comparator::{Comparison, compare};
use crate::execution::{ExecutionResult, FailureKind};
use crate::fixtures::FixtureRegistry;
use crate::oracle::OracleVerdict;

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ===========================================================================
// Configuration
// ===========================================================================

/// Everything a run needs, passed in explicitly.
#[derive(Clone)]
pub struct RunConfig {
    pub adapters: Vec<Arc<dyn QueryAdapter>>,
    /// Hard bound on every single adapter invocation.
    pub timeout: Duration,
    /// Number of cases evaluated concurrently. `1` is sequential.
    pub workers: usize,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("adapters", &self.implementations())
            .field("timeout", &self.timeout)
            .field("workers", &self.workers)
            .finish()
    }
}

impl RunConfig {
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn QueryAdapter>>) -> Self {
        Self {
            adapters,
            timeout: DEFAULT_TIMEOUT,
            workers: 1,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Adapter names in declaration order.
    #[must_use]
    pub fn implementations(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_owned()).collect()
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` for fewer than two adapters, an empty or
    /// duplicate adapter name, a zero timeout, or zero workers.
    pub fn validate(&self) -> Result<()> {
        if self.adapters.len() < 2 {
            return Err(HarnessError::invalid_config(format!(
                "at least two adapters are required, got {}",
                self.adapters.len()
            )));
        }
        let mut seen = HashSet::new();
        for adapter in &self.adapters {
            let name = adapter.name();
            if name.trim().is_empty() {
                return Err(HarnessError::invalid_config("adapter name must not be empty"));
            }
            if !seen.insert(name) {
                return Err(HarnessError::invalid_config(format!(
                    "duplicate adapter name '{name}'"
                )));
            }
        }
        if self.timeout.is_zero() {
            return Err(HarnessError::invalid_config("timeout must be greater than zero"));
        }
        if self.workers == 0 {
            return Err(HarnessError::invalid_config("workers must be at least 1"));
        }
        Ok(())
    }
}

// ===========================================================================
// Per-case records
// ===========================================================================

/// One implementation's result for a case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationResult {
    pub implementation: String,
    pub result: ExecutionResult,
}

/// Comparison of one unordered adapter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairComparison {
    pub left: usize,
    pub right: usize,
    pub comparison: Comparison,
}

/// Everything recorded for one case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    /// Position in the case set.
    pub index: usize,
    pub case: Case,
    /// One entry per adapter, in adapter declaration order.
    pub results: Vec<ImplementationResult>,
    /// Pairs `(i, j)` with `i < j`, indices into `results`.
    pub comparisons: Vec<PairComparison>,
    /// Axis-wise conjunction over every pair.
    pub verdict: Comparison,
    /// Union of every pair's classification, priority order.
    pub mismatches: Vec<MismatchKind>,
    pub oracle: Option<OracleVerdict>,
}

impl CaseOutcome {
    /// Compare every unordered pair of `results` and derive the verdict.
    #[must_use]
    pub fn evaluate(index: usize, case: Case, results: Vec<ImplementationResult>) -> Self {
        let mut comparisons = Vec::new();
        let mut verdict = Comparison::perfect();
        let mut kinds = Vec::new();
        for left in 0..results.len() {
            for right in left + 1..results.len() {
                let (a, b) = (&results[left].result, &results[right].result);
                let comparison = compare(a, b);
                verdict = verdict.and(comparison);
                kinds.extend(classify_pair(a, b, &comparison));
                comparisons.push(PairComparison {
                    left,
                    right,
                    comparison,
                });
            }
        }
        let oracle = case.expected_count.map(|expected| {
            OracleVerdict::evaluate(
                expected,
                results
                    .iter()
                    .map(|r| (r.implementation.as_str(), &r.result)),
            )
        });
        Self {
            index,
            case,
            results,
            comparisons,
            verdict,
            mismatches: merge_kinds(kinds),
            oracle,
        }
    }

    #[must_use]
    pub const fn is_perfect(&self) -> bool {
        self.verdict.perfect_match
    }

    /// Highest-priority mismatch kind, if any.
    #[must_use]
    pub fn primary_mismatch(&self) -> Option<MismatchKind> {
        self.mismatches.first().copied()
    }

    #[must_use]
    pub fn result_for(&self, implementation: &str) -> Option<&ExecutionResult> {
        self.results
            .iter()
            .find(|r| r.implementation == implementation)
            .map(|r| &r.result)
    }
}

/// Result of a whole run, before it is shaped into a report.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub implementations: Vec<String>,
    /// Unix milliseconds at run start.
    pub started_at_ms: u64,
    pub elapsed_ms: u64,
    /// SHA-256 of the case set and fixtures.
    pub data_hash: String,
    pub cases: Vec<CaseOutcome>,
    pub summary: RunSummary,
}

impl RunOutcome {
    #[must_use]
    pub fn all_perfect(&self) -> bool {
        self.cases.iter().all(CaseOutcome::is_perfect)
    }
}

// ===========================================================================
// Orchestrator
// ===========================================================================

/// Owns the run configuration and executes case sets against it.
#[derive(Debug)]
pub struct Orchestrator {
    config: RunConfig,
}

impl Orchestrator {
    /// # Errors
    ///
    /// Returns `InvalidConfig` when `config` fails [`RunConfig::validate`].
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute one case against every adapter.
    #[must_use]
    pub fn run_case(&self, index: usize, case: &Case, fixtures: &FixtureRegistry) -> CaseOutcome {
        let started = Instant::now();
        let results = match fixtures.resolve(&case.fixture_key) {
            Ok(document) => self
                .config
                .adapters
                .iter()
                .map(|adapter| ImplementationResult {
                    implementation: adapter.name().to_owned(),
                    result: adapter.invoke(&case.query, &document, self.config.timeout),
                })
                .collect(),
            Err(err) => {
                warn!(
                    case = %case.name,
                    fixture_key = %case.fixture_key,
                    "fixture not found, recording failure for every adapter"
                );
                self.uniform_results(&ExecutionResult::from_error(&err))
            }
        };
        let outcome = CaseOutcome::evaluate(index, case.clone(), results);
        debug!(
            case = %case.name,
            category = %case.category,
            perfect = outcome.is_perfect(),
            primary_mismatch = ?outcome.primary_mismatch(),
            elapsed_ms = elapsed_ms_u64(started.elapsed()),
            "case finished"
        );
        outcome
    }

    /// Execute every case and aggregate the verdicts.
    #[must_use]
    pub fn run(&self, cases: &CaseSet, fixtures: &FixtureRegistry) -> RunOutcome {
        let started_at_ms = unix_millis_now();
        let started = Instant::now();
        let implementations = self.config.implementations();
        let workers = self.config.workers.clamp(1, cases.len().max(1));
        info!(
            cases = cases.len(),
            fixtures = fixtures.len(),
            implementations = %implementations.join(","),
            workers,
            timeout_ms = self.config.timeout.as_millis(),
            "differential run started"
        );

        let outcomes: Vec<CaseOutcome> = if workers == 1 {
            cases
                .iter()
                .enumerate()
                .map(|(index, case)| self.run_case(index, case, fixtures))
                .collect()
        } else {
            self.run_parallel(cases, fixtures, workers)
        };

        let mut aggregator = Aggregator::new();
        for outcome in &outcomes {
            aggregator.record(
                &outcome.case.category,
                &outcome.verdict,
                &outcome.mismatches,
                outcome.oracle.as_ref(),
            );
        }
        let summary = aggregator.finish();
        let elapsed_ms = elapsed_ms_u64(started.elapsed());
        info!(
            total = summary.total,
            perfect_matches = summary.perfect_matches,
            elapsed_ms,
            "differential run finished"
        );

        RunOutcome {
            implementations,
            started_at_ms,
            elapsed_ms,
            data_hash: suite_fingerprint(cases, fixtures),
            cases: outcomes,
            summary,
        }
    }

    fn run_parallel(&self, cases: &CaseSet, fixtures: &FixtureRegistry, workers: usize) -> Vec<CaseOutcome> {
        let slots: Vec<Mutex<Option<CaseOutcome>>> = (0..cases.len()).map(|_| Mutex::new(None)).collect();
        let next = AtomicUsize::new(0);

        thread::scope(|s| {
            let mut joins = Vec::with_capacity(workers);
            for worker in 0..workers {
                let slots = &slots;
                let next = &next;
                joins.push(s.spawn(move || {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(case) = cases.cases().get(index) else {
                            break;
                        };
                        let outcome = self.run_case(index, case, fixtures);
                        *slots[index].lock() = Some(outcome);
                    }
                    debug!(worker, "worker drained the case queue");
                }));
            }
            for join in joins {
                if join.join().is_err() {
                    error!("worker thread panicked");
                }
            }
        });

        slots
            .into_iter()
            .zip(cases)
            .enumerate()
            .map(|(index, (slot, case))| {
                slot.into_inner().unwrap_or_else(|| {
                    let failed = ExecutionResult::failure(
                        FailureKind::ExecutionFailure,
                        "worker thread panicked before recording this case",
                    );
                    CaseOutcome::evaluate(index, case.clone(), self.uniform_results(&failed))
                })
            })
            .collect()
    }

    fn uniform_results(&self, result: &ExecutionResult) -> Vec<ImplementationResult> {
        self.config
            .adapters
            .iter()
            .map(|adapter| ImplementationResult {
                implementation: adapter.name().to_owned(),
                result: result.clone(),
            })
            .collect()
    }
}

fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, elapsed_ms_u64)
}

fn elapsed_ms_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
