use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use jpdiff_harness::aggregate::MismatchKind;
use jpdiff_harness::report::ReportDetail;
use jpdiff_harness::{
    Case, CaseSet, FailureKind, FixtureRegistry, InProcessAdapter, Orchestrator,
    QueryAdapter, QueryMatch, RunConfig, RunReport, Suite,
};

// ===========================================================================
// Stub implementations
// ===========================================================================

/// Understands `$.a[N]` for non-negative and negative N.
fn lenient(query: &str, document: &Value) -> Result<Vec<QueryMatch>, String> {
    let index: i64 = query
        .strip_prefix("$.a[")
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| format!("unsupported query {query}"))?;
    let items = document["a"].as_array().cloned().unwrap_or_default();
    let len = i64::try_from(items.len()).map_err(|e| e.to_string())?;
    let resolved = if index < 0 { len + index } else { index };
    let Some(position) = usize::try_from(resolved).ok().filter(|&p| p < items.len()) else {
        return Ok(Vec::new());
    };
    Ok(vec![QueryMatch::new(
        format!("$['a'][{position}]"),
        items[position].clone(),
    )])
}

/// Like `lenient` but rejects negative indices.
fn strict(query: &str, document: &Value) -> Result<Vec<QueryMatch>, String> {
    if query.contains("[-") {
        return Err("negative index not supported".to_owned());
    }
    lenient(query, document)
}

fn adapter<F>(name: &str, f: F) -> Arc<dyn QueryAdapter>
where
    F: Fn(&str, &Value) -> Result<Vec<QueryMatch>, String> + Send + Sync + 'static,
{
    Arc::new(InProcessAdapter::new(name, f))
}

fn fixtures() -> FixtureRegistry {
    let mut registry = FixtureRegistry::new();
    registry.insert("simple", json!({"a": [1, 2, 3]}));
    registry
}

fn cases(list: Vec<Case>) -> CaseSet {
    CaseSet::new("inline", list).expect("valid case set")
}

fn orchestrator(workers: usize) -> Orchestrator {
    Orchestrator::new(
        RunConfig::new(vec![adapter("lenient", lenient), adapter("strict", strict)])
            .with_workers(workers)
            .with_timeout(Duration::from_secs(5)),
    )
    .expect("valid run config")
}

fn mixed_cases() -> CaseSet {
    cases(vec![
        Case::new("first", "$.a[0]", "simple", "basic"),
        Case::new("last", "$.a[2]", "simple", "basic"),
        Case::new("negative", "$.a[-1]", "simple", "array_slicing"),
        Case::new("out of range", "$.a[9]", "simple", "array_slicing"),
        Case::new("ghost fixture", "$.a[0]", "missing_fixture", "errors"),
        Case::new("negative two", "$.a[-2]", "simple", "array_slicing").with_expected_count(1),
        Case::new("unsupported", "$..a", "simple", "errors"),
    ])
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn identical_outputs_are_a_perfect_match() {
    let outcome = orchestrator(1).run(
        &cases(vec![Case::new("first", "$.a[0]", "simple", "basic")]),
        &fixtures(),
    );
    let case = &outcome.cases[0];
    assert!(case.is_perfect());
    assert_eq!(case.result_for("lenient").map(|r| r.values.clone()), Some(vec![json!(1)]));
    assert_eq!(outcome.summary.perfect_matches, 1);
    assert!((outcome.summary.overall_percent() - 100.0).abs() < f64::EPSILON);
}

#[test]
fn negative_index_divergence() {
    let outcome = orchestrator(1).run(
        &cases(vec![Case::new("negative", "$.a[-1]", "simple", "array_slicing")]),
        &fixtures(),
    );
    let case = &outcome.cases[0];
    let lenient = case.result_for("lenient").expect("lenient result");
    assert_eq!(lenient.count, 1);
    assert_eq!(lenient.values, vec![json!(3)]);
    assert_eq!(lenient.paths, vec!["$['a'][2]"]);
    assert_eq!(
        case.result_for("strict").and_then(|r| r.failure),
        Some(FailureKind::ImplementationError)
    );

    assert!(!case.verdict.count_match);
    assert!(!case.verdict.error_match);
    assert!(!case.verdict.perfect_match);
    assert_eq!(case.primary_mismatch(), Some(MismatchKind::ZeroResult));
}

#[test]
fn missing_fixture_does_not_stop_the_run() {
    let outcome = orchestrator(1).run(
        &cases(vec![
            Case::new("ghost", "$.a[0]", "missing_fixture", "errors"),
            Case::new("after", "$.a[1]", "simple", "basic"),
        ]),
        &fixtures(),
    );
    assert_eq!(outcome.cases.len(), 2);
    let ghost = &outcome.cases[0];
    for entry in &ghost.results {
        assert_eq!(entry.result.failure, Some(FailureKind::FixtureNotFound));
        assert!(
            entry
                .result
                .error
                .as_deref()
                .is_some_and(|e| e.contains("missing_fixture"))
        );
    }
    assert!(ghost.is_perfect());
    assert!(outcome.cases[1].is_perfect());
    assert_eq!(outcome.summary.category("errors").map(|c| c.matches), Some(1));
}

#[test]
fn hanging_adapter_times_out_and_later_cases_complete() {
    let sleepy = adapter("sleepy", |query: &str, document: &Value| {
        if query == "$.a[0]" {
            thread::sleep(Duration::from_secs(30));
        }
        lenient(query, document)
    });
    let run = Orchestrator::new(
        RunConfig::new(vec![adapter("lenient", lenient), sleepy]).with_timeout(Duration::from_millis(100)),
    )
    .expect("valid run config");

    let started = Instant::now();
    let outcome = run.run(
        &cases(vec![
            Case::new("hangs", "$.a[0]", "simple", "basic"),
            Case::new("fine", "$.a[1]", "simple", "basic"),
        ]),
        &fixtures(),
    );
    assert!(started.elapsed() < Duration::from_secs(10));

    let hung = outcome.cases[0].result_for("sleepy").expect("sleepy result");
    assert_eq!(hung.failure, Some(FailureKind::Timeout));
    assert_eq!(hung.count, 0);
    assert!(hung.values.is_empty() && hung.paths.is_empty());
    assert!(!outcome.cases[0].is_perfect());
    assert!(outcome.cases[1].is_perfect());
}

#[test]
fn parallel_run_matches_sequential_run() {
    let sequential = orchestrator(1).run(&mixed_cases(), &fixtures());
    let parallel = orchestrator(4).run(&mixed_cases(), &fixtures());

    let seq_names: Vec<_> = sequential.cases.iter().map(|c| c.case.name.as_str()).collect();
    let par_names: Vec<_> = parallel.cases.iter().map(|c| c.case.name.as_str()).collect();
    assert_eq!(seq_names, par_names);
    assert_eq!(sequential.summary, parallel.summary);
    assert_eq!(sequential.data_hash, parallel.data_hash);
    for (a, b) in sequential.cases.iter().zip(&parallel.cases) {
        assert_eq!(a.results, b.results);
        assert_eq!(a.verdict, b.verdict);
    }
}

#[test]
fn summary_is_byte_identical_across_runs() {
    let first = RunReport::from_outcome(&orchestrator(1).run(&mixed_cases(), &fixtures()), ReportDetail::Full);
    let second = RunReport::from_outcome(&orchestrator(2).run(&mixed_cases(), &fixtures()), ReportDetail::Full);
    assert_eq!(
        first.summary_json().expect("summary"),
        second.summary_json().expect("summary")
    );
}

#[test]
fn summary_tallies_the_mixed_run() {
    let outcome = orchestrator(1).run(&mixed_cases(), &fixtures());
    let summary = &outcome.summary;
    assert_eq!(summary.total, 7);
    // first, last, out of range, ghost fixture, unsupported (both reject).
    assert_eq!(summary.perfect_matches, 5);
    assert_eq!(summary.mismatches.zero_result, 2);
    assert_eq!(summary.oracle.declared, 1);
    assert_eq!(summary.oracle.agrees_with_some, 1);

    let labels: Vec<_> = summary.categories.iter().map(|c| c.category.as_str()).collect();
    assert_eq!(labels, vec!["basic", "array_slicing", "errors"]);
    let totals: usize = summary.categories.iter().map(|c| c.total).sum();
    assert_eq!(totals, summary.total);
    assert_eq!(
        summary.fully_working_categories().map(|c| c.category.as_str()).collect::<Vec<_>>(),
        vec!["basic", "errors"]
    );
    assert_eq!(
        summary.needs_attention_categories().map(|c| c.category.as_str()).collect::<Vec<_>>(),
        vec!["array_slicing"]
    );
}

// ===========================================================================
// Bundled suite
// ===========================================================================

fn bundled_suite_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../suites/jsonpath_plus_parity.json")
}

#[test]
fn bundled_suite_loads_and_resolves() {
    let suite = Suite::load_file(&bundled_suite_path()).expect("bundled suite parses");
    assert!(suite.cases.len() >= 30);
    assert!(
        suite.cases.unresolved_fixture_keys(&suite.fixtures).is_empty(),
        "every bundled case must reference a bundled fixture"
    );
    assert!(suite.cases.iter().any(|c| c.expected_count.is_some()));
}

#[test]
fn bundled_suite_runs_against_stubs() {
    let suite = Suite::load_file(&bundled_suite_path()).expect("bundled suite parses");
    let echo = |_: &str, _: &Value| -> Result<Vec<QueryMatch>, String> { Ok(Vec::new()) };
    let outcome = Orchestrator::new(RunConfig::new(vec![adapter("a", echo), adapter("b", echo)]))
        .expect("valid run config")
        .run(&suite.cases, &suite.fixtures);
    assert_eq!(outcome.summary.total, suite.cases.len());
    assert!(outcome.all_perfect());
}
