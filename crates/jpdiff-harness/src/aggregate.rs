//! Mismatch classification and run-level aggregation.
//!
//! The aggregator folds case verdicts into overall and per-category tallies.
//! Categories keep the order in which they first appear in the case set.
//! "Fully working" and "needs attention" are derived on demand from the
//! stored counts and never stored themselves.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::comparator::Comparison;
use crate::execution::ExecutionResult;
use crate::oracle::{OracleTally, OracleVerdict};

/// Match ratio below which a category needs attention.
pub const NEEDS_ATTENTION_RATIO: f64 = 0.5;

/// Kind of disagreement between two implementations.
///
/// Variants are declared in priority order, so the smallest kind of a case
/// is its primary classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// One side returned nothing where the other returned something.
    ZeroResult,
    CountMismatch,
    /// Counts agree, values differ.
    ValueMismatch,
    ErrorMismatch,
    /// Counts and values agree, only paths differ.
    PathMismatch,
}

impl MismatchKind {
    pub const ALL: [Self; 5] = [
        Self::ZeroResult,
        Self::CountMismatch,
        Self::ValueMismatch,
        Self::ErrorMismatch,
        Self::PathMismatch,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ZeroResult => "zero_result",
            Self::CountMismatch => "count_mismatch",
            Self::ValueMismatch => "value_mismatch",
            Self::ErrorMismatch => "error_mismatch",
            Self::PathMismatch => "path_mismatch",
        }
    }
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one pair of results, in priority order.
///
/// A perfect comparison yields no kinds; any other comparison yields at
/// least one.
#[must_use]
pub fn classify_pair(a: &ExecutionResult, b: &ExecutionResult, comparison: &Comparison) -> Vec<MismatchKind> {
    if comparison.perfect_match {
        return Vec::new();
    }
    let mut kinds = Vec::new();
    if (a.count == 0) != (b.count == 0) {
        kinds.push(MismatchKind::ZeroResult);
    }
    if !comparison.count_match {
        kinds.push(MismatchKind::CountMismatch);
    }
    if comparison.count_match && !comparison.values_match {
        kinds.push(MismatchKind::ValueMismatch);
    }
    if !comparison.error_match {
        kinds.push(MismatchKind::ErrorMismatch);
    }
    if comparison.count_match && comparison.values_match && !comparison.paths_match {
        kinds.push(MismatchKind::PathMismatch);
    }
    kinds
}

/// Union of several classifications, sorted by priority.
#[must_use]
pub fn merge_kinds<I>(kinds: I) -> Vec<MismatchKind>
where
    I: IntoIterator<Item = MismatchKind>,
{
    kinds.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Percentage of `part` in `total`, `0.0` for an empty total.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Tally for one category label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: String,
    pub total: usize,
    pub matches: usize,
}

impl CategorySummary {
    #[must_use]
    pub fn percent(&self) -> f64 {
        percent(self.matches, self.total)
    }

    #[must_use]
    pub const fn is_fully_working(&self) -> bool {
        self.total > 0 && self.matches == self.total
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn needs_attention(&self) -> bool {
        self.total > 0 && (self.matches as f64 / self.total as f64) < NEEDS_ATTENTION_RATIO
    }
}

/// Per-kind mismatch counts. A case with several kinds counts once per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchTally {
    pub zero_result: usize,
    pub count_mismatch: usize,
    pub value_mismatch: usize,
    pub error_mismatch: usize,
    pub path_mismatch: usize,
}

impl MismatchTally {
    pub fn record(&mut self, kind: MismatchKind) {
        match kind {
            MismatchKind::ZeroResult => self.zero_result += 1,
            MismatchKind::CountMismatch => self.count_mismatch += 1,
            MismatchKind::ValueMismatch => self.value_mismatch += 1,
            MismatchKind::ErrorMismatch => self.error_mismatch += 1,
            MismatchKind::PathMismatch => self.path_mismatch += 1,
        }
    }

    #[must_use]
    pub const fn get(&self, kind: MismatchKind) -> usize {
        match kind {
            MismatchKind::ZeroResult => self.zero_result,
            MismatchKind::CountMismatch => self.count_mismatch,
            MismatchKind::ValueMismatch => self.value_mismatch,
            MismatchKind::ErrorMismatch => self.error_mismatch,
            MismatchKind::PathMismatch => self.path_mismatch,
        }
    }
}

/// Overall run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub perfect_matches: usize,
    pub count_matches: usize,
    pub value_matches: usize,
    pub path_matches: usize,
    pub error_matches: usize,
    pub categories: Vec<CategorySummary>,
    pub mismatches: MismatchTally,
    pub oracle: OracleTally,
}

impl RunSummary {
    #[must_use]
    pub fn overall_percent(&self) -> f64 {
        percent(self.perfect_matches, self.total)
    }

    pub fn fully_working_categories(&self) -> impl Iterator<Item = &CategorySummary> {
        self.categories.iter().filter(|c| c.is_fully_working())
    }

    pub fn needs_attention_categories(&self) -> impl Iterator<Item = &CategorySummary> {
        self.categories.iter().filter(|c| c.needs_attention())
    }

    #[must_use]
    pub fn category(&self, label: &str) -> Option<&CategorySummary> {
        self.categories.iter().find(|c| c.category == label)
    }
}

/// Running fold of case verdicts into a [`RunSummary`].
#[derive(Debug, Default)]
pub struct Aggregator {
    summary: RunSummary,
    category_slots: HashMap<String, usize>,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one case.
    pub fn record(
        &mut self,
        category: &str,
        verdict: &Comparison,
        mismatches: &[MismatchKind],
        oracle: Option<&OracleVerdict>,
    ) {
        let summary = &mut self.summary;
        summary.total += 1;
        summary.perfect_matches += usize::from(verdict.perfect_match);
        summary.count_matches += usize::from(verdict.count_match);
        summary.value_matches += usize::from(verdict.values_match);
        summary.path_matches += usize::from(verdict.paths_match);
        summary.error_matches += usize::from(verdict.error_match);

        let slot = match self.category_slots.get(category) {
            Some(&slot) => slot,
            None => {
                summary.categories.push(CategorySummary {
                    category: category.to_owned(),
                    total: 0,
                    matches: 0,
                });
                let slot = summary.categories.len() - 1;
                self.category_slots.insert(category.to_owned(), slot);
                slot
            }
        };
        let entry = &mut summary.categories[slot];
        entry.total += 1;
        entry.matches += usize::from(verdict.perfect_match);

        for &kind in mismatches {
            summary.mismatches.record(kind);
        }
        summary.oracle.record(oracle);
    }

    #[must_use]
    pub fn finish(self) -> RunSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::comparator::compare;
    use crate::execution::{FailureKind, QueryMatch};

    fn ok(values: &[i64]) -> ExecutionResult {
        ExecutionResult::success(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| QueryMatch::new(format!("$[{i}]"), json!(v)))
                .collect(),
        )
    }

    #[test]
    fn negative_index_divergence_is_zero_result_first() {
        let a = ExecutionResult::success(vec![QueryMatch::new("$.a[2]", json!(3))]);
        let b = ExecutionResult::failure(FailureKind::ImplementationError, "negative index");
        let cmp = compare(&a, &b);
        let kinds = classify_pair(&a, &b, &cmp);
        assert_eq!(kinds.first(), Some(&MismatchKind::ZeroResult));
        assert!(kinds.contains(&MismatchKind::CountMismatch));
        assert!(kinds.contains(&MismatchKind::ErrorMismatch));
        assert!(!kinds.contains(&MismatchKind::ValueMismatch));
    }

    #[test]
    fn same_count_different_values() {
        let a = ok(&[1, 2]);
        let b = ok(&[2, 1]);
        let kinds = classify_pair(&a, &b, &compare(&a, &b));
        assert_eq!(kinds, vec![MismatchKind::ValueMismatch]);
    }

    #[test]
    fn paths_only_divergence_is_classified() {
        let a = ExecutionResult::success(vec![QueryMatch::new("$.a", json!(1))]);
        let b = ExecutionResult::success(vec![QueryMatch::new("$['a']", json!(1))]);
        let kinds = classify_pair(&a, &b, &compare(&a, &b));
        assert_eq!(kinds, vec![MismatchKind::PathMismatch]);
    }

    #[test]
    fn empty_success_versus_error_is_error_mismatch_only() {
        let a = ok(&[]);
        let b = ExecutionResult::failure(FailureKind::Timeout, "slow");
        let kinds = classify_pair(&a, &b, &compare(&a, &b));
        assert_eq!(kinds, vec![MismatchKind::ErrorMismatch]);
    }

    #[test]
    fn perfect_pair_is_unclassified() {
        let a = ok(&[7]);
        assert!(classify_pair(&a, &a, &compare(&a, &a)).is_empty());
    }

    #[test]
    fn merge_kinds_sorts_and_dedups() {
        let merged = merge_kinds([
            MismatchKind::ErrorMismatch,
            MismatchKind::ZeroResult,
            MismatchKind::ErrorMismatch,
        ]);
        assert_eq!(merged, vec![MismatchKind::ZeroResult, MismatchKind::ErrorMismatch]);
    }

    #[test]
    fn categories_keep_first_appearance_order() {
        let mut agg = Aggregator::new();
        let perfect = Comparison::perfect();
        let broken = Comparison::from_axes(false, false, false, true);
        agg.record("wildcard", &perfect, &[], None);
        agg.record("basic", &broken, &[MismatchKind::CountMismatch], None);
        agg.record("wildcard", &broken, &[MismatchKind::ZeroResult], None);
        agg.record("basic", &broken, &[MismatchKind::CountMismatch], None);
        let summary = agg.finish();

        let labels: Vec<_> = summary.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(labels, vec!["wildcard", "basic"]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.perfect_matches, 1);
        assert_eq!(summary.error_matches, 4);
        assert_eq!(summary.mismatches.count_mismatch, 2);
        assert_eq!(summary.category("wildcard").map(|c| c.matches), Some(1));
        assert!(summary.needs_attention_categories().any(|c| c.category == "basic"));
        assert_eq!(summary.fully_working_categories().count(), 0);
    }

    #[test]
    fn half_matching_category_does_not_need_attention() {
        let category = CategorySummary {
            category: "filters".to_owned(),
            total: 4,
            matches: 2,
        };
        assert!(!category.needs_attention());
        assert!(!category.is_fully_working());
        assert!((category.percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_run_percentages_are_zero() {
        let summary = Aggregator::new().finish();
        assert_eq!(summary.total, 0);
        assert!(summary.overall_percent().abs() < f64::EPSILON);
        assert!(percent(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn oracle_verdicts_are_tallied() {
        let mut agg = Aggregator::new();
        agg.record("x", &Comparison::perfect(), &[], Some(&OracleVerdict::DisagreesWithAll));
        agg.record("x", &Comparison::perfect(), &[], None);
        let summary = agg.finish();
        assert_eq!(summary.oracle.declared, 1);
        assert_eq!(summary.oracle.disagrees_with_all, 1);
    }

    fn arb_verdict() -> impl Strategy<Value = Comparison> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>())
            .prop_map(|(c, v, p, e)| Comparison::from_axes(c, v, p, e))
    }

    proptest! {
        #[test]
        fn prop_category_totals_are_consistent(
            cases in prop::collection::vec(("[a-d]", arb_verdict()), 0..40)
        ) {
            let mut agg = Aggregator::new();
            for (category, verdict) in &cases {
                agg.record(category, verdict, &[], None);
            }
            let summary = agg.finish();
            prop_assert_eq!(summary.total, cases.len());
            let total: usize = summary.categories.iter().map(|c| c.total).sum();
            let matches: usize = summary.categories.iter().map(|c| c.matches).sum();
            prop_assert_eq!(total, cases.len());
            prop_assert_eq!(matches, summary.perfect_matches);
            for category in &summary.categories {
                prop_assert!(category.matches <= category.total);
                prop_assert!(category.total > 0);
                prop_assert!(!(category.is_fully_working() && category.needs_attention()));
            }
            prop_assert!(summary.perfect_matches <= summary.count_matches);
            prop_assert!(summary.perfect_matches <= summary.error_matches);
        }

        #[test]
        fn prop_non_perfect_pairs_are_always_classified(
            a in prop::collection::vec(-3i64..3, 0..4),
            b in prop::collection::vec(-3i64..3, 0..4),
            b_errors in any::<bool>(),
        ) {
            let left = ok(&a);
            let right = if b_errors {
                ExecutionResult::failure(FailureKind::ExecutionFailure, "crash")
            } else {
                ok(&b)
            };
            let cmp = compare(&left, &right);
            let kinds = classify_pair(&left, &right, &cmp);
            prop_assert_eq!(kinds.is_empty(), cmp.perfect_match);
            let mut sorted = kinds.clone();
            sorted.sort();
            prop_assert_eq!(sorted, kinds);
        }
    }
}
