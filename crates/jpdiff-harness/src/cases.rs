//! Case set: the ordered, declarative list of (query, fixture, expectation)
//! cases a run walks through.
//!
//! Case order is significant. Reports list cases exactly in declaration
//! order and category summaries iterate in first-appearance order.
//!
//! # Document shapes
//!
//! ```text
//! suite document:  {"fixtures": {<key>: <json>, ...}, "cases": [<case>, ...]}
//! case document:   [<case>, ...]   or   {"cases": [<case>, ...]}
//! ```
//!
//! Each case is `{name, query, fixtureKey, category, description?,
//! expectedCount?}`. The older field names `jsonpath` and `data` are accepted
//! for `query` and `fixtureKey`.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use jpdiff_error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::fixtures::{FixtureRegistry, read_json_document};

/// One differential test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Case {
    /// Unique case name within the set.
    pub name: String,
    /// JSONPath expression; opaque to the harness.
    #[serde(alias = "jsonpath")]
    pub query: String,
    /// Key into the fixture registry.
    #[serde(alias = "data", alias = "fixture")]
    pub fixture_key: String,
    /// Reporting group.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared result count. Checked against every implementation but never
    /// treated as ground truth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_count: Option<usize>,
}

impl Case {
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        fixture_key: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            fixture_key: fixture_key.into(),
            category: category.into(),
            description: None,
            expected_count: None,
        }
    }

    #[must_use]
    pub const fn with_expected_count(mut self, expected: usize) -> Self {
        self.expected_count = Some(expected);
        self
    }
}

/// Ordered collection of cases with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseSet {
    cases: Vec<Case>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CaseDocument {
    Bare(Vec<Case>),
    Wrapped { cases: Vec<Case> },
}

impl CaseSet {
    /// Build a case set, validating names and required fields.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` for an empty name, empty fixture key, empty
    /// category, or duplicate case name.
    pub fn new(source_name: &str, cases: Vec<Case>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for (index, case) in cases.iter().enumerate() {
            if case.name.trim().is_empty() {
                return Err(HarnessError::malformed(
                    source_name,
                    format!("case #{index} has an empty name"),
                ));
            }
            if case.fixture_key.trim().is_empty() {
                return Err(HarnessError::malformed(
                    source_name,
                    format!("case '{}' has an empty fixtureKey", case.name),
                ));
            }
            if case.category.trim().is_empty() {
                return Err(HarnessError::malformed(
                    source_name,
                    format!("case '{}' has an empty category", case.name),
                ));
            }
            if !seen.insert(case.name.as_str()) {
                return Err(HarnessError::malformed(
                    source_name,
                    format!("duplicate case name '{}'", case.name),
                ));
            }
        }
        Ok(Self { cases })
    }

    /// Parse a case document (bare array or `{"cases": [...]}`).
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the value has neither shape or fails
    /// validation.
    pub fn from_value(source_name: &str, document: Value) -> Result<Self> {
        let parsed: CaseDocument = serde_json::from_value(document)
            .map_err(|err| HarnessError::malformed(source_name, err.to_string()))?;
        let cases = match parsed {
            CaseDocument::Bare(cases) | CaseDocument::Wrapped { cases } => cases,
        };
        Self::new(source_name, cases)
    }

    /// Load a standalone case document from disk.
    ///
    /// # Errors
    ///
    /// See [`Self::from_value`]; also `InputNotFound` for a missing file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let document = read_json_document(path)?;
        let set = Self::from_value(&path.display().to_string(), document)?;
        info!(path = %path.display(), cases = set.len(), "case set loaded");
        Ok(set)
    }

    #[must_use]
    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Case> {
        self.cases.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Fixture keys referenced by cases but absent from `registry`, in case
    /// order without repeats. Missing fixtures are not fatal; this is for
    /// diagnostics before a run.
    #[must_use]
    pub fn unresolved_fixture_keys(&self, registry: &FixtureRegistry) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.cases
            .iter()
            .filter(|case| !registry.contains(&case.fixture_key))
            .filter(|case| seen.insert(case.fixture_key.as_str()))
            .map(|case| case.fixture_key.clone())
            .collect()
    }
}

impl<'a> IntoIterator for &'a CaseSet {
    type Item = &'a Case;
    type IntoIter = std::slice::Iter<'a, Case>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

/// Fixtures and cases loaded from one combined document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suite {
    pub fixtures: FixtureRegistry,
    pub cases: CaseSet,
}

impl Suite {
    /// Parse a combined suite document.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if `fixtures` or `cases` is missing or
    /// invalid.
    pub fn from_value(source_name: &str, document: Value) -> Result<Self> {
        let Value::Object(mut members) = document else {
            return Err(HarnessError::malformed(
                source_name,
                "suite document must be a JSON object with 'fixtures' and 'cases'",
            ));
        };
        let fixtures = members.remove("fixtures").ok_or_else(|| {
            HarnessError::malformed(source_name, "suite document is missing 'fixtures'")
        })?;
        let cases = members.remove("cases").ok_or_else(|| {
            HarnessError::malformed(source_name, "suite document is missing 'cases'")
        })?;
        Ok(Self {
            fixtures: FixtureRegistry::from_registry_value(source_name, fixtures)?,
            cases: CaseSet::from_value(source_name, cases)?,
        })
    }

    /// Load a combined suite document from disk.
    ///
    /// # Errors
    ///
    /// See [`Self::from_value`]; also `InputNotFound` for a missing file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let document = read_json_document(path)?;
        let suite = Self::from_value(&path.display().to_string(), document)?;
        info!(
            path = %path.display(),
            fixtures = suite.fixtures.len(),
            cases = suite.cases.len(),
            "suite loaded"
        );
        Ok(suite)
    }
}

/// SHA-256 fingerprint of a case set and fixture registry, for tying a
/// report back to its exact inputs.
#[must_use]
pub fn suite_fingerprint(cases: &CaseSet, fixtures: &FixtureRegistry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"jpdiff-suite-v1:");
    for (key, document) in fixtures.iter() {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(document.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"---\n");
    for case in cases {
        hasher.update(case.name.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(case.query.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(case.fixture_key.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(case.category.as_bytes());
        hasher.update(b"\x1f");
        if let Some(expected) = case.expected_count {
            hasher.update(expected.to_string().as_bytes());
        }
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
