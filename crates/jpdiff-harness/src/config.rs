//! Harness configuration document.
//!
//! A `HarnessConfig` is a JSON file naming the implementations under test
//! and the inputs of a run:
//!
//! ```json
//! {
//!   "adapters": [
//!     {"name": "go", "program": "./bin/jp-go", "args": ["{query}", "{document}"]},
//!     {"name": "js", "program": "node", "args": ["adapters/jp.js", "{query}"], "document_mode": "stdin"}
//!   ],
//!   "suite": "suites/jsonpath_plus_parity.json",
//!   "timeout_ms": 10000,
//!   "workers": 1,
//!   "output": "reports/latest.json",
//!   "report_detail": "full"
//! }
//! ```
//!
//! Relative paths resolve from the directory holding the config file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jpdiff_error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::adapter::QueryAdapter;
use crate::cases::{CaseSet, Suite};
use crate::fixtures::{FixtureRegistry, read_json_document};
use crate::orchestrator::RunConfig;
use crate::report::ReportDetail;
use crate::subprocess::{AdapterCommand, SubprocessAdapter};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WORKERS: usize = 1;

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

const fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// Top-level configuration of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub adapters: Vec<AdapterCommand>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Combined `{fixtures, cases}` document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<PathBuf>,
    /// Registry document or directory of `<key>.json` files, merged with the
    /// suite's fixtures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<PathBuf>,
    /// Standalone case document. Replaces the suite's cases when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cases: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub report_detail: ReportDetail,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            workers: DEFAULT_WORKERS,
            suite: None,
            fixtures: None,
            cases: None,
            output: None,
            report_detail: ReportDetail::Full,
        }
    }
}

impl HarnessConfig {
    /// Parse a config document without resolving paths.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` on unknown fields or wrong types.
    pub fn from_value(source_name: &str, document: Value) -> Result<Self> {
        serde_json::from_value(document)
            .map_err(|err| HarnessError::malformed(source_name, err.to_string()))
    }

    /// Load a config file and resolve its relative paths against the file's
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns `InputNotFound` for a missing file and `MalformedInput` for an
    /// unparseable one.
    pub fn load_file(path: &Path) -> Result<Self> {
        let document = read_json_document(path)?;
        let mut config = Self::from_value(&path.display().to_string(), document)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_relative(base);
        info!(
            path = %path.display(),
            adapters = config.adapters.len(),
            "harness config loaded"
        );
        Ok(config)
    }

    /// Anchor every relative path at `base`. Bare program names such as
    /// `node` are left for `PATH` lookup.
    pub fn resolve_relative(&mut self, base: &Path) {
        for slot in [
            &mut self.suite,
            &mut self.fixtures,
            &mut self.cases,
            &mut self.output,
        ] {
            if let Some(path) = slot.as_mut() {
                anchor(path, base);
            }
        }
        for adapter in &mut self.adapters {
            let program = Path::new(&adapter.program);
            if program.is_relative() && program.components().count() > 1 {
                adapter.program = base.join(program).to_string_lossy().into_owned();
            }
            if let Some(dir) = adapter.working_dir.as_mut() {
                anchor(dir, base);
            }
            if let Some(dir) = adapter.scratch_dir.as_mut() {
                anchor(dir, base);
            }
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` when the config cannot describe a run.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(HarnessError::invalid_config("timeout_ms must be greater than zero"));
        }
        if self.workers == 0 {
            return Err(HarnessError::invalid_config("workers must be at least 1"));
        }
        if let Some(adapter) = self.adapters.iter().find(|a| a.program.trim().is_empty()) {
            return Err(HarnessError::invalid_config(format!(
                "adapter '{}' has an empty program",
                adapter.name
            )));
        }
        if self.suite.is_none() && self.cases.is_none() {
            return Err(HarnessError::invalid_config(
                "no cases configured: set 'suite' or 'cases'",
            ));
        }
        Ok(())
    }

    /// Build the run configuration with one subprocess adapter per entry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` from [`Self::validate`] or
    /// [`RunConfig::validate`].
    pub fn build_run_config(&self) -> Result<RunConfig> {
        self.validate()?;
        let adapters: Vec<Arc<dyn QueryAdapter>> = self
            .adapters
            .iter()
            .map(|command| Arc::new(SubprocessAdapter::new(command.clone())) as Arc<dyn QueryAdapter>)
            .collect();
        let run = RunConfig::new(adapters)
            .with_timeout(self.timeout())
            .with_workers(self.workers);
        run.validate()?;
        Ok(run)
    }

    /// Load the case set and fixture registry this config points at.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when no case source is set, and any loading
    /// error of the suite, fixture, or case documents.
    pub fn load_inputs(&self) -> Result<(CaseSet, FixtureRegistry)> {
        let (mut fixtures, suite_cases) = match &self.suite {
            Some(path) => {
                let suite = Suite::load_file(path)?;
                (suite.fixtures, Some(suite.cases))
            }
            None => (FixtureRegistry::new(), None),
        };

        if let Some(path) = &self.fixtures {
            let extra = if path.is_dir() {
                FixtureRegistry::load_dir(path)?
            } else {
                FixtureRegistry::load_registry_file(path)?
            };
            fixtures.merge(extra, &path.display().to_string())?;
        }

        let cases = match (&self.cases, suite_cases) {
            (Some(path), _) => CaseSet::load_file(path)?,
            (None, Some(cases)) => cases,
            (None, None) => {
                return Err(HarnessError::invalid_config(
                    "no cases configured: set 'suite' or 'cases'",
                ));
            }
        };

        let unresolved = cases.unresolved_fixture_keys(&fixtures);
        if !unresolved.is_empty() {
            warn!(
                keys = %unresolved.join(","),
                "cases reference unknown fixtures; they will be reported as fixture_not_found"
            );
        }
        Ok((cases, fixtures))
    }
}

fn anchor(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}
