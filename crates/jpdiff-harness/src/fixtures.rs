//! Fixture registry: named JSON documents used as query inputs.
//!
//! Fixtures are loaded once per run and shared read-only across every case
//! that references them. Two on-disk layouts are supported:
//!
//! - a single registry document, a JSON object mapping key to document;
//! - a directory of `<key>.json` files, one fixture per file.
//!
//! Any parse failure is a [`HarnessError::MalformedInput`] and is fatal to
//! the run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use jpdiff_error::{HarnessError, Result};
use serde_json::Value;
use tracing::{debug, info};

/// Immutable map from fixture key to JSON document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureRegistry {
    fixtures: BTreeMap<String, Arc<Value>>,
}

impl FixtureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an already parsed registry document.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` when `document` is not a JSON object.
    pub fn from_registry_value(source_name: &str, document: Value) -> Result<Self> {
        let Value::Object(entries) = document else {
            return Err(HarnessError::malformed(
                source_name,
                "fixture registry must be a JSON object keyed by fixture name",
            ));
        };
        let fixtures = entries
            .into_iter()
            .map(|(key, value)| (key, Arc::new(value)))
            .collect();
        Ok(Self { fixtures })
    }

    /// Load a single registry document from disk.
    ///
    /// # Errors
    ///
    /// Returns `InputNotFound` if the file is missing and `MalformedInput` if
    /// it does not parse into a JSON object.
    pub fn load_registry_file(path: &Path) -> Result<Self> {
        let document = read_json_document(path)?;
        let registry = Self::from_registry_value(&path.display().to_string(), document)?;
        info!(
            path = %path.display(),
            fixtures = registry.len(),
            "fixture registry loaded"
        );
        Ok(registry)
    }

    /// Load every `*.json` file in `dir` as one fixture keyed by file stem.
    ///
    /// Files are visited in sorted order so a duplicate stem cannot silently
    /// depend on directory iteration order; duplicates are rejected anyway.
    ///
    /// # Errors
    ///
    /// Returns `InputNotFound` when `dir` does not exist and `MalformedInput`
    /// for an unparseable file or duplicate key.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(HarnessError::InputNotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                return Err(HarnessError::malformed(
                    path.display().to_string(),
                    "fixture file name is not valid UTF-8",
                ));
            };
            let document = read_json_document(&path)?;
            if registry.fixtures.contains_key(key) {
                return Err(HarnessError::malformed(
                    path.display().to_string(),
                    format!("duplicate fixture key '{key}'"),
                ));
            }
            debug!(key, path = %path.display(), "fixture file loaded");
            registry.fixtures.insert(key.to_owned(), Arc::new(document));
        }

        info!(
            dir = %dir.display(),
            fixtures = registry.len(),
            "fixture directory loaded"
        );
        Ok(registry)
    }

    /// Add or replace one fixture.
    pub fn insert(&mut self, key: impl Into<String>, document: Value) {
        self.fixtures.insert(key.into(), Arc::new(document));
    }

    /// Merge `other` into `self`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if both registries define the same key.
    pub fn merge(&mut self, other: Self, source_name: &str) -> Result<()> {
        for (key, document) in other.fixtures {
            if self.fixtures.contains_key(&key) {
                return Err(HarnessError::malformed(
                    source_name,
                    format!("duplicate fixture key '{key}'"),
                ));
            }
            self.fixtures.insert(key, document);
        }
        Ok(())
    }

    /// Resolve a fixture key.
    ///
    /// # Errors
    ///
    /// Returns `FixtureNotFound` when the key is unknown.
    pub fn resolve(&self, key: &str) -> Result<Arc<Value>> {
        self.fixtures
            .get(key)
            .cloned()
            .ok_or_else(|| HarnessError::FixtureNotFound {
                key: key.to_owned(),
            })
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fixtures.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fixtures
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_ref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

/// Read and parse one JSON document, mapping failures to harness errors.
pub(crate) fn read_json_document(path: &Path) -> Result<Value> {
    if !path.is_file() {
        return Err(HarnessError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|err| HarnessError::malformed(path.display().to_string(), err.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn registry_from_object() {
        let registry = FixtureRegistry::from_registry_value(
            "inline",
            json!({"simple": {"a": [1, 2, 3]}, "empty": {}}),
        )
        .expect("object registry");
        assert_eq!(registry.len(), 2);
        assert_eq!(
            *registry.resolve("simple").expect("known key"),
            json!({"a": [1, 2, 3]})
        );
    }

    #[test]
    fn registry_rejects_non_object() {
        let err = FixtureRegistry::from_registry_value("inline", json!([1, 2]))
            .expect_err("arrays are not registries");
        assert!(matches!(err, HarnessError::MalformedInput { .. }));
    }

    #[test]
    fn resolve_unknown_key_is_fixture_not_found() {
        let registry = FixtureRegistry::new();
        let err = registry
            .resolve("missing_fixture")
            .expect_err("unknown key");
        assert!(matches!(err, HarnessError::FixtureNotFound { ref key } if key == "missing_fixture"));
    }

    #[test]
    fn shared_documents_are_not_copied() {
        let mut registry = FixtureRegistry::new();
        registry.insert("doc", json!({"x": 1}));
        let first = registry.resolve("doc").expect("doc");
        let second = registry.resolve("doc").expect("doc");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn load_registry_file_and_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let registry_path = tmp.path().join("registry.json");
        fs::write(&registry_path, r#"{"store": {"book": []}}"#).expect("write registry");
        let registry = FixtureRegistry::load_registry_file(&registry_path).expect("load file");
        assert!(registry.contains("store"));

        let dir = tmp.path().join("fixtures");
        fs::create_dir(&dir).expect("mkdir");
        fs::write(dir.join("alpha.json"), "[1, 2]").expect("write alpha");
        fs::write(dir.join("beta.json"), r#"{"b": true}"#).expect("write beta");
        fs::write(dir.join("notes.txt"), "ignored").expect("write notes");
        let from_dir = FixtureRegistry::load_dir(&dir).expect("load dir");
        let keys: Vec<_> = from_dir.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["alpha", "beta"]);
    }

    #[test]
    fn load_dir_reports_malformed_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("broken.json"), "{not json").expect("write");
        let err = FixtureRegistry::load_dir(tmp.path()).expect_err("malformed file");
        assert!(err.is_fatal());
        assert!(matches!(err, HarnessError::MalformedInput { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn load_dir_rejects_non_utf8_file_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt as _;

        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("good.json"), "{}").expect("write good");
        let name = OsStr::from_bytes(b"bad\xff.json");
        fs::write(tmp.path().join(name), "{}").expect("write bad");
        let err = FixtureRegistry::load_dir(tmp.path()).expect_err("non UTF-8 key");
        assert!(matches!(err, HarnessError::MalformedInput { .. }));
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn load_missing_file_is_input_not_found() {
        let err = FixtureRegistry::load_registry_file(Path::new("/nonexistent/registry.json"))
            .expect_err("missing file");
        assert!(matches!(err, HarnessError::InputNotFound { .. }));
    }

    #[test]
    fn merge_rejects_duplicates() {
        let mut left = FixtureRegistry::new();
        left.insert("a", json!(1));
        let mut right = FixtureRegistry::new();
        right.insert("a", json!(2));
        assert!(left.merge(right, "right").is_err());
    }
}
