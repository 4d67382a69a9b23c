//! Per-dataset table of dimensions the source cannot filter server-side.
//!
//! Some statistics tables ignore (or reject) certain `cd*` query parameters.
//! For those, the dimension is fetched unfiltered and narrowed down locally
//! after retrieval. The table is plain data: adding a dataset means adding an
//! entry here or in an override file, never a new branch in the resolver.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_processors::DimensionKey;
use crate::error::{Result, StatsError};

/// Population census table whose age-group dimension must be filtered locally.
pub const CENSUS_POPULATION_DATASET: &str = "0000010101";

/// Built-in deferred dimensions, keyed by dataset id.
const BUILTIN_DEFERRED: &[(&str, &[&str])] = &[(CENSUS_POPULATION_DATASET, &["@cat01"])];

// ── DeferredDimensionTable ────────────────────────────────────────────────────

/// Dataset id → dimension codes that must be deferred.
///
/// Serialised as a plain JSON object, e.g. `{"0000010101": ["@cat01"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeferredDimensionTable {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl Default for DeferredDimensionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DeferredDimensionTable {
    /// A table with no deferred dimensions at all.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The table of known source quirks.
    pub fn builtin() -> Self {
        let entries = BUILTIN_DEFERRED
            .iter()
            .map(|(dataset, dims)| {
                (
                    dataset.to_string(),
                    dims.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect();
        Self { entries }
    }

    /// Parse an override table from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(text)?;
        table.validate()?;
        Ok(table)
    }

    /// Load an override table from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| StatsError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_json_str(&text)?;
        debug!(
            path = %path.display(),
            datasets = table.len(),
            "loaded deferred-dimension table"
        );
        Ok(table)
    }

    /// Register `dimensions` as deferred for `dataset_id`, adding to any
    /// dimensions already listed.
    pub fn insert<I, S>(&mut self, dataset_id: impl Into<String>, dimensions: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dimensions: Vec<String> = dimensions.into_iter().map(Into::into).collect();
        if let Some(bad) = dimensions.iter().find(|d| !DimensionKey::is_valid(d)) {
            return Err(StatsError::Config(format!(
                "deferred dimension {bad:?} does not follow the @name convention"
            )));
        }
        self.entries
            .entry(dataset_id.into())
            .or_default()
            .extend(dimensions);
        Ok(())
    }

    /// Fold `other` into this table. Dimension sets are unioned per dataset.
    pub fn merge(&mut self, other: Self) {
        for (dataset, dims) in other.entries {
            self.entries.entry(dataset).or_default().extend(dims);
        }
    }

    /// Deferred dimensions for `dataset_id`, if any are registered.
    pub fn deferred_for(&self, dataset_id: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(dataset_id).filter(|dims| !dims.is_empty())
    }

    /// `true` when `dimension` must be filtered locally for `dataset_id`.
    pub fn is_deferred(&self, dataset_id: &str, dimension: &str) -> bool {
        self.deferred_for(dataset_id)
            .is_some_and(|dims| dims.contains(dimension))
    }

    /// Number of datasets with an entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<()> {
        for (dataset, dims) in &self.entries {
            if dataset.trim().is_empty() {
                return Err(StatsError::Config(
                    "deferred-dimension table has an empty dataset id".to_string(),
                ));
            }
            if let Some(bad) = dims.iter().find(|d| !DimensionKey::is_valid(d)) {
                return Err(StatsError::Config(format!(
                    "dataset {dataset}: deferred dimension {bad:?} does not follow the @name convention"
                )));
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_defers_census_age_groups() {
        let table = DeferredDimensionTable::builtin();
        assert!(table.is_deferred(CENSUS_POPULATION_DATASET, "@cat01"));
        assert!(!table.is_deferred(CENSUS_POPULATION_DATASET, "@area"));
        assert!(table.deferred_for("0003411607").is_none());
    }

    #[test]
    fn test_default_is_builtin() {
        assert_eq!(
            DeferredDimensionTable::default(),
            DeferredDimensionTable::builtin()
        );
    }

    #[test]
    fn test_insert_extends_existing_entry() {
        let mut table = DeferredDimensionTable::builtin();
        table
            .insert(CENSUS_POPULATION_DATASET, ["@cat02"])
            .unwrap();
        let dims = table.deferred_for(CENSUS_POPULATION_DATASET).unwrap();
        assert_eq!(dims.len(), 2);
    }

    #[test]
    fn test_insert_rejects_bad_dimension() {
        let mut table = DeferredDimensionTable::empty();
        let err = table.insert("0003411607", ["cat01"]).unwrap_err();
        assert!(matches!(err, StatsError::Config(_)));
    }

    #[test]
    fn test_from_json_and_merge() {
        let overrides =
            DeferredDimensionTable::from_json_str(r#"{"0003423970": ["@cat02"]}"#).unwrap();
        let mut table = DeferredDimensionTable::builtin();
        table.merge(overrides);

        assert_eq!(table.len(), 2);
        assert!(table.is_deferred("0003423970", "@cat02"));
        assert!(table.is_deferred(CENSUS_POPULATION_DATASET, "@cat01"));
    }

    #[test]
    fn test_from_json_rejects_bad_entries() {
        assert!(DeferredDimensionTable::from_json_str(r#"{"": ["@cat01"]}"#).is_err());
        assert!(DeferredDimensionTable::from_json_str(r#"{"x": ["cat01"]}"#).is_err());
        assert!(DeferredDimensionTable::from_json_str(r#"{"x": "@cat01"}"#).is_err());
    }

    #[test]
    fn test_empty_dimension_set_is_not_deferred() {
        let table = DeferredDimensionTable::from_json_str(r#"{"0003411607": []}"#).unwrap();
        assert!(table.deferred_for("0003411607").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("datasets.json");
        std::fs::write(&path, r#"{"0000020301": ["@cat01", "@area"]}"#).unwrap();

        let table = DeferredDimensionTable::load_from(&path).unwrap();
        assert!(table.is_deferred("0000020301", "@area"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = TempDir::new().expect("tempdir");
        let err = DeferredDimensionTable::load_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, StatsError::FileRead { .. }));
    }
}
