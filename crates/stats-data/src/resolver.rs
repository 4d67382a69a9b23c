//! Server-side vs. deferred filter resolution.
//!
//! A [`FilterRequest`] is split once per request into the filters the source
//! can apply itself and the ones listed in the [`DeferredDimensionTable`] for
//! that dataset. Only the former ever reach the retrieval collaborator; the
//! latter are applied to the returned records by [`DeferredFilterResolver::apply`].

use std::collections::{BTreeMap, BTreeSet};

use stats_core::data_processors::{DimensionKey, FilterValueProcessor};
use stats_core::datasets::DeferredDimensionTable;
use stats_core::models::{FilterRequest, RawRecord, SourceQuery};
use stats_core::{Result, StatsError};
use tracing::{debug, warn};

// ── ResolvedFilters ───────────────────────────────────────────────────────────

/// Validated filters for one dataset, partitioned by where they are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFilters {
    pub dataset_id: String,
    /// Dimension → code pairs sent to the source.
    pub server: BTreeMap<String, String>,
    /// Dimension → code pairs applied after retrieval.
    pub deferred: BTreeMap<String, String>,
}

impl ResolvedFilters {
    /// The query handed to the retrieval collaborator. Deferred dimensions are
    /// not part of it.
    pub fn source_query(&self) -> SourceQuery {
        SourceQuery {
            dataset_id: self.dataset_id.clone(),
            params: self
                .server
                .iter()
                .map(|(dim, code)| (DimensionKey::query_param_name(dim), code.clone()))
                .collect(),
        }
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// `true` when every deferred pair matches `record` exactly. A record that
    /// lacks a deferred dimension does not match.
    pub fn matches(&self, record: &RawRecord) -> bool {
        self.deferred
            .iter()
            .all(|(dim, code)| record.dimension(dim) == Some(code.as_str()))
    }
}

// ── FilterOutcome ─────────────────────────────────────────────────────────────

/// Diagnostic payload of a deferred filter that removed every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredFilterMiss {
    /// The deferred pairs that were requested.
    pub expected: BTreeMap<String, String>,
    /// `"@dim=value"` for each distinct value seen per deferred dimension.
    pub observed: Vec<String>,
}

/// Records surviving deferred filtering, plus the miss diagnostic when none did.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub records: Vec<RawRecord>,
    pub miss: Option<DeferredFilterMiss>,
}

// ── DeferredFilterResolver ────────────────────────────────────────────────────

/// Splits filter requests and applies deferred filters after retrieval.
#[derive(Debug, Clone, Default)]
pub struct DeferredFilterResolver {
    table: DeferredDimensionTable,
    empty_as_fatal: bool,
}

impl DeferredFilterResolver {
    pub fn new(table: DeferredDimensionTable) -> Self {
        Self {
            table,
            empty_as_fatal: false,
        }
    }

    /// When set, a deferred filter that removes every record is returned as
    /// [`StatsError::DeferredFilterMiss`] instead of an empty outcome.
    pub fn with_empty_as_fatal(mut self, empty_as_fatal: bool) -> Self {
        self.empty_as_fatal = empty_as_fatal;
        self
    }

    pub fn table(&self) -> &DeferredDimensionTable {
        &self.table
    }

    /// Validate `request` and partition its filters.
    ///
    /// Fails with [`StatsError::InvalidFilter`] on the first malformed
    /// dimension or value.
    pub fn split(&self, request: &FilterRequest) -> Result<ResolvedFilters> {
        if request.dataset_id.trim().is_empty() {
            return Err(StatsError::invalid_filter(
                "statsDataId",
                "dataset id is empty",
            ));
        }

        let mut resolved = ResolvedFilters {
            dataset_id: request.dataset_id.clone(),
            ..ResolvedFilters::default()
        };

        for (dimension, value) in &request.filters {
            let code = FilterValueProcessor::to_code(dimension, value)?;
            if self.table.is_deferred(&request.dataset_id, dimension) {
                resolved.deferred.insert(dimension.clone(), code);
            } else {
                resolved.server.insert(dimension.clone(), code);
            }
        }

        if resolved.has_deferred() {
            debug!(
                dataset = %resolved.dataset_id,
                deferred = ?resolved.deferred,
                "filters deferred until after retrieval"
            );
        }

        Ok(resolved)
    }

    /// Keep only the records matching every deferred pair of `resolved`.
    pub fn apply(
        &self,
        resolved: &ResolvedFilters,
        series_name: &str,
        records: Vec<RawRecord>,
    ) -> Result<FilterOutcome> {
        if !resolved.has_deferred() || records.is_empty() {
            return Ok(FilterOutcome {
                records,
                miss: None,
            });
        }

        let before = records.len();
        let (kept, dropped): (Vec<RawRecord>, Vec<RawRecord>) =
            records.into_iter().partition(|r| resolved.matches(r));
        debug!(
            series = series_name,
            before,
            after = kept.len(),
            "applied deferred filters"
        );

        if !kept.is_empty() {
            return Ok(FilterOutcome {
                records: kept,
                miss: None,
            });
        }

        let observed = observed_values(&dropped, resolved.deferred.keys());
        warn!(
            series = series_name,
            expected = ?resolved.deferred,
            observed = ?observed,
            "deferred filter matched no records; expected code not found"
        );

        if self.empty_as_fatal {
            return Err(StatsError::DeferredFilterMiss {
                series: series_name.to_string(),
                observed,
            });
        }

        Ok(FilterOutcome {
            records: Vec::new(),
            miss: Some(DeferredFilterMiss {
                expected: resolved.deferred.clone(),
                observed,
            }),
        })
    }
}

/// Distinct `"@dim=value"` strings per dimension, dimensions in key order and
/// values sorted within each dimension.
fn observed_values<'a>(
    records: &[RawRecord],
    dimensions: impl Iterator<Item = &'a String>,
) -> Vec<String> {
    dimensions
        .flat_map(|dim| {
            let values: BTreeSet<&str> = records.iter().filter_map(|r| r.dimension(dim)).collect();
            values
                .into_iter()
                .map(move |value| format!("{dim}={value}"))
                .collect::<Vec<_>>()
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
