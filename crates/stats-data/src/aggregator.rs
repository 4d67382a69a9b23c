//! Per-year aggregation of filtered source records.
//!
//! Records are grouped on the leading four digits of their time code and the
//! numeric values inside each year are summed, so monthly or quarterly cells
//! collapse into annual totals the same way annual cells do.

use std::collections::BTreeMap;

use stats_core::models::{RawRecord, Series, SeriesDescriptor, YearlyPoint};
use stats_core::{Result, StatsError};
use tracing::debug;

// ── YearTotal ─────────────────────────────────────────────────────────────────

/// Running sum for one year.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearTotal {
    pub value: f64,
    /// Number of numeric records folded into `value`.
    pub count: u32,
}

impl YearTotal {
    fn add(&mut self, value: f64) {
        self.value += value;
        self.count += 1;
    }
}

// ── AggregationSummary ────────────────────────────────────────────────────────

/// Counts describing one aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationSummary {
    pub records_seen: usize,
    /// Records whose value cell was a placeholder.
    pub records_skipped: usize,
    pub years: usize,
}

// ── YearlyAggregator ──────────────────────────────────────────────────────────

/// Stateless helper that folds records into ascending yearly points.
pub struct YearlyAggregator;

impl YearlyAggregator {
    /// Sum numeric values per year. Output is ascending with one point per
    /// year; years with no numeric value produce no point.
    ///
    /// A yearly sum that overflows to infinity is a contract violation: it
    /// would otherwise serialise as `null` and read as a missing year.
    pub fn aggregate(records: &[RawRecord]) -> Result<Vec<YearlyPoint>> {
        Ok(Self::aggregate_with_summary(records)?.0)
    }

    /// Same as [`aggregate`](Self::aggregate), also returning counts.
    pub fn aggregate_with_summary(
        records: &[RawRecord],
    ) -> Result<(Vec<YearlyPoint>, AggregationSummary)> {
        // BTreeMap keeps years sorted; four-digit strings sort numerically.
        let mut totals: BTreeMap<&str, YearTotal> = BTreeMap::new();
        let mut skipped = 0usize;

        for record in records {
            match record.numeric_value() {
                Some(value) => totals.entry(record.year()).or_default().add(value),
                None => skipped += 1,
            }
        }

        if let Some((year, total)) = totals.iter().find(|(_, t)| !t.value.is_finite()) {
            return Err(StatsError::ContractViolation(format!(
                "sum of {} values for year {year} is not finite",
                total.count
            )));
        }

        let summary = AggregationSummary {
            records_seen: records.len(),
            records_skipped: skipped,
            years: totals.len(),
        };

        let points = totals
            .into_iter()
            .map(|(year, total)| YearlyPoint::new(year, total.value))
            .collect();

        Ok((points, summary))
    }

    /// Aggregate `records` into a [`Series`] labelled by `descriptor`.
    pub fn aggregate_series(descriptor: SeriesDescriptor, records: &[RawRecord]) -> Result<Series> {
        let (points, summary) = Self::aggregate_with_summary(records)?;
        debug!(
            series = descriptor.name(),
            records = summary.records_seen,
            skipped = summary.records_skipped,
            years = summary.years,
            "aggregated yearly series"
        );
        Series::new(descriptor, points)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
