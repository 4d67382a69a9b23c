//! Reprojection of several yearly series onto one shared label axis.

use std::collections::BTreeSet;

use stats_core::models::{AlignedChart, AlignedSeries, Series};
use tracing::debug;

use crate::axis::assign_axes;

/// Output of [`MultiSeriesAligner::align`].
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub chart: AlignedChart,
    /// Names of the input series that had no points and were left out.
    pub empty_series: Vec<String>,
}

/// Stateless helper that aligns series on the union of their years.
pub struct MultiSeriesAligner;

impl MultiSeriesAligner {
    /// Align `series` (in input order) onto their combined years.
    ///
    /// Empty series are excluded from the chart and reported by name. Every
    /// value array has one entry per label, `None` where the series has no
    /// observation for that year.
    pub fn align(series: &[Series]) -> Alignment {
        let (valid, empty): (Vec<&Series>, Vec<&Series>) =
            series.iter().partition(|s| !s.is_empty());

        let labels = Self::labels(&valid);
        let units: Vec<&str> = valid.iter().map(|s| s.unit()).collect();
        let axes = assign_axes(&units);

        let datasets = valid
            .iter()
            .zip(axes)
            .map(|(s, axis)| AlignedSeries {
                label: s.descriptor.label(),
                unit: s.unit().to_string(),
                data: labels.iter().map(|year| s.value_for(year)).collect(),
                axis,
            })
            .collect();

        let empty_series: Vec<String> = empty.iter().map(|s| s.name().to_string()).collect();
        debug!(
            labels = labels.len(),
            series = valid.len(),
            empty = empty_series.len(),
            "aligned series"
        );

        Alignment {
            chart: AlignedChart { labels, datasets },
            empty_series,
        }
    }

    /// Ascending, de-duplicated union of the years of `series`.
    pub fn labels(series: &[&Series]) -> Vec<String> {
        series
            .iter()
            .flat_map(|s| s.points().iter().map(|p| p.year.clone()))
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
