//! Chart analysis pipeline.
//!
//! Takes the per-series retrieval results, applies deferred filters,
//! aggregates each series by year and aligns them into one chart, returning a
//! [`ChartAnalysis`] ready for the charting surface and the summariser.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use stats_core::models::{
    AlignedChart, RetrievalResult, Series, SeriesDescriptor, SeriesDiagnostic, SeriesOutcome,
    YearlyPoint,
};
use stats_core::settings::{FailurePolicy, PipelineOptions};
use stats_core::{Result, StatsError};
use tracing::{debug, warn};

use crate::aggregator::YearlyAggregator;
use crate::aligner::MultiSeriesAligner;
use crate::resolver::{DeferredFilterResolver, ResolvedFilters};

// ── Public types ──────────────────────────────────────────────────────────────

/// A chart request as received from the request handler:
/// `{"question": "...", "categories": [{statsDataId, filters, categoryInfo}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Free-text question passed through to the summariser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub categories: Vec<SeriesDescriptor>,
}

impl AnalysisRequest {
    /// Reject requests that name no series at all.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(StatsError::Config(
                "request must name at least one category".to_string(),
            ));
        }
        Ok(())
    }
}

/// One requested series together with whatever its retrieval produced.
#[derive(Debug)]
pub struct RetrievedSeries {
    pub descriptor: SeriesDescriptor,
    pub filters: ResolvedFilters,
    pub retrieval: Result<RetrievalResult>,
}

/// A series after filtering and aggregation, with its diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSeries {
    pub series: Series,
    pub diagnostic: SeriesDiagnostic,
}

/// Recent points of one series as handed to the narrative summariser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub name: String,
    pub unit: String,
    /// `None` when the series could not be retrieved or matched nothing.
    pub points: Option<Vec<YearlyPoint>>,
}

/// Metadata produced alongside the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    /// RFC 3339 timestamp when this result was generated.
    pub generated_at: String,
    pub series_requested: usize,
    /// Series that produced at least one yearly point.
    pub series_matched: usize,
    pub label_count: usize,
}

/// The complete output of [`analyze_series`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub chart_data: AlignedChart,
    /// Every requested series in request order, empty ones included.
    #[serde(skip)]
    pub series: Vec<Series>,
    pub diagnostics: Vec<SeriesDiagnostic>,
    pub summaries: Vec<SeriesSummary>,
    pub metadata: AnalysisMetadata,
}

impl ChartAnalysis {
    /// Diagnostics of the series that did not make it onto the chart.
    pub fn unresolved(&self) -> impl Iterator<Item = &SeriesDiagnostic> {
        self.series
            .iter()
            .zip(&self.diagnostics)
            .filter(|(series, _)| series.is_empty())
            .map(|(_, diagnostic)| diagnostic)
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Validate and split every request up front so that a malformed filter
/// fails the whole request before anything is fetched.
pub fn plan_requests(
    resolver: &DeferredFilterResolver,
    descriptors: &[SeriesDescriptor],
) -> Result<Vec<ResolvedFilters>> {
    descriptors
        .iter()
        .map(|descriptor| resolver.split(&descriptor.request))
        .collect()
}

/// Filter and aggregate one successfully retrieved series.
pub fn resolve_series(
    resolver: &DeferredFilterResolver,
    descriptor: SeriesDescriptor,
    filters: &ResolvedFilters,
    retrieval: RetrievalResult,
) -> Result<ResolvedSeries> {
    let records = match retrieval {
        RetrievalResult::NoMatchingData => {
            warn!(series = descriptor.name(), "no matching data for series");
            let diagnostic =
                SeriesDiagnostic::with_outcome(descriptor.name(), SeriesOutcome::NoMatchingData);
            return Ok(ResolvedSeries {
                series: Series::empty(descriptor),
                diagnostic,
            });
        }
        RetrievalResult::Records(records) => records,
    };

    let outcome = resolver.apply(filters, descriptor.name(), records)?;
    if let Some(miss) = outcome.miss {
        let mut diagnostic =
            SeriesDiagnostic::with_outcome(descriptor.name(), SeriesOutcome::DeferredFilterMiss);
        diagnostic.distinct_deferred_dimension_values_observed = miss.observed;
        return Ok(ResolvedSeries {
            series: Series::empty(descriptor),
            diagnostic,
        });
    }

    let name = descriptor.name().to_string();
    let series = YearlyAggregator::aggregate_series(descriptor, &outcome.records)?;
    let diagnostic = if series.is_empty() {
        // Records matched, but every value cell was a placeholder.
        SeriesDiagnostic {
            matched: true,
            ..SeriesDiagnostic::with_outcome(name, SeriesOutcome::NoNumericValues)
        }
    } else {
        SeriesDiagnostic::matched(name)
    };

    Ok(ResolvedSeries { series, diagnostic })
}

/// An empty series standing in for one whose retrieval failed.
pub fn failed_series(descriptor: SeriesDescriptor, error: &StatsError) -> ResolvedSeries {
    warn!(series = descriptor.name(), error = %error, "series retrieval failed; continuing without it");
    let diagnostic = SeriesDiagnostic::retrieval_failed(descriptor.name(), error.to_string());
    ResolvedSeries {
        series: Series::empty(descriptor),
        diagnostic,
    }
}

/// Run the full pipeline over already-retrieved series.
///
/// 1. Apply deferred filters and aggregate each retrieved series.
/// 2. Turn retrieval failures into empty series, or return the first one
///    unchanged under [`FailurePolicy::Abort`]. Contract violations are
///    returned under either policy.
/// 3. Align the non-empty series and assemble summaries and metadata.
pub fn analyze_series(
    resolver: &DeferredFilterResolver,
    retrieved: Vec<RetrievedSeries>,
    options: &PipelineOptions,
) -> Result<ChartAnalysis> {
    let mut resolved = Vec::with_capacity(retrieved.len());

    for item in retrieved {
        let entry = match item.retrieval {
            Ok(retrieval) => resolve_series(resolver, item.descriptor, &item.filters, retrieval)?,
            // A broken collaborator contract is never degraded.
            Err(error) if error.is_contract_violation() => return Err(error),
            Err(error) => match options.failure_policy {
                FailurePolicy::Abort => return Err(error),
                FailurePolicy::Degrade => failed_series(item.descriptor, &error),
            },
        };
        resolved.push(entry);
    }

    Ok(build_chart_analysis(resolved, options.summary_window))
}

/// Align resolved series and assemble the final [`ChartAnalysis`].
pub fn build_chart_analysis(resolved: Vec<ResolvedSeries>, summary_window: usize) -> ChartAnalysis {
    let (series, diagnostics): (Vec<Series>, Vec<SeriesDiagnostic>) = resolved
        .into_iter()
        .map(|r| (r.series, r.diagnostic))
        .unzip();

    for s in &series {
        debug!(
            series = s.name(),
            years = s.points().len(),
            first = s.points().first().map(|p| p.year.as_str()),
            last = s.points().last().map(|p| p.year.as_str()),
            "series ready for alignment"
        );
    }

    let alignment = MultiSeriesAligner::align(&series);

    let summaries = series
        .iter()
        .map(|s| SeriesSummary {
            name: s.name().to_string(),
            unit: s.unit().to_string(),
            points: (!s.is_empty()).then(|| s.recent(summary_window).to_vec()),
        })
        .collect();

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        series_requested: series.len(),
        series_matched: alignment.chart.datasets.len(),
        label_count: alignment.chart.labels.len(),
    };

    ChartAnalysis {
        question: None,
        chart_data: alignment.chart,
        series,
        diagnostics,
        summaries,
        metadata,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use stats_core::datasets::CENSUS_POPULATION_DATASET;
    use stats_core::models::{AxisId, FilterRequest, RawRecord};
    use std::collections::BTreeMap;

    fn record(time: &str, value: &str, dims: &[(&str, &str)]) -> RawRecord {
        let dims: BTreeMap<String, String> = dims
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawRecord::new(time, value, dims).unwrap()
    }

    fn young_population() -> SeriesDescriptor {
        SeriesDescriptor::new(
            "Young population",
            "people",
            FilterRequest::new(CENSUS_POPULATION_DATASET)
                .with_filter("@cat01", "A1102")
                .with_filter("@area", "40000"),
        )
    }

    fn shipments() -> SeriesDescriptor {
        SeriesDescriptor::new(
            "Shipments",
            "million yen",
            FilterRequest::new("0003411607").with_filter("@area", "40000"),
        )
    }

    fn retrieved(
        resolver: &DeferredFilterResolver,
        descriptor: SeriesDescriptor,
        retrieval: Result<RetrievalResult>,
    ) -> RetrievedSeries {
        let filters = resolver.split(&descriptor.request).unwrap();
        RetrievedSeries {
            descriptor,
            filters,
            retrieval,
        }
    }

    fn census_records() -> RetrievalResult {
        RetrievalResult::Records(vec![
            record("2015000000", "700", &[("@cat01", "A1102")]),
            record("2015000000", "3000", &[("@cat01", "A1103")]),
            record("2020000000", "680", &[("@cat01", "A1102")]),
            record("2020000000", "2900", &[("@cat01", "A1103")]),
        ])
    }

    // ── resolve_series ────────────────────────────────────────────────────────

    #[test]
    fn test_resolve_series_filters_then_aggregates() {
        let resolver = DeferredFilterResolver::default();
        let descriptor = young_population();
        let filters = resolver.split(&descriptor.request).unwrap();

        let resolved = resolve_series(&resolver, descriptor, &filters, census_records()).unwrap();
        assert_eq!(
            resolved.series.points(),
            &[YearlyPoint::new("2015", 700.0), YearlyPoint::new("2020", 680.0)]
        );
        assert!(resolved.diagnostic.matched);
        assert_eq!(resolved.diagnostic.outcome, SeriesOutcome::Matched);
    }

    #[test]
    fn test_resolve_series_no_matching_data() {
        let resolver = DeferredFilterResolver::default();
        let descriptor = shipments();
        let filters = resolver.split(&descriptor.request).unwrap();

        let resolved = resolve_series(
            &resolver,
            descriptor,
            &filters,
            RetrievalResult::NoMatchingData,
        )
        .unwrap();
        assert!(resolved.series.is_empty());
        assert!(!resolved.diagnostic.matched);
        assert_eq!(resolved.diagnostic.outcome, SeriesOutcome::NoMatchingData);
    }

    #[test]
    fn test_resolve_series_deferred_miss_carries_observed_codes() {
        let resolver = DeferredFilterResolver::default();
        let descriptor = SeriesDescriptor::new(
            "Elderly population",
            "people",
            FilterRequest::new(CENSUS_POPULATION_DATASET).with_filter("@cat01", "A1104"),
        );
        let filters = resolver.split(&descriptor.request).unwrap();

        let resolved = resolve_series(&resolver, descriptor, &filters, census_records()).unwrap();
        assert!(resolved.series.is_empty());
        assert!(!resolved.diagnostic.matched);
        assert_eq!(resolved.diagnostic.outcome, SeriesOutcome::DeferredFilterMiss);
        assert_eq!(
            resolved.diagnostic.distinct_deferred_dimension_values_observed,
            vec!["@cat01=A1102", "@cat01=A1103"]
        );
    }

    #[test]
    fn test_resolve_series_placeholders_only() {
        let resolver = DeferredFilterResolver::default();
        let descriptor = shipments();
        let filters = resolver.split(&descriptor.request).unwrap();
        let retrieval = RetrievalResult::Records(vec![record("2019", "-", &[])]);

        let resolved = resolve_series(&resolver, descriptor, &filters, retrieval).unwrap();
        assert!(resolved.series.is_empty());
        assert!(resolved.diagnostic.matched);
        assert_eq!(resolved.diagnostic.outcome, SeriesOutcome::NoNumericValues);
    }

    // ── analyze_series ────────────────────────────────────────────────────────

    #[test]
    fn test_analyze_two_series_different_units() {
        let resolver = DeferredFilterResolver::default();
        let inputs = vec![
            retrieved(&resolver, young_population(), Ok(census_records())),
            retrieved(
                &resolver,
                shipments(),
                Ok(RetrievalResult::Records(vec![
                    record("2019", "100", &[("@area", "40000")]),
                    record("2020", "110", &[("@area", "40000")]),
                ])),
            ),
        ];

        let analysis = analyze_series(&resolver, inputs, &PipelineOptions::default()).unwrap();
        let chart = &analysis.chart_data;

        assert_eq!(chart.labels, vec!["2015", "2019", "2020"]);
        assert_eq!(chart.datasets[0].data, vec![Some(700.0), None, Some(680.0)]);
        assert_eq!(chart.datasets[1].data, vec![None, Some(100.0), Some(110.0)]);
        assert_eq!(chart.datasets[1].axis, AxisId::Secondary);
        assert_eq!(analysis.metadata.series_requested, 2);
        assert_eq!(analysis.metadata.series_matched, 2);
        assert_eq!(analysis.metadata.label_count, 3);
        assert_eq!(analysis.unresolved().count(), 0);
    }

    #[test]
    fn test_analyze_degrades_on_retrieval_failure() {
        let resolver = DeferredFilterResolver::default();
        let inputs = vec![
            retrieved(&resolver, young_population(), Ok(census_records())),
            retrieved(
                &resolver,
                shipments(),
                Err(StatsError::Retrieval {
                    dataset: "0003411607".to_string(),
                    reason: "connection reset".to_string(),
                }),
            ),
        ];

        let analysis = analyze_series(&resolver, inputs, &PipelineOptions::default()).unwrap();
        assert_eq!(analysis.chart_data.datasets.len(), 1);
        assert_eq!(analysis.chart_data.datasets[0].axis, AxisId::Primary);

        let unresolved: Vec<_> = analysis.unresolved().collect();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].series_name, "Shipments");
        assert_eq!(unresolved[0].outcome, SeriesOutcome::RetrievalFailed);
        assert!(unresolved[0].error.as_deref().unwrap().contains("connection reset"));
        assert!(analysis.summaries[1].points.is_none());
    }

    #[test]
    fn test_analyze_abort_policy_returns_failure_unchanged() {
        let resolver = DeferredFilterResolver::default();
        let inputs = vec![
            retrieved(&resolver, young_population(), Ok(census_records())),
            retrieved(
                &resolver,
                shipments(),
                Err(StatsError::SourceStatus {
                    status: 100,
                    message: "bad appId".to_string(),
                }),
            ),
        ];
        let options = PipelineOptions {
            failure_policy: FailurePolicy::Abort,
            ..PipelineOptions::default()
        };

        let err = analyze_series(&resolver, inputs, &options).unwrap_err();
        assert!(matches!(err, StatsError::SourceStatus { status: 100, .. }));
    }

    #[test]
    fn test_analyze_contract_violation_not_degraded() {
        let resolver = DeferredFilterResolver::default();
        let wire = serde_json::json!({"@time": "H27", "$": "1"});
        let bad_record = RawRecord::try_from(wire.as_object().cloned().unwrap());
        let inputs = vec![
            retrieved(&resolver, young_population(), Ok(census_records())),
            retrieved(
                &resolver,
                shipments(),
                bad_record.map(|r| RetrievalResult::Records(vec![r])),
            ),
        ];

        let err = analyze_series(&resolver, inputs, &PipelineOptions::default()).unwrap_err();
        assert!(err.is_contract_violation());
        assert!(err.to_string().contains("H27"));
    }

    #[test]
    fn test_analyze_empty_as_fatal_propagates_miss() {
        let resolver = DeferredFilterResolver::default().with_empty_as_fatal(true);
        let descriptor = SeriesDescriptor::new(
            "Elderly population",
            "people",
            FilterRequest::new(CENSUS_POPULATION_DATASET).with_filter("@cat01", "A1104"),
        );
        let inputs = vec![retrieved(&resolver, descriptor, Ok(census_records()))];

        let err = analyze_series(&resolver, inputs, &PipelineOptions::default()).unwrap_err();
        assert!(matches!(err, StatsError::DeferredFilterMiss { .. }));
    }

    #[test]
    fn test_summaries_keep_most_recent_window() {
        let resolver = DeferredFilterResolver::default();
        let records = (1990..2020)
            .map(|y| record(&format!("{y}000000"), "1", &[("@area", "40000")]))
            .collect();
        let inputs = vec![retrieved(
            &resolver,
            shipments(),
            Ok(RetrievalResult::Records(records)),
        )];

        let analysis = analyze_series(&resolver, inputs, &PipelineOptions::default()).unwrap();
        let points = analysis.summaries[0].points.as_ref().unwrap();
        assert_eq!(points.len(), 15);
        assert_eq!(points[0].year, "2005");
        assert_eq!(points[14].year, "2019");
    }

    #[test]
    fn test_analysis_serializes_chart_and_diagnostics() {
        let resolver = DeferredFilterResolver::default();
        let inputs = vec![retrieved(
            &resolver,
            shipments(),
            Ok(RetrievalResult::NoMatchingData),
        )];
        let analysis = analyze_series(&resolver, inputs, &PipelineOptions::default()).unwrap();
        let value = serde_json::to_value(&analysis).unwrap();

        assert!(value["chartData"]["labels"].as_array().unwrap().is_empty());
        assert_eq!(value["diagnostics"][0]["outcome"], "noMatchingData");
        assert!(value["summaries"][0]["points"].is_null());
        assert!(value.get("series").is_none());
        assert_eq!(value["metadata"]["seriesRequested"], 1);
    }

    // ── AnalysisRequest ───────────────────────────────────────────────────────

    #[test]
    fn test_request_wire_shape() {
        let request: AnalysisRequest = serde_json::from_value(serde_json::json!({
            "question": "How did the young population change?",
            "categories": [{
                "statsDataId": "0000010101",
                "filters": {"@cat01": "A1102"},
                "categoryInfo": {"name": "Young population", "unit": "people"}
            }]
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.categories[0].name(), "Young population");
    }

    #[test]
    fn test_request_without_categories_is_rejected() {
        let request: AnalysisRequest =
            serde_json::from_value(serde_json::json!({"categories": []})).unwrap();
        assert!(request.question.is_none());
        assert!(matches!(request.validate().unwrap_err(), StatsError::Config(_)));
    }

    // ── plan_requests ─────────────────────────────────────────────────────────

    #[test]
    fn test_plan_requests_fails_fast_on_invalid_filter() {
        let resolver = DeferredFilterResolver::default();
        let mut bad = shipments();
        bad.request
            .filters
            .insert("@cat01".to_string(), serde_json::json!({"code": "x"}));

        let err = plan_requests(&resolver, &[young_population(), bad]).unwrap_err();
        assert!(matches!(err, StatsError::InvalidFilter { .. }));
    }

    #[test]
    fn test_plan_requests_preserves_order() {
        let resolver = DeferredFilterResolver::default();
        let plans = plan_requests(&resolver, &[shipments(), young_population()]).unwrap();
        assert_eq!(plans[0].dataset_id, "0003411607");
        assert_eq!(plans[1].dataset_id, CENSUS_POPULATION_DATASET);
        assert!(plans[1].has_deferred());
    }
}
