//! Async chart orchestrator.
//!
//! Validates every series request up front, fetches all series concurrently as
//! spawned tokio tasks, collects them in request order and hands the results
//! to the synchronous analysis pipeline in `stats-data`.

use std::sync::Arc;

use stats_core::datasets::DeferredDimensionTable;
use stats_core::models::RetrievalResult;
use stats_core::settings::PipelineOptions;
use stats_core::{Result, StatsError};
use stats_data::analysis::{
    analyze_series, plan_requests, AnalysisRequest, ChartAnalysis, RetrievedSeries,
};
use stats_data::resolver::{DeferredFilterResolver, ResolvedFilters};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fetcher::StatsFetcher;

// ── ChartOrchestrator ─────────────────────────────────────────────────────────

/// Runs one [`AnalysisRequest`] end to end against a [`StatsFetcher`].
pub struct ChartOrchestrator<F> {
    fetcher: Arc<F>,
    resolver: DeferredFilterResolver,
    options: PipelineOptions,
}

impl<F: StatsFetcher> ChartOrchestrator<F> {
    pub fn new(fetcher: F, table: DeferredDimensionTable, options: PipelineOptions) -> Self {
        let resolver =
            DeferredFilterResolver::new(table).with_empty_as_fatal(options.empty_as_fatal);
        Self {
            fetcher: Arc::new(fetcher),
            resolver,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn resolver(&self) -> &DeferredFilterResolver {
        &self.resolver
    }

    /// Resolve, fetch, aggregate and align every category of `request`.
    ///
    /// A malformed filter fails the request before anything is fetched.
    pub async fn run(&self, request: AnalysisRequest) -> Result<ChartAnalysis> {
        request.validate()?;
        let plans = plan_requests(&self.resolver, &request.categories)?;

        info!(
            series = plans.len(),
            policy = ?self.options.failure_policy,
            "fetching series"
        );
        let retrievals = self.fetch_all(&plans).await;

        let retrieved = request
            .categories
            .into_iter()
            .zip(plans)
            .zip(retrievals)
            .map(|((descriptor, filters), retrieval)| RetrievedSeries {
                descriptor,
                filters,
                retrieval,
            })
            .collect();

        let mut analysis = analyze_series(&self.resolver, retrieved, &self.options)?;
        analysis.question = request.question;

        info!(
            requested = analysis.metadata.series_requested,
            matched = analysis.metadata.series_matched,
            labels = analysis.metadata.label_count,
            "chart ready"
        );
        Ok(analysis)
    }

    // ── Private implementation ────────────────────────────────────────────

    /// Fetch every plan concurrently. The returned vector is in plan order.
    ///
    /// A fetch task that panics is reported as a retrieval failure for its
    /// own series, so the failure policy still applies to it.
    async fn fetch_all(&self, plans: &[ResolvedFilters]) -> Vec<Result<RetrievalResult>> {
        let handles: Vec<JoinHandle<Result<RetrievalResult>>> = plans
            .iter()
            .map(|plan| {
                let fetcher = Arc::clone(&self.fetcher);
                let query = plan.source_query();
                tokio::spawn(async move { fetcher.fetch(query).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (index, (plan, handle)) in plans.iter().zip(handles).enumerate() {
            let result = handle.await.unwrap_or_else(|e| {
                warn!(index, dataset = %plan.dataset_id, error = %e, "fetch task failed");
                Err(StatsError::Retrieval {
                    dataset: plan.dataset_id.clone(),
                    reason: format!("fetch task failed: {e}"),
                })
            });
            debug!(
                index,
                dataset = %plan.dataset_id,
                ok = result.is_ok(),
                records = result.as_ref().map(RetrievalResult::len).unwrap_or(0),
                "fetch finished"
            );
            results.push(result);
        }
        results
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
