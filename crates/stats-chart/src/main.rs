mod bootstrap;

use anyhow::Result;
use stats_core::settings::Settings;
use stats_runtime::orchestrator::ChartOrchestrator;
use stats_runtime::replay::ReplayFetcher;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("stats-chart v{} starting", env!("CARGO_PKG_VERSION"));

    let request = bootstrap::load_request(&settings.request)?;
    let table = bootstrap::load_dataset_table(settings.dataset_table.as_deref())?;
    let options = settings.pipeline_options();

    let fetcher = ReplayFetcher::open(&settings.responses);
    if fetcher.is_empty() {
        tracing::warn!(
            "No recorded responses found under {}",
            settings.responses.display()
        );
    }
    tracing::info!(
        "Request: {} series, responses: {} datasets, policy: {:?}",
        request.categories.len(),
        fetcher.len(),
        options.failure_policy
    );

    let orchestrator = ChartOrchestrator::new(fetcher, table, options);
    let analysis = orchestrator.run(request).await?;

    for diagnostic in analysis.unresolved() {
        tracing::warn!(
            series = %diagnostic.series_name,
            outcome = ?diagnostic.outcome,
            observed = ?diagnostic.distinct_deferred_dimension_values_observed,
            "series left off the chart"
        );
    }

    println!("{}", bootstrap::render_output(&analysis, settings.compact)?);

    Ok(())
}
