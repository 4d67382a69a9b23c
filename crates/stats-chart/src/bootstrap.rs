use std::path::{Path, PathBuf};

use anyhow::Context;
use stats_core::datasets::DeferredDimensionTable;
use stats_data::analysis::{AnalysisRequest, ChartAnalysis};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Initialise the global `tracing` subscriber on stderr.
///
/// `log_level` is one of `DEBUG`, `INFO`, `WARNING` or `ERROR`. Stdout is left
/// for the JSON result.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level_directive(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

/// Map a CLI log level to a tracing filter directive.
fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        other => other.to_lowercase(),
    }
}

// ── Dataset table ──────────────────────────────────────────────────────────────

/// Locate a user deferred-dimension table.
///
/// Checks the following paths in order and returns the first that exists:
/// 1. `~/.stats-chart/datasets.json`
/// 2. `~/.config/stats-chart/datasets.json`
pub fn discover_dataset_table() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    let candidates = [
        home.join(".stats-chart").join("datasets.json"),
        home.join(".config").join("stats-chart").join("datasets.json"),
    ];
    candidates.into_iter().find(|p| p.is_file())
}

/// Built-in table, with `explicit` (or a discovered file) merged over it.
pub fn load_dataset_table(explicit: Option<&Path>) -> anyhow::Result<DeferredDimensionTable> {
    let mut table = DeferredDimensionTable::builtin();

    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_dataset_table(),
    };

    if let Some(path) = path {
        let overrides = DeferredDimensionTable::load_from(&path)
            .with_context(|| format!("loading dataset table {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            datasets = overrides.len(),
            "merged dataset table overrides"
        );
        table.merge(overrides);
    }

    Ok(table)
}

// ── Request / output ───────────────────────────────────────────────────────────

/// Read an analysis request document.
pub fn load_request(path: &Path) -> anyhow::Result<AnalysisRequest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    let request: AnalysisRequest = serde_json::from_str(&text)
        .with_context(|| format!("parsing request {}", path.display()))?;
    request.validate()?;
    Ok(request)
}

pub fn render_output(analysis: &ChartAnalysis, compact: bool) -> anyhow::Result<String> {
    let text = if compact {
        serde_json::to_string(analysis)?
    } else {
        serde_json::to_string_pretty(analysis)?
    };
    Ok(text)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
