use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of most recent yearly points handed to the summarisation step.
pub const DEFAULT_SUMMARY_WINDOW: usize = 15;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Align statistics series onto a shared yearly axis
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stats-chart",
    about = "Align statistics series onto a shared yearly axis",
    version
)]
pub struct Settings {
    /// Analysis request file (JSON: {"question", "categories": [...]})
    #[arg(long)]
    pub request: PathBuf,

    /// Directory of recorded source responses, one <statsDataId>.json per dataset
    #[arg(long, default_value = "responses")]
    pub responses: PathBuf,

    /// Deferred-dimension table overriding the built-in one (auto-discovered if not specified)
    #[arg(long)]
    pub dataset_table: Option<PathBuf>,

    /// Treat a deferred filter that matches nothing as an error
    #[arg(long)]
    pub empty_as_fatal: bool,

    /// Abort the whole request when any series fails to retrieve
    #[arg(long)]
    pub abort_on_failure: bool,

    /// Most recent yearly points included per series in the summary payload (1-100)
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u32).range(1..=100))]
    pub summary_window: u32,

    /// Print compact JSON instead of pretty-printed output
    #[arg(long)]
    pub compact: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,
}

impl Settings {
    /// Parse the process arguments.
    pub fn load() -> Self {
        Self::parse()
    }

    /// Parse an explicit argument list (used by tests).
    pub fn load_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    /// The pipeline knobs selected on the command line.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            empty_as_fatal: self.empty_as_fatal,
            failure_policy: if self.abort_on_failure {
                FailurePolicy::Abort
            } else {
                FailurePolicy::Degrade
            },
            summary_window: self.summary_window as usize,
        }
    }
}

// ── Pipeline options ───────────────────────────────────────────────────────────

/// What to do when one series of a multi-series request cannot be retrieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep going with the series that did resolve and report the failure.
    #[default]
    Degrade,
    /// Return the first retrieval failure unchanged.
    Abort,
}

/// Caller-level choices applied while turning retrieved records into a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Escalate an all-records-filtered-out deferred filter into an error.
    pub empty_as_fatal: bool,
    pub failure_policy: FailurePolicy,
    /// See [`DEFAULT_SUMMARY_WINDOW`].
    pub summary_window: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            empty_as_fatal: false,
            failure_policy: FailurePolicy::Degrade,
            summary_window: DEFAULT_SUMMARY_WINDOW,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
