use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the statistics chart pipeline.
#[derive(Error, Debug)]
pub enum StatsError {
    /// A filter in the request is not a usable scalar code.
    #[error("Invalid filter for {dimension}: {reason}")]
    InvalidFilter { dimension: String, reason: String },

    /// Post-retrieval filtering removed every record and the caller asked for
    /// that to be fatal.
    #[error("Deferred filter matched no records for \"{series}\" (observed: {})", .observed.join(", "))]
    DeferredFilterMiss {
        series: String,
        observed: Vec<String>,
    },

    /// A collaborator handed over structurally invalid data (bad time code,
    /// bad dimension key, mismatched array shapes).
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// The retrieval collaborator failed for a dataset.
    #[error("Retrieval failed for dataset {dataset}: {reason}")]
    Retrieval { dataset: String, reason: String },

    /// The statistics source answered with a non-zero status.
    #[error("Source returned status {status}: {message}")]
    SourceStatus { status: i64, message: String },

    /// A source response document did not have the expected envelope.
    #[error("Malformed source response: {0}")]
    MalformedResponse(String),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StatsError {
    /// Shorthand for an [`StatsError::InvalidFilter`].
    pub fn invalid_filter(dimension: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            dimension: dimension.into(),
            reason: reason.into(),
        }
    }

    /// `true` for faults that indicate a broken collaborator contract rather
    /// than ordinary data sparsity.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation(_))
    }

    /// `true` for errors raised while retrieving source data.
    pub fn is_retrieval_failure(&self) -> bool {
        matches!(
            self,
            Self::Retrieval { .. } | Self::SourceStatus { .. } | Self::MalformedResponse(_)
        )
    }
}

/// Convenience alias used throughout the stats crates.
pub type Result<T> = std::result::Result<T, StatsError>;
