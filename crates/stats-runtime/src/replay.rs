//! File-backed fetcher serving recorded source responses.
//!
//! A response directory holds one `getStatsData` document per dataset, named
//! `<statsDataId>.json` anywhere below the root. Server-side parameters of the
//! query are applied to the recorded records the way the source would apply
//! them, so a recording of a whole table can serve narrower queries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use stats_core::data_processors::DimensionKey;
use stats_core::models::{RawRecord, RetrievalResult, SourceQuery, TIME_KEY};
use stats_core::{Result, StatsError};
use stats_data::reader::{index_response_files, parse_stats_data_str};
use tracing::{debug, warn};

use crate::fetcher::StatsFetcher;

pub struct ReplayFetcher {
    root: PathBuf,
    index: BTreeMap<String, PathBuf>,
}

impl ReplayFetcher {
    /// Index every recorded response below `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let index = index_response_files(&root);
        debug!(
            root = %root.display(),
            datasets = index.len(),
            "indexed recorded responses"
        );
        Self { root, index }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dataset ids that have a recorded response.
    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl StatsFetcher for ReplayFetcher {
    async fn fetch(&self, query: SourceQuery) -> Result<RetrievalResult> {
        let path = self
            .index
            .get(&query.dataset_id)
            .ok_or_else(|| StatsError::Retrieval {
                dataset: query.dataset_id.clone(),
                reason: format!("no recorded response under {}", self.root.display()),
            })?;

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StatsError::FileRead {
                path: path.clone(),
                source,
            })?;

        let records = match parse_stats_data_str(&text)? {
            RetrievalResult::NoMatchingData => return Ok(RetrievalResult::NoMatchingData),
            RetrievalResult::Records(records) => records,
        };

        let filters = server_filters(&query);
        let total = records.len();
        let kept: Vec<RawRecord> = records
            .into_iter()
            .filter(|r| filters.iter().all(|(key, code)| server_matches(r, key, code)))
            .collect();

        debug!(
            dataset = %query.dataset_id,
            query = %query.to_query_string(),
            total,
            kept = kept.len(),
            "replayed recorded response"
        );
        Ok(RetrievalResult::from_records(kept))
    }
}

/// Dimension key → code pairs for the query's server-side parameters.
fn server_filters(query: &SourceQuery) -> Vec<(String, &str)> {
    query
        .params
        .iter()
        .filter_map(|(name, code)| match DimensionKey::from_query_param(name) {
            Some(key) => Some((key, code.as_str())),
            None => {
                warn!(param = %name, "ignoring non-dimension query parameter");
                None
            }
        })
        .collect()
}

/// Source-side matching: a record that does not carry the dimension at all
/// is not excluded by it.
fn server_matches(record: &RawRecord, key: &str, code: &str) -> bool {
    if key == TIME_KEY {
        return record.time_code() == code;
    }
    record.dimension(key).map_or(true, |value| value == code)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
