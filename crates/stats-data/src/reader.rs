//! Decoding of `getStatsData` response documents.
//!
//! The statistics source wraps every answer in the same envelope:
//!
//! ```text
//! GET_STATS_DATA
//! ├── RESULT { STATUS, ERROR_MSG }
//! └── STATISTICAL_DATA
//!     └── DATA_INF
//!         └── VALUE  (array of records, or a single record object)
//! ```
//!
//! This module turns such a document into a [`RetrievalResult`], keeping the
//! "nothing matched" answer distinct from real errors. It also discovers
//! recorded responses on disk for offline replay.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use stats_core::models::{RawRecord, RetrievalResult};
use stats_core::{Result, StatsError};
use tracing::{debug, warn};

/// Status the source uses for "finished normally, but no data matched".
pub const NO_DATA_STATUS: i64 = 1;

/// Message the source uses when a query matches nothing.
const NO_DATA_MESSAGE: &str = "該当データはありません";

// ── Response decoding ─────────────────────────────────────────────────────────

/// Decode a `getStatsData` JSON document.
pub fn parse_stats_data(document: &Value) -> Result<RetrievalResult> {
    let root = document.get("GET_STATS_DATA").ok_or_else(|| {
        StatsError::MalformedResponse("missing GET_STATS_DATA".to_string())
    })?;
    let result = root
        .get("RESULT")
        .ok_or_else(|| StatsError::MalformedResponse("missing RESULT".to_string()))?;

    let status = parse_status(result.get("STATUS"))?;
    if status != 0 {
        let message = result
            .get("ERROR_MSG")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if status == NO_DATA_STATUS || message.contains(NO_DATA_MESSAGE) {
            warn!(status, message = %message, "source reported no matching data");
            return Ok(RetrievalResult::NoMatchingData);
        }
        return Err(StatsError::SourceStatus { status, message });
    }

    let values = root
        .get("STATISTICAL_DATA")
        .and_then(|s| s.get("DATA_INF"))
        .and_then(|d| d.get("VALUE"));

    let records = match values {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(decode_record)
            .collect::<Result<Vec<_>>>()?,
        // A table with a single cell comes back as a bare object.
        Some(single @ Value::Object(_)) => vec![decode_record(single)?],
        Some(other) => {
            return Err(StatsError::MalformedResponse(format!(
                "VALUE is neither an array nor an object: {other}"
            )));
        }
    };

    if records.is_empty() {
        warn!("source response carried no records");
    } else {
        debug!(records = records.len(), "decoded source records");
    }
    Ok(RetrievalResult::from_records(records))
}

/// Decode a `getStatsData` document from text.
pub fn parse_stats_data_str(text: &str) -> Result<RetrievalResult> {
    let document: Value = serde_json::from_str(text)?;
    parse_stats_data(&document)
}

/// Read and decode a recorded response file.
pub fn load_response_file(path: &Path) -> Result<RetrievalResult> {
    let text = std::fs::read_to_string(path).map_err(|source| StatsError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_stats_data_str(&text)
}

fn parse_status(status: Option<&Value>) -> Result<i64> {
    let parsed = match status {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| StatsError::MalformedResponse(format!("unreadable STATUS: {status:?}")))
}

fn decode_record(value: &Value) -> Result<RawRecord> {
    match value {
        Value::Object(map) => RawRecord::try_from(map.clone()),
        other => Err(StatsError::ContractViolation(format!(
            "record is not an object: {other}"
        ))),
    }
}

// ── Recorded response discovery ───────────────────────────────────────────────

/// Find all `.json` files recursively under `dir`, sorted by path.
pub fn find_response_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Response directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "json")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Map dataset ids (file stems) to recorded response files under `dir`.
///
/// When the same stem appears twice, the first path in sorted order wins.
pub fn index_response_files(dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut index = BTreeMap::new();
    for path in find_response_files(dir) {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if index.contains_key(stem) {
            warn!(
                dataset = stem,
                path = %path.display(),
                "duplicate recorded response ignored"
            );
            continue;
        }
        index.insert(stem.to_string(), path);
    }
    index
}

// ── Tests ─────────────────────────────────────────────────────────────────────
