use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::data_processors::{DimensionKey, TimeCodeProcessor, ValueParser};
use crate::error::{Result, StatsError};

/// Wire key holding a record's time code.
pub const TIME_KEY: &str = "@time";

/// Wire key holding a record's value cell.
pub const VALUE_KEY: &str = "$";

// ── RawRecord ─────────────────────────────────────────────────────────────────

/// One cell of a statistics table as returned by the source.
///
/// On the wire a record is a flat object: `"@time"` is the time code, `"$"` is
/// the value and every other `@`-prefixed key is a dimension
/// (`{"@tab":"020","@cat01":"A1101","@area":"40000","@time":"2020000000","$":"5135214"}`).
/// Keys outside that convention are dropped at decode time.
///
/// Records are validated on construction and immutable afterwards, so a
/// `RawRecord` always has a four-digit year prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "BTreeMap<String, String>")]
pub struct RawRecord {
    time_code: String,
    value: String,
    dimensions: BTreeMap<String, String>,
}

impl RawRecord {
    /// Build a record, rejecting malformed time codes and dimension keys.
    pub fn new(
        time_code: impl Into<String>,
        value: impl Into<String>,
        dimensions: BTreeMap<String, String>,
    ) -> Result<Self> {
        let time_code = time_code.into();
        if !TimeCodeProcessor::is_valid(&time_code) {
            return Err(StatsError::ContractViolation(format!(
                "time code {time_code:?} does not start with a four-digit year"
            )));
        }
        if let Some(bad) = dimensions.keys().find(|k| !DimensionKey::is_valid(k)) {
            return Err(StatsError::ContractViolation(format!(
                "dimension key {bad:?} does not follow the @name convention"
            )));
        }
        Ok(Self {
            time_code,
            value: value.into(),
            dimensions,
        })
    }

    /// The raw time code, e.g. `"2019001"`.
    pub fn time_code(&self) -> &str {
        &self.time_code
    }

    /// The leading four-digit year of the time code.
    pub fn year(&self) -> &str {
        &self.time_code[..4]
    }

    /// The raw value cell, possibly a placeholder such as `"-"`.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The value cell as a number, or `None` for placeholders.
    pub fn numeric_value(&self) -> Option<f64> {
        ValueParser::parse(&self.value)
    }

    /// The code stored under dimension `key`, if the record carries it.
    pub fn dimension(&self, key: &str) -> Option<&str> {
        self.dimensions.get(key).map(String::as_str)
    }

    /// All dimensions in key order.
    pub fn dimensions(&self) -> &BTreeMap<String, String> {
        &self.dimensions
    }
}

impl TryFrom<Map<String, Value>> for RawRecord {
    type Error = StatsError;

    fn try_from(object: Map<String, Value>) -> Result<Self> {
        let mut time_code = None;
        let mut value = None;
        let mut dimensions = BTreeMap::new();

        for (key, raw) in object {
            let text = match raw {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(StatsError::ContractViolation(format!(
                        "record field {key:?} holds a non-scalar value: {other}"
                    )));
                }
            };
            if key == TIME_KEY {
                time_code = Some(text);
            } else if key == VALUE_KEY {
                value = Some(text);
            } else if key.starts_with('@') {
                dimensions.insert(key, text);
            }
        }

        let time_code = time_code.ok_or_else(|| {
            StatsError::ContractViolation(format!("record is missing {TIME_KEY:?}"))
        })?;
        let value = value.ok_or_else(|| {
            StatsError::ContractViolation(format!("record is missing {VALUE_KEY:?}"))
        })?;

        Self::new(time_code, value, dimensions)
    }
}

impl From<RawRecord> for BTreeMap<String, String> {
    fn from(record: RawRecord) -> Self {
        let mut map = record.dimensions;
        map.insert(TIME_KEY.to_string(), record.time_code);
        map.insert(VALUE_KEY.to_string(), record.value);
        map
    }
}

// ── RetrievalResult / SourceQuery ─────────────────────────────────────────────

/// What the retrieval collaborator hands back for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalResult {
    /// The source returned at least one record.
    Records(Vec<RawRecord>),
    /// The source explicitly reported that nothing matched the query.
    NoMatchingData,
}

impl RetrievalResult {
    /// Normalise an empty record list into [`RetrievalResult::NoMatchingData`].
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        if records.is_empty() {
            Self::NoMatchingData
        } else {
            Self::Records(records)
        }
    }

    /// Number of records carried (zero for `NoMatchingData`).
    pub fn len(&self) -> usize {
        match self {
            Self::Records(records) => records.len(),
            Self::NoMatchingData => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A query as sent to the retrieval collaborator.
///
/// Only server-applicable filters appear in `params`; deferred dimensions are
/// applied locally after the records come back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceQuery {
    #[serde(rename = "statsDataId")]
    pub dataset_id: String,
    /// `(parameter name, code)` pairs, e.g. `("cdArea", "40000")`.
    pub params: Vec<(String, String)>,
}

impl SourceQuery {
    /// Render the query string the source API expects (without credentials).
    pub fn to_query_string(&self) -> String {
        std::iter::once(format!("statsDataId={}", self.dataset_id))
            .chain(self.params.iter().map(|(k, v)| format!("{k}={v}")))
            .collect::<Vec<_>>()
            .join("&")
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Dimension filters for one dataset, as received from the request handler.
///
/// Values are kept as raw JSON until the resolver validates them, so that a
/// malformed value surfaces as an `InvalidFilter` rather than a decode error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    #[serde(rename = "statsDataId")]
    pub dataset_id: String,
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
}

impl FilterRequest {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            filters: BTreeMap::new(),
        }
    }

    /// Builder-style helper for adding a string filter.
    pub fn with_filter(mut self, dimension: impl Into<String>, code: impl Into<String>) -> Self {
        self.filters
            .insert(dimension.into(), Value::String(code.into()));
        self
    }
}

/// Display metadata for a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub name: String,
    pub unit: String,
}

/// A requested series: what to fetch plus how to label it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDescriptor {
    #[serde(flatten)]
    pub request: FilterRequest,
    pub category_info: CategoryInfo,
}

impl SeriesDescriptor {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, request: FilterRequest) -> Self {
        Self {
            request,
            category_info: CategoryInfo {
                name: name.into(),
                unit: unit.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.category_info.name
    }

    pub fn unit(&self) -> &str {
        &self.category_info.unit
    }

    /// Chart legend label, `"name (unit)"`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name(), self.unit())
    }
}

// ── Series ────────────────────────────────────────────────────────────────────

/// One aggregated year of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyPoint {
    /// Four-digit year, e.g. `"2019"`.
    pub year: String,
    pub value: f64,
}

impl YearlyPoint {
    pub fn new(year: impl Into<String>, value: f64) -> Self {
        Self {
            year: year.into(),
            value,
        }
    }
}

/// A named, unit-tagged, year-ordered numeric sequence.
///
/// An empty `points` list means nothing was retrieved or matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub descriptor: SeriesDescriptor,
    points: Vec<YearlyPoint>,
}

impl Series {
    /// Build a series, checking that years are four-digit and strictly
    /// increasing and that every value is finite.
    pub fn new(descriptor: SeriesDescriptor, points: Vec<YearlyPoint>) -> Result<Self> {
        for point in &points {
            if !point.value.is_finite() {
                return Err(StatsError::ContractViolation(format!(
                    "series \"{}\" has non-finite value for {}",
                    descriptor.name(),
                    point.year
                )));
            }
            if point.year.len() != 4 || TimeCodeProcessor::year(&point.year).is_none() {
                return Err(StatsError::ContractViolation(format!(
                    "series \"{}\" has malformed year {:?}",
                    descriptor.name(),
                    point.year
                )));
            }
        }
        if let Some(pair) = points.windows(2).find(|w| w[0].year >= w[1].year) {
            return Err(StatsError::ContractViolation(format!(
                "series \"{}\" years are not strictly increasing ({} then {})",
                descriptor.name(),
                pair[0].year,
                pair[1].year
            )));
        }
        Ok(Self { descriptor, points })
    }

    /// A series with no data.
    pub fn empty(descriptor: SeriesDescriptor) -> Self {
        Self {
            descriptor,
            points: Vec::new(),
        }
    }

    pub fn points(&self) -> &[YearlyPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn unit(&self) -> &str {
        self.descriptor.unit()
    }

    /// The value observed for `year`, if any.
    pub fn value_for(&self, year: &str) -> Option<f64> {
        self.points
            .binary_search_by(|p| p.year.as_str().cmp(year))
            .ok()
            .map(|i| self.points[i].value)
    }

    /// The last `n` points (all of them when the series is shorter).
    pub fn recent(&self, n: usize) -> &[YearlyPoint] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }
}

// ── AlignedChart ──────────────────────────────────────────────────────────────

/// Which value scale a series is drawn against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisId {
    #[serde(rename = "y")]
    Primary,
    #[serde(rename = "y1")]
    Secondary,
}

/// One series reprojected onto the chart's shared labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedSeries {
    /// Legend label, `"name (unit)"`.
    pub label: String,
    pub unit: String,
    /// One entry per chart label; `None` where the series has no observation.
    pub data: Vec<Option<f64>>,
    #[serde(rename = "yAxisID")]
    pub axis: AxisId,
}

/// Several series on one ascending set of year labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedChart {
    pub labels: Vec<String>,
    pub datasets: Vec<AlignedSeries>,
}

impl AlignedChart {
    /// Re-check the shape invariants: labels strictly ascending and every
    /// value array as long as the label list.
    pub fn validate(&self) -> Result<()> {
        if let Some(pair) = self.labels.windows(2).find(|w| w[0] >= w[1]) {
            return Err(StatsError::ContractViolation(format!(
                "chart labels are not strictly ascending ({} then {})",
                pair[0], pair[1]
            )));
        }
        for dataset in &self.datasets {
            if dataset.data.len() != self.labels.len() {
                return Err(StatsError::ContractViolation(format!(
                    "series \"{}\" has {} values for {} labels",
                    dataset.label,
                    dataset.data.len(),
                    self.labels.len()
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

// ── Diagnostics ───────────────────────────────────────────────────────────────

/// How a single requested series was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesOutcome {
    Matched,
    NoMatchingData,
    DeferredFilterMiss,
    /// Records matched, but every value cell was a placeholder.
    NoNumericValues,
    RetrievalFailed,
}

/// Per-series troubleshooting record handed back alongside the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDiagnostic {
    pub series_name: String,
    pub matched: bool,
    /// `"@dim=value"` entries seen in the retrieved records for each deferred
    /// dimension, populated when deferred filtering removed everything.
    pub distinct_deferred_dimension_values_observed: Vec<String>,
    pub outcome: SeriesOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SeriesDiagnostic {
    pub fn matched(series_name: impl Into<String>) -> Self {
        Self::with_outcome(series_name, SeriesOutcome::Matched)
    }

    pub fn with_outcome(series_name: impl Into<String>, outcome: SeriesOutcome) -> Self {
        Self {
            series_name: series_name.into(),
            matched: outcome == SeriesOutcome::Matched,
            distinct_deferred_dimension_values_observed: Vec::new(),
            outcome,
            error: None,
        }
    }

    pub fn retrieval_failed(series_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_outcome(series_name, SeriesOutcome::RetrievalFailed)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
