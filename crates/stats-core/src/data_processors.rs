use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Result, StatsError};

// ── ValueParser ───────────────────────────────────────────────────────────────

/// Parses the `$` cell of a source record into a number.
///
/// Source tables carry suppressed or placeholder cells (`-`, `…`, `x`, `***`,
/// `n.a.`) next to real observations, so a failed parse is an expected outcome
/// and is reported as `None` rather than as an error.
pub struct ValueParser;

impl ValueParser {
    /// Parse a trimmed decimal string. Non-finite results count as non-numeric.
    ///
    /// The whole cell must be a number: `"12abc"` and `"1,234"` are
    /// non-numeric here, where a prefix parser such as JavaScript's
    /// `parseFloat` would read `12` and `1`.
    pub fn parse(raw: &str) -> Option<f64> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

// ── TimeCodeProcessor ─────────────────────────────────────────────────────────

fn time_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{4}").expect("regex is valid"))
}

/// Extracts the calendar year from source time codes.
///
/// Codes look like `"2019"`, `"2019000000"` or `"2019001"` (year followed by a
/// period suffix); the leading four digits are always the year.
pub struct TimeCodeProcessor;

impl TimeCodeProcessor {
    /// `true` when `code` starts with four ASCII digits.
    pub fn is_valid(code: &str) -> bool {
        time_code_pattern().is_match(code)
    }

    /// Leading four-digit year of `code`, or `None` when the code is malformed.
    pub fn year(code: &str) -> Option<&str> {
        if Self::is_valid(code) {
            Some(&code[..4])
        } else {
            None
        }
    }
}

// ── DimensionKey ──────────────────────────────────────────────────────────────

/// Helpers for the `@`-prefixed dimension key convention.
///
/// Every dimension of a source record is keyed `@<name>` (`@cat01`, `@area`,
/// `@tab`). The time axis uses the reserved key [`crate::models::TIME_KEY`].
pub struct DimensionKey;

impl DimensionKey {
    /// `true` for `@` followed by at least one ASCII alphanumeric character.
    pub fn is_valid(key: &str) -> bool {
        match key.strip_prefix('@') {
            Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()),
            None => false,
        }
    }

    /// Name of the query parameter the source expects for a dimension filter.
    ///
    /// `@cat01` → `cdCat01`, `@area` → `cdArea`.
    pub fn query_param_name(key: &str) -> String {
        let rest = key.strip_prefix('@').unwrap_or(key);
        let mut chars = rest.chars();
        match chars.next() {
            Some(first) => format!("cd{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => "cd".to_string(),
        }
    }

    /// Inverse of [`query_param_name`](Self::query_param_name):
    /// `cdCat01` → `@cat01`. `None` for names that are not dimension filters.
    pub fn from_query_param(name: &str) -> Option<String> {
        let rest = name.strip_prefix("cd")?;
        let mut chars = rest.chars();
        let first = chars.next()?;
        let key = format!("@{}{}", first.to_ascii_lowercase(), chars.as_str());
        Self::is_valid(&key).then_some(key)
    }
}

// ── FilterValueProcessor ──────────────────────────────────────────────────────

/// Converts filter values received as JSON into source code strings.
pub struct FilterValueProcessor;

impl FilterValueProcessor {
    /// Accept JSON strings and numbers; reject everything else.
    ///
    /// Codes are compared by exact string equality downstream, so a string
    /// padded with whitespace is rejected rather than silently trimmed.
    ///
    /// Numbers are rendered in their canonical decimal form so that
    /// `40000` and `"40000"` select the same code.
    pub fn to_code(dimension: &str, value: &Value) -> Result<String> {
        if !DimensionKey::is_valid(dimension) {
            return Err(StatsError::invalid_filter(
                dimension,
                "dimension codes must look like @name",
            ));
        }

        let code = match value {
            Value::String(s) => {
                if !s.trim().is_empty() && s.trim() != s.as_str() {
                    return Err(StatsError::invalid_filter(
                        dimension,
                        format!("value {s:?} has leading or trailing whitespace"),
                    ));
                }
                s.clone()
            }
            Value::Number(n) => n.to_string(),
            Value::Null => {
                return Err(StatsError::invalid_filter(dimension, "value is null"));
            }
            Value::Bool(_) => {
                return Err(StatsError::invalid_filter(
                    dimension,
                    "value must be a string or number, got a boolean",
                ));
            }
            Value::Array(_) | Value::Object(_) => {
                return Err(StatsError::invalid_filter(
                    dimension,
                    "value must be a scalar code",
                ));
            }
        };

        if code.trim().is_empty() {
            return Err(StatsError::invalid_filter(dimension, "value is empty"));
        }
        Ok(code)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
