//! Parameter sets supplied by dashboard callers
//!
//! A [`ParameterSet`] maps parameter names to raw JSON values. Every typed
//! accessor coerces the raw value and falls back to the caller's default when
//! the key is missing or the value cannot be coerced, so a dimension stays
//! usable with partial or malformed input.
//!
//! # Example
//!
//! ```rust
//! use measurement_engine::params::ParameterSet;
//! use std::time::Duration;
//!
//! let params = ParameterSet::new()
//!     .with("interval", "10s")
//!     .with("limit", "oops");
//!
//! assert_eq!(params.get_duration("interval", Duration::from_secs(1)), Duration::from_secs(10));
//! assert_eq!(params.get_int("limit", 1), 1);
//! assert!(params.get_date("from").is_none());
//! ```

pub mod schema;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::types::{parse_duration, Interval};

pub use schema::{ConfigSchema, ParamFormat, ParamSpec, SchemaViolation};

/// Named, raw parameter values for one dimension call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: HashMap<String, Value>,
}

impl ParameterSet {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, returning the updated set
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Parse a parameter set from a JSON object
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Raw value for `name`; JSON `null` counts as absent
    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    /// Whether a non-null value is present for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.get_raw(name).is_some()
    }

    /// Parameter names in arbitrary order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// String value, or `None` when absent or blank
    pub fn get_string_opt(&self, name: &str) -> Option<String> {
        self.get_raw(name)
            .and_then(coerce_string)
            .filter(|s| !s.trim().is_empty())
    }

    /// String value, or `default`
    pub fn get_string(&self, name: &str, default: &str) -> String {
        self.get_string_opt(name)
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer value, or `default`
    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        self.coerced(name, coerce_int).unwrap_or(default)
    }

    /// Duration value (`500ms`, `1s`, `10m`, bare millis), or `default`
    pub fn get_duration(&self, name: &str, default: Duration) -> Duration {
        self.coerced(name, coerce_duration).unwrap_or(default)
    }

    /// Bucket interval (`1h`, `10m`, `30s`), or `default`
    pub fn get_interval(&self, name: &str, default: Interval) -> Interval {
        self.coerced(name, |v| coerce_string(v)?.parse().ok())
            .unwrap_or(default)
    }

    /// Date value read at UTC, `None` when absent or unparseable
    pub fn get_date(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get_date_at(name, &utc_offset())
    }

    /// Date value with zone-less inputs read at `offset`
    pub fn get_date_at(&self, name: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
        self.coerced(name, |v| coerce_date(v, offset))
    }

    fn coerced<T>(&self, name: &str, coerce: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
        let raw = self.get_raw(name)?;
        let value = coerce(raw);
        if value.is_none() {
            debug!(param = name, raw = %raw, "Parameter could not be coerced, using default");
        }
        value
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterSet
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ============================================================================
// Coercion helpers (shared with aggregation rows)
// ============================================================================

pub(crate) fn utc_offset() -> FixedOffset {
    Utc.fix()
}

pub(crate) fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        },
        _ => None,
    }
}

pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

fn coerce_duration(value: &Value) -> Option<Duration> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis),
        Value::String(s) => parse_duration(s),
        _ => None,
    }
}

pub(crate) fn coerce_date(value: &Value, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => parse_date(s.trim(), offset),
        _ => None,
    }
}

/// Parse epoch millis, RFC 3339, `yyyy-MM-dd HH:mm:ss` or `yyyy-MM-dd`
fn parse_date(s: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    if let Ok(millis) = s.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
