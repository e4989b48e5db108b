//! Series store boundary
//!
//! The aggregate dimension hands each [`AggregationQuery`] to a
//! [`SeriesStore`] and reads the returned [`AggregationRow`]s. The store owns
//! persistence and execution; this crate only fixes the query and row shapes.
//!
//! [`InMemorySeriesStore`] keeps points in memory and executes queries the way
//! a time-series backend would: name filter, tag filters, inclusive range,
//! fixed-width buckets, one aggregate per bucket, newest bucket first.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::query::AggregationQuery;
use crate::error::StoreError;
use crate::params::{coerce_f64, coerce_int, coerce_string};

/// Column holding the rendered bucket label
pub const TIME_FIELD: &str = "time";

/// Executes aggregation queries against persisted series
#[async_trait]
pub trait SeriesStore: Send + Sync + 'static {
    /// Run `query` to completion, returning one row per bucket
    async fn aggregate(&self, query: &AggregationQuery) -> Result<Vec<AggregationRow>, StoreError>;
}

// ============================================================================
// Rows
// ============================================================================

/// One result row: column name to raw value
///
/// Accessors coerce like [`ParameterSet`](crate::params::ParameterSet) does
/// and fall back to the caller's default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregationRow {
    columns: HashMap<String, Value>,
}

impl AggregationRow {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, returning the updated row
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(name.into(), value.into());
        self
    }

    /// Raw value for `name`; JSON `null` counts as absent
    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.columns.get(name).filter(|v| !v.is_null())
    }

    /// Integer column, or `default`
    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        self.get_raw(name).and_then(coerce_int).unwrap_or(default)
    }

    /// Numeric column, or `default`
    pub fn get_f64(&self, name: &str, default: f64) -> f64 {
        self.get_raw(name).and_then(coerce_f64).unwrap_or(default)
    }

    /// String column, or `default`
    pub fn get_string(&self, name: &str, default: &str) -> String {
        self.get_raw(name)
            .and_then(coerce_string)
            .unwrap_or_else(|| default.to_string())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// A recorded measurement point
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    /// Series name
    pub series: String,
    /// Epoch millis
    pub timestamp: i64,
    /// Tag values
    pub tags: HashMap<String, String>,
    /// Numeric fields
    pub fields: HashMap<String, f64>,
}

impl SeriesPoint {
    /// A point carrying one `count` field
    pub fn count(series: &str, timestamp: i64, count: f64) -> Self {
        Self {
            series: series.to_string(),
            timestamp,
            tags: HashMap::new(),
            fields: HashMap::from([(super::COUNT_FIELD.to_string(), count)]),
        }
    }

    /// Attach a tag
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }
}

/// Snapshot of store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    /// Points recorded
    pub points: usize,
    /// Queries answered successfully
    pub queries_executed: u64,
    /// Queries that failed
    pub queries_failed: u64,
    /// Rows returned across all queries
    pub rows_returned: u64,
}

/// Process-local series store
#[derive(Default)]
pub struct InMemorySeriesStore {
    points: RwLock<Vec<SeriesPoint>>,

    /// Returned by every query while set
    failure: RwLock<Option<StoreError>>,

    queries_executed: AtomicU64,
    queries_failed: AtomicU64,
    rows_returned: AtomicU64,
}

impl InMemorySeriesStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one point
    pub fn record(&self, point: SeriesPoint) {
        self.points.write().push(point);
    }

    /// Record many points
    pub fn record_all(&self, points: impl IntoIterator<Item = SeriesPoint>) {
        self.points.write().extend(points);
    }

    /// Make every query fail with `error`, or succeed again with `None`
    pub fn fail_with(&self, error: Option<StoreError>) {
        *self.failure.write() = error;
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            points: self.points.read().len(),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
        }
    }

    fn execute(&self, query: &AggregationQuery) -> Result<Vec<AggregationRow>, StoreError> {
        if let Some(error) = self.failure.read().clone() {
            return Err(error);
        }

        let width = query.bucket.to_millis();
        if width <= 0 {
            return Err(StoreError::MalformedQuery(format!(
                "bucket width must be positive, got {}",
                query.bucket
            )));
        }
        let offset_ms = i64::from(query.utc_offset.local_minus_utc()) * 1000;

        // Bucket start (UTC millis) -> sum
        let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();

        for point in self.points.read().iter() {
            if point.series != query.series || !query.range.contains(point.timestamp) {
                continue;
            }
            if !query.matches_tags(|k| point.tags.get(k).map(String::as_str)) {
                continue;
            }
            let Some(&value) = point.fields.get(&query.field) else {
                continue;
            };

            // Align to the epoch in the query's zone
            let Some(start) = bucket_start(point.timestamp, width, offset_ms) else {
                continue;
            };
            *buckets.entry(start).or_default() += value;
        }

        let rows: Vec<AggregationRow> = buckets
            .iter()
            .rev()
            .take(query.limit)
            .map(|(&start, &sum)| {
                AggregationRow::new()
                    .with(query.field.as_str(), number(sum))
                    .with(TIME_FIELD, query.format.render(start, &query.utc_offset))
            })
            .collect();

        Ok(rows)
    }
}

/// Start of the bucket holding `timestamp`, or `None` when it falls outside `i64`
fn bucket_start(timestamp: i64, width: i64, offset_ms: i64) -> Option<i64> {
    let local = timestamp.checked_add(offset_ms)?;
    local
        .div_euclid(width)
        .checked_mul(width)?
        .checked_sub(offset_ms)
}

fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[async_trait]
impl SeriesStore for InMemorySeriesStore {
    async fn aggregate(&self, query: &AggregationQuery) -> Result<Vec<AggregationRow>, StoreError> {
        match self.execute(query) {
            Ok(rows) => {
                self.queries_executed.fetch_add(1, Ordering::Relaxed);
                self.rows_returned
                    .fetch_add(rows.len() as u64, Ordering::Relaxed);
                debug!(
                    series = %query.series,
                    bucket = %query.bucket,
                    rows = rows.len(),
                    "Aggregation executed"
                );
                Ok(rows)
            },
            Err(e) => {
                self.queries_failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            },
        }
    }
}
