//! Aggregation query construction
//!
//! Translates one series name and one [`ParameterSet`] into a declarative
//! [`AggregationQuery`] for a [`SeriesStore`](super::SeriesStore). Building a
//! query performs no I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ParameterSet                            │
//! │   productId, msgType, time, format, limit, from, to             │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │  AggregationQuery::from_params
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        AggQueryBuilder                          │
//! │     1. sum("count") over the series                             │
//! │     2. equality filters for the tags that were supplied         │
//! │     3. bucket size + label format                               │
//! │     4. limit on returned buckets                                │
//! │     5. [from, to] range                                         │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//!                          AggregationQuery
//! ```
//!
//! # Example
//!
//! ```rust
//! use measurement_engine::aggregation::AggQueryBuilder;
//! use measurement_engine::types::Interval;
//!
//! let query = AggQueryBuilder::new("message-count")
//!     .sum("count")
//!     .with_tag("productId", "dev-1")
//!     .bucket(Interval::hours(1))
//!     .limit(3)
//!     .time_range(0, 3_600_000)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(query.field, "count");
//! assert_eq!(query.filter_value("productId"), Some("dev-1"));
//! ```

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use super::format::BucketFormat;
use crate::config::AggregateConfig;
use crate::error::{Error, Result};
use crate::params::{utc_offset, ParameterSet};
use crate::types::{Interval, TimeRange};

/// Field summed by the message count aggregation
pub const COUNT_FIELD: &str = "count";

/// Tags that narrow the aggregation when supplied
pub const FILTER_PARAMS: [&str; 2] = ["productId", "msgType"];

// ============================================================================
// Query Types
// ============================================================================

/// Equality predicate on a named tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagFilter {
    /// Tag key
    pub key: String,

    /// Required tag value
    pub value: String,
}

/// A time-bucketed aggregation over one series
///
/// Built per call and discarded once the result has been consumed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationQuery {
    /// Series to aggregate
    pub series: String,

    /// Field summed per bucket; also the column name of the result
    pub field: String,

    /// Equality filters, all must match
    pub filters: Vec<TagFilter>,

    /// Bucket width
    #[serde(serialize_with = "serialize_display")]
    pub bucket: Interval,

    /// Bucket label format
    pub format: BucketFormat,

    /// Most buckets to return
    pub limit: usize,

    /// Inclusive range of point timestamps
    pub range: TimeRange,

    /// Zone used to align buckets and render labels
    #[serde(serialize_with = "serialize_display")]
    pub utc_offset: FixedOffset,
}

fn serialize_display<T: fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl AggregationQuery {
    /// Value required for `key`, if the query filters on it
    pub fn filter_value(&self, key: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }

    /// Whether a point with these tags passes every filter
    pub fn matches_tags<'a>(&self, mut tag: impl FnMut(&str) -> Option<&'a str>) -> bool {
        self.filters
            .iter()
            .all(|f| tag(&f.key) == Some(f.value.as_str()))
    }

    /// Build the query a dashboard call describes
    ///
    /// Absent or malformed parameters fall back to `config`. A missing `to`
    /// resolves to `now` and a missing `from` to `config.default_lookback_hours`
    /// before `now`. Fails with [`Error::InvalidTimeRange`] when the resolved
    /// `from` lies after `to`.
    pub fn from_params(
        series: &str,
        params: &ParameterSet,
        config: &AggregateConfig,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let offset = config.utc_offset();

        let mut builder = AggQueryBuilder::new(series)
            .sum(COUNT_FIELD)
            .utc_offset(offset);

        for key in FILTER_PARAMS {
            if let Some(value) = params.get_string_opt(key) {
                builder = builder.with_tag(key, &value);
            }
        }

        let bucket = params.get_interval("time", config.bucket());
        let format = params
            .get_string_opt("format")
            .and_then(|pattern| match BucketFormat::parse(&pattern) {
                Ok(format) => Some(format),
                Err(e) => {
                    debug!(error = %e, "Bucket format rejected, using default");
                    None
                },
            })
            .unwrap_or_else(|| config.bucket_format());

        let requested = params.get_int("limit", config.default_limit as i64);
        let limit = clamp_limit(requested, config.max_limit);

        let now_ms = now.timestamp_millis();
        let defaults = config.default_range(now_ms);
        let to = params
            .get_date_at("to", &offset)
            .map(|d| d.timestamp_millis())
            .unwrap_or(defaults.to);
        let from = params
            .get_date_at("from", &offset)
            .map(|d| d.timestamp_millis())
            .unwrap_or(defaults.from);

        builder
            .bucket(bucket)
            .format(format)
            .limit(limit)
            .time_range(from, to)
            .build()
    }
}

/// Clamp a requested bucket limit into `1..=max`
///
/// Non-positive limits become 1; anything above `max` becomes `max`.
pub fn clamp_limit(requested: i64, max: usize) -> usize {
    let max = max.max(1);
    if requested < 1 {
        warn!(requested, "Non-positive limit, using 1");
        return 1;
    }
    match usize::try_from(requested) {
        Ok(limit) if limit <= max => limit,
        _ => {
            warn!(requested, max, "Limit above maximum, clamping");
            max
        },
    }
}

// ============================================================================
// Query Builder
// ============================================================================

/// Builder for constructing aggregation queries
#[derive(Debug)]
pub struct AggQueryBuilder {
    series: String,
    field: String,
    filters: Vec<TagFilter>,
    bucket: Interval,
    format: BucketFormat,
    limit: usize,
    time_range: Option<(i64, i64)>,
    utc_offset: FixedOffset,
}

impl AggQueryBuilder {
    /// Create a new query builder for a series
    pub fn new(series: &str) -> Self {
        Self {
            series: series.to_string(),
            field: COUNT_FIELD.to_string(),
            filters: Vec::new(),
            bucket: Interval::hours(1),
            format: BucketFormat::default(),
            limit: 1,
            time_range: None,
            utc_offset: utc_offset(),
        }
    }

    /// Sum `field` per bucket
    pub fn sum(mut self, field: &str) -> Self {
        self.field = field.to_string();
        self
    }

    /// Add an exact tag filter
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.filters.push(TagFilter {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Set the bucket width
    pub fn bucket(mut self, bucket: Interval) -> Self {
        self.bucket = bucket;
        self
    }

    /// Set the bucket label format
    pub fn format(mut self, format: BucketFormat) -> Self {
        self.format = format;
        self
    }

    /// Limit the number of buckets returned
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the inclusive time range
    pub fn time_range(mut self, from: i64, to: i64) -> Self {
        self.time_range = Some((from, to));
        self
    }

    /// Set the zone for bucket alignment and labels
    pub fn utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Build the query
    pub fn build(self) -> Result<AggregationQuery> {
        let (from, to) = self
            .time_range
            .ok_or_else(|| Error::Configuration("aggregation query needs a time range".to_string()))?;
        let range = TimeRange::new(from, to)?;

        if self.limit == 0 {
            return Err(Error::Configuration("aggregation limit must be positive".to_string()));
        }

        Ok(AggregationQuery {
            series: self.series,
            field: self.field,
            filters: self.filters,
            bucket: self.bucket,
            format: self.format,
            limit: self.limit,
            range,
            utc_offset: self.utc_offset,
        })
    }
}
