//! Core value types shared by both dimension modes
//!
//! # Key Types
//!
//! - **`MeasurementValue`**: one emitted unit (value + time or bucket label + index)
//! - **`ValueType`**: semantic type a dimension produces
//! - **`TimeRange`**: inclusive `[from, to]` range in epoch millis
//! - **`Interval`**: calendar-ish bucket size such as `1h` or `10m`
//!
//! # Example
//!
//! ```rust
//! use measurement_engine::types::{Interval, TimeRange};
//!
//! let bucket: Interval = "1h".parse().unwrap();
//! assert_eq!(bucket.to_millis(), 3_600_000);
//!
//! let range = TimeRange::new(1000, 2000).unwrap();
//! assert!(range.contains(2000));
//! ```

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Semantic type of the values a dimension produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Whole numbers (counts)
    Int,
    /// Floating point numbers
    Double,
    /// Free text
    String,
    /// Point in time
    DateTime,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int => write!(f, "int"),
            ValueType::Double => write!(f, "double"),
            ValueType::String => write!(f, "string"),
            ValueType::DateTime => write!(f, "datetime"),
        }
    }
}

/// When a measurement value was observed
///
/// Real-time values carry the wall-clock emission time; aggregate values carry
/// the formatted label of their bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementTime {
    /// Epoch milliseconds
    Millis(i64),
    /// Formatted bucket label
    Label(String),
}

/// A single emitted measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementValue {
    /// Measured value
    pub value: f64,
    /// Timestamp or bucket label
    pub time: MeasurementTime,
    /// Position in an aggregate result, `None` for real-time values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl MeasurementValue {
    /// Value observed at an instant
    pub fn at(value: f64, timestamp_ms: i64) -> Self {
        Self {
            value,
            time: MeasurementTime::Millis(timestamp_ms),
            index: None,
        }
    }

    /// Value for a labelled bucket at a position in the result
    pub fn bucket(value: f64, label: impl Into<String>, index: usize) -> Self {
        Self {
            value,
            time: MeasurementTime::Label(label.into()),
            index: Some(index),
        }
    }

    /// Epoch millis, if this value carries an instant
    pub fn timestamp(&self) -> Option<i64> {
        match self.time {
            MeasurementTime::Millis(ts) => Some(ts),
            MeasurementTime::Label(_) => None,
        }
    }

    /// Bucket label, if this value carries one
    pub fn label(&self) -> Option<&str> {
        match &self.time {
            MeasurementTime::Millis(_) => None,
            MeasurementTime::Label(label) => Some(label),
        }
    }
}

/// Lazy sequence of measurement values produced by a dimension
///
/// Real-time streams are unbounded; aggregate streams are finite. Either kind
/// ends after yielding an `Err`. Dropping the stream cancels the work behind it.
pub type MeasurementStream = BoxStream<'static, Result<MeasurementValue>>;

/// Inclusive time range in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Range start (inclusive)
    pub from: i64,
    /// Range end (inclusive)
    pub to: i64,
}

impl TimeRange {
    /// Create a range, rejecting `from > to`
    pub fn new(from: i64, to: i64) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidTimeRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// The `hours` leading up to `now`
    pub fn last_hours(now: i64, hours: u32) -> Self {
        Self {
            from: now - i64::from(hours) * HOUR_MS,
            to: now,
        }
    }

    /// Whether `timestamp` lies inside the range
    pub fn contains(&self, timestamp: i64) -> bool {
        self.from <= timestamp && timestamp <= self.to
    }

    /// Width of the range in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.to - self.from
    }
}

/// Unit of an [`Interval`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    /// `s`
    Seconds,
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
    /// `w`
    Weeks,
    /// `M`, bucketed as 30 days
    Months,
    /// `y`, bucketed as 365 days
    Years,
}

impl IntervalUnit {
    fn millis(self) -> i64 {
        match self {
            IntervalUnit::Seconds => SECOND_MS,
            IntervalUnit::Minutes => MINUTE_MS,
            IntervalUnit::Hours => HOUR_MS,
            IntervalUnit::Days => DAY_MS,
            IntervalUnit::Weeks => 7 * DAY_MS,
            IntervalUnit::Months => 30 * DAY_MS,
            IntervalUnit::Years => 365 * DAY_MS,
        }
    }

    fn suffix(self) -> char {
        match self {
            IntervalUnit::Seconds => 's',
            IntervalUnit::Minutes => 'm',
            IntervalUnit::Hours => 'h',
            IntervalUnit::Days => 'd',
            IntervalUnit::Weeks => 'w',
            IntervalUnit::Months => 'M',
            IntervalUnit::Years => 'y',
        }
    }
}

/// Bucket size for time-grouped aggregation, written like `1h`, `10m`, `30s`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    /// Number of units, always positive
    pub amount: u32,
    /// Unit of the amount
    pub unit: IntervalUnit,
}

impl Interval {
    /// Create an interval
    ///
    /// `amount` must be positive and the bucket width must fit in `i64`
    /// milliseconds.
    pub fn new(amount: u32, unit: IntervalUnit) -> Option<Self> {
        let width = i64::from(amount).checked_mul(unit.millis())?;
        (width > 0).then_some(Self { amount, unit })
    }

    /// `n` hours
    pub fn hours(amount: u32) -> Self {
        Self {
            amount: amount.max(1),
            unit: IntervalUnit::Hours,
        }
    }

    /// Fixed width of one bucket
    ///
    /// Saturates at `i64::MAX` for intervals built field by field.
    pub fn to_millis(&self) -> i64 {
        i64::from(self.amount).saturating_mul(self.unit.millis())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("interval '{}' has no unit", s))?;
        let (num, unit) = s.split_at(split);
        let amount: u32 = num
            .parse()
            .map_err(|_| format!("interval '{}' has no amount", s))?;

        // Month is the only case-sensitive unit
        let unit = match unit {
            "M" => IntervalUnit::Months,
            u => match u.to_ascii_lowercase().as_str() {
                "s" => IntervalUnit::Seconds,
                "m" => IntervalUnit::Minutes,
                "h" => IntervalUnit::Hours,
                "d" => IntervalUnit::Days,
                "w" => IntervalUnit::Weeks,
                "y" => IntervalUnit::Years,
                _ => return Err(format!("unknown interval unit '{}'", unit)),
            },
        };

        if amount == 0 {
            return Err(format!("interval '{}' must be positive", s));
        }
        Interval::new(amount, unit).ok_or_else(|| format!("interval '{}' is too wide", s))
    }
}

/// Parse a duration string like `500ms`, `1s`, `10m`, `1h`, `1d`
///
/// A bare integer is read as milliseconds. Zero durations are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_ascii_lowercase();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (num, unit) = input.split_at(split);
    let num: u64 = num.parse().ok()?;

    let millis = match unit {
        "" | "ms" => num,
        "s" => num.checked_mul(SECOND_MS as u64)?,
        "m" => num.checked_mul(MINUTE_MS as u64)?,
        "h" => num.checked_mul(HOUR_MS as u64)?,
        "d" => num.checked_mul(DAY_MS as u64)?,
        _ => return None,
    };

    (millis > 0).then(|| Duration::from_millis(millis))
}
