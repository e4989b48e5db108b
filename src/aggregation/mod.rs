//! Time-bucketed aggregation over stored series
//!
//! The aggregate dimension answers a dashboard call in three steps: build a
//! declarative query from the call's parameters, let the series store execute
//! it, then sequence the returned rows into measurement values.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           ParameterSet              │
//! └─────────────────────────────────────┘
//!                  ↓  AggregationQuery::from_params
//! ┌─────────────────────────────────────┐
//! │         AggregationQuery            │
//! │  sum(count), filters, bucket, limit │
//! └─────────────────────────────────────┘
//!                  ↓  SeriesStore::aggregate
//! ┌─────────────────────────────────────┐
//! │        Vec<AggregationRow>          │
//! │     one row per bucket (count, time)│
//! └─────────────────────────────────────┘
//!                  ↓  ResultSequencer::sequence
//! ┌─────────────────────────────────────┐
//! │       Vec<MeasurementValue>         │
//! │    indexed, sorted by index         │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - **`AggQueryBuilder`** / **`AggregationQuery`**: the per-call query
//! - **`BucketFormat`**: bucket label patterns such as `MM月dd日 HH时`
//! - **`SeriesStore`**: execution seam, with **`InMemorySeriesStore`** for
//!   single-process use and tests
//! - **`ResultSequencer`**: rows to ordered values

pub mod format;
pub mod query;
pub mod sequencer;
pub mod store;

pub use format::{BucketFormat, DEFAULT_BUCKET_FORMAT};
pub use query::{
    clamp_limit, AggQueryBuilder, AggregationQuery, TagFilter, COUNT_FIELD,
    FILTER_PARAMS,
};
pub use sequencer::ResultSequencer;
pub use store::{
    AggregationRow, InMemorySeriesStore, SeriesPoint, SeriesStore, StoreStatsSnapshot, TIME_FIELD,
};
