//! Measurements and their dimensions
//!
//! A [`Measurement`] is a named metric that owns a fixed, ordered set of
//! [`Dimension`]s. Each dimension is one way of computing the metric:
//!
//! - **real-time** (`realTime`): live per-window counts from the message bus,
//!   an unbounded stream
//! - **aggregate** (`agg`): time-bucketed aggregation over a stored series,
//!   a finite stream
//!
//! Both kinds answer [`Dimension::get_value`] with the same
//! [`MeasurementStream`] type; [`Dimension::is_real_time`] tells a caller
//! whether to keep the stream open or to poll.
//!
//! # Example
//!
//! ```rust
//! use measurement_engine::aggregation::InMemorySeriesStore;
//! use measurement_engine::bus::InMemoryMessageBus;
//! use measurement_engine::config::EngineConfig;
//! use measurement_engine::measurement::{device_message_measurement, DimensionKind};
//! use std::sync::Arc;
//!
//! let measurement = device_message_measurement(
//!     Arc::new(InMemoryMessageBus::default()),
//!     Arc::new(InMemorySeriesStore::new()),
//!     &EngineConfig::default(),
//! );
//!
//! assert_eq!(measurement.key(), "quantity");
//! assert!(measurement.dimension(DimensionKind::RealTime).unwrap().is_real_time());
//! assert!(!measurement.dimension(DimensionKind::Aggregate).unwrap().is_real_time());
//! ```

pub mod device_message;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::aggregation::{AggregationQuery, ResultSequencer, SeriesStore};
use crate::config::{AggregateConfig, RealtimeConfig};
use crate::error::{Error, Result};
use crate::params::{ConfigSchema, ParameterSet};
use crate::realtime::WindowCounter;
use crate::types::{MeasurementStream, ValueType};

pub use device_message::device_message_measurement;

// ============================================================================
// Definitions
// ============================================================================

/// Identity and display name of a measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementDefinition {
    /// Stable key
    pub id: String,
    /// Display name
    pub name: String,
}

impl MeasurementDefinition {
    /// Create a definition
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Identity and display name of a dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionDefinition {
    /// Stable key, `realTime` or `agg`
    pub id: String,
    /// Display name
    pub name: String,
}

/// The two ways a measurement can be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionKind {
    /// Live per-window counts
    #[serde(rename = "realTime")]
    RealTime,
    /// Time-bucketed aggregation over stored data
    #[serde(rename = "agg")]
    Aggregate,
}

impl DimensionKind {
    /// Stable key of the kind
    pub fn id(&self) -> &'static str {
        match self {
            DimensionKind::RealTime => "realTime",
            DimensionKind::Aggregate => "agg",
        }
    }

    /// Common definition shared by every dimension of this kind
    pub fn definition(&self) -> DimensionDefinition {
        let name = match self {
            DimensionKind::RealTime => "实时数据",
            DimensionKind::Aggregate => "聚合数据",
        };
        DimensionDefinition {
            id: self.id().to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for DimensionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "realTime" => Ok(DimensionKind::RealTime),
            "agg" => Ok(DimensionKind::Aggregate),
            other => Err(format!("unknown dimension kind '{}'", other)),
        }
    }
}

// ============================================================================
// Dimensions
// ============================================================================

/// Live per-window message counts
#[derive(Debug, Clone)]
pub struct RealTimeDimension {
    definition: DimensionDefinition,
    value_type: ValueType,
    schema: ConfigSchema,
    counter: WindowCounter,
    default_interval: Duration,
    min_interval: Duration,
}

impl RealTimeDimension {
    /// Dimension counting with `counter`, windows sized by the `interval` parameter
    pub fn new(counter: WindowCounter, schema: ConfigSchema, config: &RealtimeConfig) -> Self {
        Self {
            definition: DimensionKind::RealTime.definition(),
            value_type: ValueType::Int,
            schema,
            counter,
            default_interval: config.default_interval(),
            min_interval: config.min_interval(),
        }
    }

    /// Window length for a call
    ///
    /// Falls back to the default when `interval` is absent or malformed and
    /// never goes below the configured minimum.
    pub fn window(&self, params: &ParameterSet) -> Duration {
        let requested = params.get_duration("interval", self.default_interval);
        if requested < self.min_interval {
            debug!(
                requested_ms = requested.as_millis() as u64,
                min_ms = self.min_interval.as_millis() as u64,
                "Window below minimum, raising"
            );
            return self.min_interval;
        }
        requested
    }

    fn get_value(&self, params: &ParameterSet) -> MeasurementStream {
        self.counter.count(self.window(params))
    }
}

/// Time-bucketed aggregation over a fixed series
#[derive(Clone)]
pub struct AggregateDimension {
    definition: DimensionDefinition,
    value_type: ValueType,
    schema: ConfigSchema,
    series: String,
    store: Arc<dyn SeriesStore>,
    config: AggregateConfig,
}

impl AggregateDimension {
    /// Dimension aggregating `config.series_name` on `store`
    pub fn new(store: Arc<dyn SeriesStore>, schema: ConfigSchema, config: &AggregateConfig) -> Self {
        Self {
            definition: DimensionKind::Aggregate.definition(),
            value_type: ValueType::Int,
            schema,
            series: config.series_name.clone(),
            store,
            config: config.clone(),
        }
    }

    /// Series this dimension aggregates
    pub fn series(&self) -> &str {
        &self.series
    }

    /// The query a call with `params` would run now
    pub fn query(&self, params: &ParameterSet) -> Result<AggregationQuery> {
        AggregationQuery::from_params(&self.series, params, &self.config, Utc::now())
    }

    fn get_value(&self, params: &ParameterSet) -> MeasurementStream {
        // Resolve against the call time, not the time the stream is polled
        let query = self.query(params);
        let store = Arc::clone(&self.store);

        stream::once(async move {
            let query = query?;
            let rows = store.aggregate(&query).await.map_err(|e| {
                warn!(series = %query.series, error = %e, "Aggregation failed");
                Error::QueryExecution(e)
            })?;
            debug!(series = %query.series, rows = rows.len(), limit = query.limit, "Aggregation returned");
            Ok::<_, Error>(ResultSequencer::with_limit(query.limit).sequence(rows))
        })
        .map_ok(|values| stream::iter(values.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .boxed()
    }
}

impl fmt::Debug for AggregateDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateDimension")
            .field("definition", &self.definition)
            .field("series", &self.series)
            .finish()
    }
}

/// One queryable facet of a measurement
#[derive(Debug, Clone)]
pub enum Dimension {
    /// Live stream aggregation
    RealTime(RealTimeDimension),
    /// Stored-series aggregation
    Aggregate(AggregateDimension),
}

/// Serializable description of a dimension for dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionDescriptor {
    /// Kind and display name
    pub definition: DimensionDefinition,
    /// Type of the produced values
    pub value_type: ValueType,
    /// Recognized parameters
    pub params: ConfigSchema,
    /// Whether the value stream is live
    pub real_time: bool,
}

impl Dimension {
    /// Kind of this dimension
    pub fn kind(&self) -> DimensionKind {
        match self {
            Dimension::RealTime(_) => DimensionKind::RealTime,
            Dimension::Aggregate(_) => DimensionKind::Aggregate,
        }
    }

    /// Kind and display metadata
    pub fn definition(&self) -> &DimensionDefinition {
        match self {
            Dimension::RealTime(d) => &d.definition,
            Dimension::Aggregate(d) => &d.definition,
        }
    }

    /// Type of the produced values
    pub fn value_type(&self) -> ValueType {
        match self {
            Dimension::RealTime(d) => d.value_type,
            Dimension::Aggregate(d) => d.value_type,
        }
    }

    /// Parameters this dimension recognizes
    pub fn params(&self) -> &ConfigSchema {
        match self {
            Dimension::RealTime(d) => &d.schema,
            Dimension::Aggregate(d) => &d.schema,
        }
    }

    /// Whether [`get_value`](Self::get_value) returns a live, unbounded stream
    pub fn is_real_time(&self) -> bool {
        matches!(self, Dimension::RealTime(_))
    }

    /// Compute the measurement for one call
    ///
    /// Never fails up front; problems surface as the terminal `Err` of the
    /// stream. The stream does not borrow `params`.
    pub fn get_value(&self, params: &ParameterSet) -> MeasurementStream {
        match self {
            Dimension::RealTime(d) => d.get_value(params),
            Dimension::Aggregate(d) => d.get_value(params),
        }
    }

    /// Serializable description
    pub fn describe(&self) -> DimensionDescriptor {
        DimensionDescriptor {
            definition: self.definition().clone(),
            value_type: self.value_type(),
            params: self.params().clone(),
            real_time: self.is_real_time(),
        }
    }
}

// ============================================================================
// Measurement
// ============================================================================

/// A named metric exposing one or more dimensions
#[derive(Debug, Clone)]
pub struct Measurement {
    definition: MeasurementDefinition,
    dimensions: Vec<Dimension>,
}

impl Measurement {
    /// Compose a measurement from its dimensions, in registration order
    ///
    /// A second dimension of an already registered kind is ignored.
    pub fn new(definition: MeasurementDefinition, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        let mut kept: Vec<Dimension> = Vec::new();
        for dimension in dimensions {
            if kept.iter().any(|d| d.kind() == dimension.kind()) {
                warn!(
                    measurement = %definition.id,
                    kind = %dimension.kind(),
                    "Duplicate dimension ignored"
                );
                continue;
            }
            kept.push(dimension);
        }

        Self {
            definition,
            dimensions: kept,
        }
    }

    /// Identity and display name
    pub fn definition(&self) -> &MeasurementDefinition {
        &self.definition
    }

    /// Stable key
    pub fn key(&self) -> &str {
        &self.definition.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Dimensions in registration order
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Look up the dimension of `kind`
    pub fn dimension(&self, kind: DimensionKind) -> Result<&Dimension> {
        self.dimensions
            .iter()
            .find(|d| d.kind() == kind)
            .ok_or_else(|| Error::UnsupportedDimension {
                measurement: self.definition.id.clone(),
                kind,
            })
    }

    /// Compute the dimension of `kind` for one call
    ///
    /// Fails immediately with [`Error::UnsupportedDimension`] before any
    /// subscription or query is started.
    pub fn get_value(&self, kind: DimensionKind, params: &ParameterSet) -> Result<MeasurementStream> {
        Ok(self.dimension(kind)?.get_value(params))
    }

    /// Descriptions of every dimension, in registration order
    pub fn describe(&self) -> Vec<DimensionDescriptor> {
        self.dimensions.iter().map(Dimension::describe).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::InMemorySeriesStore;
    use crate::bus::InMemoryMessageBus;

    fn realtime() -> Dimension {
        let counter = WindowCounter::new(Arc::new(InMemoryMessageBus::default()), "/device/**");
        Dimension::RealTime(RealTimeDimension::new(
            counter,
            ConfigSchema::new(),
            &RealtimeConfig::default(),
        ))
    }

    fn aggregate() -> Dimension {
        Dimension::Aggregate(AggregateDimension::new(
            Arc::new(InMemorySeriesStore::new()),
            ConfigSchema::new(),
            &AggregateConfig::default(),
        ))
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [DimensionKind::RealTime, DimensionKind::Aggregate] {
            assert_eq!(kind.to_string().parse::<DimensionKind>(), Ok(kind));
            assert_eq!(kind.definition().id, kind.id());
        }
        assert!("history".parse::<DimensionKind>().is_err());
        assert_eq!(serde_json::to_value(DimensionKind::Aggregate).unwrap(), "agg");
    }

    #[test]
    fn test_real_time_flag_matches_variant() {
        assert!(realtime().is_real_time());
        assert_eq!(realtime().kind(), DimensionKind::RealTime);
        assert!(!aggregate().is_real_time());
        assert_eq!(aggregate().definition().name, "聚合数据");
    }

    #[test]
    fn test_lookup_and_order() {
        let m = Measurement::new(MeasurementDefinition::new("m", "M"), [aggregate(), realtime()]);
        let kinds: Vec<DimensionKind> = m.dimensions().iter().map(Dimension::kind).collect();
        assert_eq!(kinds, vec![DimensionKind::Aggregate, DimensionKind::RealTime]);
        assert!(m.dimension(DimensionKind::RealTime).is_ok());
    }

    #[test]
    fn test_unsupported_dimension() {
        let m = Measurement::new(MeasurementDefinition::new("agg-only", "A"), [aggregate()]);
        let err = m.dimension(DimensionKind::RealTime).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedDimension { ref measurement, kind: DimensionKind::RealTime }
                if measurement == "agg-only"
        ));
        assert!(m.get_value(DimensionKind::RealTime, &ParameterSet::new()).is_err());
    }

    #[test]
    fn test_duplicate_kind_ignored() {
        let m = Measurement::new(MeasurementDefinition::new("m", "M"), [realtime(), realtime()]);
        assert_eq!(m.dimensions().len(), 1);
    }

    #[test]
    fn test_window_resolution() {
        let Dimension::RealTime(d) = realtime() else {
            panic!("expected real-time dimension");
        };
        assert_eq!(d.window(&ParameterSet::new()), Duration::from_secs(1));
        assert_eq!(d.window(&ParameterSet::new().with("interval", "10s")), Duration::from_secs(10));
        assert_eq!(d.window(&ParameterSet::new().with("interval", "1ms")), Duration::from_millis(10));
        assert_eq!(d.window(&ParameterSet::new().with("interval", "x")), Duration::from_secs(1));
    }

    #[test]
    fn test_describe() {
        let descriptor = aggregate().describe();
        assert!(!descriptor.real_time);
        assert_eq!(descriptor.value_type, ValueType::Int);

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["definition"]["id"], "agg");
        assert_eq!(json["value_type"], "int");
    }
}
