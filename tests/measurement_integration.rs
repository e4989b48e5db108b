//! End-to-end tests for the device message measurement
//!
//! Covers both dimensions through the public `Measurement` interface:
//! 1. Real-time window counts against the in-process bus
//! 2. Aggregate queries: defaults, filters, limits, ordering
//! 3. Error paths: unsupported dimension, store failure, bus failure
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use measurement_engine::aggregation::{
    AggregationQuery, AggregationRow, InMemorySeriesStore, SeriesPoint, SeriesStore,
};
use measurement_engine::bus::{DeviceMessage, InMemoryMessageBus};
use measurement_engine::error::{BusError, StoreError};
use measurement_engine::{
    device_message_measurement, DimensionKind, EngineConfig, Error, Measurement,
    MeasurementValue, ParameterSet,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const HOUR: i64 = 3_600_000;
// 2024-03-01T00:00:00Z
const DAY_START: i64 = 1_709_251_200_000;

/// Store that answers every query with fixed rows and remembers the query
struct RecordingStore {
    rows: Vec<AggregationRow>,
    last_query: Mutex<Option<AggregationQuery>>,
}

impl RecordingStore {
    fn new(rows: Vec<AggregationRow>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            last_query: Mutex::new(None),
        })
    }

    fn last_query(&self) -> AggregationQuery {
        self.last_query.lock().clone().expect("no query recorded")
    }
}

#[async_trait]
impl SeriesStore for RecordingStore {
    async fn aggregate(&self, query: &AggregationQuery) -> Result<Vec<AggregationRow>, StoreError> {
        *self.last_query.lock() = Some(query.clone());
        Ok(self.rows.clone())
    }
}

fn rows(n: usize) -> Vec<AggregationRow> {
    (0..n)
        .map(|i| {
            AggregationRow::new()
                .with("count", (10 * i) as i64)
                .with("time", format!("03月01日 {:02}时", 23 - i))
        })
        .collect()
}

fn with_store(store: Arc<dyn SeriesStore>) -> (Arc<InMemoryMessageBus>, Measurement) {
    let bus = Arc::new(InMemoryMessageBus::new(1024));
    let measurement = device_message_measurement(bus.clone(), store, &EngineConfig::default());
    (bus, measurement)
}

async fn collect(measurement: &Measurement, params: &ParameterSet) -> Result<Vec<MeasurementValue>, Error> {
    let stream = measurement.get_value(DimensionKind::Aggregate, params)?;
    let items = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .expect("timeout");
    items.into_iter().collect()
}

// ============================================================================
// REAL-TIME DIMENSION
// ============================================================================

/// Five messages in the first second, none in the second
#[tokio::test(start_paused = true)]
async fn test_realtime_five_then_zero() {
    let (bus, measurement) = with_store(Arc::new(InMemorySeriesStore::new()));
    let params = ParameterSet::new().with("interval", "1s");
    let mut values = measurement
        .get_value(DimensionKind::RealTime, &params)
        .expect("real-time dimension");

    for i in 0..5 {
        bus.publish(DeviceMessage::new(format!("/device/product-1/dev-{}/message/report", i)));
    }

    let first = values.next().await.expect("stream ended").expect("window error");
    let second = values.next().await.expect("stream ended").expect("window error");
    assert_eq!(first.value, 5.0);
    assert_eq!(second.value, 0.0);
    assert!(second.timestamp().unwrap() >= first.timestamp().unwrap());
}

/// Default window is one second
#[tokio::test(start_paused = true)]
async fn test_realtime_default_interval() {
    let (bus, measurement) = with_store(Arc::new(InMemorySeriesStore::new()));
    let mut values = measurement
        .get_value(DimensionKind::RealTime, &ParameterSet::new())
        .expect("real-time dimension");

    let start = tokio::time::Instant::now();
    bus.publish(DeviceMessage::new("/device/p/d/online"));
    let first = values.next().await.unwrap().unwrap();

    assert_eq!(first.value, 1.0);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

/// Every message lands in exactly one window
#[tokio::test(start_paused = true)]
async fn test_realtime_no_double_counting() {
    let (bus, measurement) = with_store(Arc::new(InMemorySeriesStore::new()));
    let params = ParameterSet::new().with("interval", "100ms");
    let mut values = measurement.get_value(DimensionKind::RealTime, &params).unwrap();

    let mut published = 0;
    let mut counted = 0.0;
    for window in 0..10 {
        for _ in 0..window {
            bus.publish(DeviceMessage::new("/device/p/d/report"));
            published += 1;
        }
        counted += values.next().await.unwrap().unwrap().value;
    }

    assert_eq!(counted, published as f64);
}

/// Dropping the stream releases the bus subscription
#[tokio::test(start_paused = true)]
async fn test_realtime_cancellation_releases_subscription() {
    let (bus, measurement) = with_store(Arc::new(InMemorySeriesStore::new()));
    let first = measurement.get_value(DimensionKind::RealTime, &ParameterSet::new()).unwrap();
    let second = measurement.get_value(DimensionKind::RealTime, &ParameterSet::new()).unwrap();
    assert_eq!(bus.subscriber_count(), 2);

    drop(first);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(bus.subscriber_count(), 1);

    drop(second);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(bus.subscriber_count(), 0);
}

/// A lagging subscription ends the stream with an error
#[tokio::test(start_paused = true)]
async fn test_realtime_bus_failure_is_terminal() {
    let bus = Arc::new(InMemoryMessageBus::new(4));
    let measurement = device_message_measurement(
        bus.clone(),
        Arc::new(InMemorySeriesStore::new()),
        &EngineConfig::default(),
    );
    let mut values = measurement.get_value(DimensionKind::RealTime, &ParameterSet::new()).unwrap();

    for _ in 0..20 {
        bus.publish(DeviceMessage::new("/device/p/d/report"));
    }

    let err = values.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Subscription(BusError::Lagged(_))));
    assert!(values.next().await.is_none());
}

// ============================================================================
// AGGREGATE DIMENSION
// ============================================================================

/// productId filter, 1h buckets, limit 3, store returns 5 rows
#[tokio::test]
async fn test_aggregate_filter_bucket_limit() {
    let store = RecordingStore::new(rows(5));
    let (_bus, measurement) = with_store(store.clone());

    let params = ParameterSet::new()
        .with("productId", "dev-1")
        .with("time", "1h")
        .with("limit", 3);
    let values = collect(&measurement, &params).await.unwrap();

    let query = store.last_query();
    assert_eq!(query.series, "message-count");
    assert_eq!(query.field, "count");
    assert_eq!(query.filter_value("productId"), Some("dev-1"));
    assert_eq!(query.filter_value("msgType"), None);
    assert_eq!(query.bucket.to_millis(), HOUR);
    assert_eq!(query.limit, 3);

    assert_eq!(values.len(), 3);
    let indexes: Vec<usize> = values.iter().map(|v| v.index.unwrap()).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert_eq!(values[0].label(), Some("03月01日 23时"));
}

/// No from/to resolves to the 24 hours before the call
#[tokio::test]
async fn test_aggregate_default_range() {
    let store = RecordingStore::new(Vec::new());
    let (_bus, measurement) = with_store(store.clone());

    let before = Utc::now().timestamp_millis();
    let values = collect(&measurement, &ParameterSet::new()).await.unwrap();
    let after = Utc::now().timestamp_millis();

    assert!(values.is_empty());
    let query = store.last_query();
    assert!(query.range.from <= query.range.to);
    assert!(before <= query.range.to && query.range.to <= after);
    assert_eq!(query.range.to - query.range.from, 24 * HOUR);
    assert_eq!(query.limit, 1);
    assert_eq!(query.format.pattern(), "MM月dd日 HH时");
}

/// Supplying productId narrows, omitting it does not filter at all
#[tokio::test]
async fn test_aggregate_filter_monotonic() {
    let store = Arc::new(InMemorySeriesStore::new());
    store.record_all([
        SeriesPoint::count("message-count", DAY_START + HOUR, 3.0).tag("productId", "P1"),
        SeriesPoint::count("message-count", DAY_START + HOUR + 1, 4.0).tag("productId", "P2"),
        SeriesPoint::count("message-count", DAY_START + HOUR + 2, 5.0),
    ]);
    let (_bus, measurement) = with_store(store);

    let base = ParameterSet::new()
        .with("from", "2024-03-01 00:00:00")
        .with("to", "2024-03-01 23:59:59");

    let all = collect(&measurement, &base).await.unwrap();
    let only_p1 = collect(&measurement, &base.clone().with("productId", "P1")).await.unwrap();
    let missing = collect(&measurement, &base.clone().with("productId", "P9")).await.unwrap();

    assert_eq!(all[0].value, 12.0);
    assert_eq!(only_p1[0].value, 3.0);
    assert!(missing.is_empty());
}

/// Buckets come back newest first and keep that order
#[tokio::test]
async fn test_aggregate_buckets_from_store() {
    let store = Arc::new(InMemorySeriesStore::new());
    for hour in 0..6 {
        store.record(
            SeriesPoint::count("message-count", DAY_START + hour * HOUR, (hour + 1) as f64)
                .tag("msgType", "report"),
        );
    }
    let (_bus, measurement) = with_store(store);

    let params = ParameterSet::new()
        .with("msgType", "report")
        .with("format", "HH")
        .with("limit", 4)
        .with("from", DAY_START)
        .with("to", DAY_START + 6 * HOUR);
    let values = collect(&measurement, &params).await.unwrap();

    let pairs: Vec<(f64, &str)> = values.iter().map(|v| (v.value, v.label().unwrap())).collect();
    assert_eq!(pairs, vec![(6.0, "05"), (5.0, "04"), (4.0, "03"), (3.0, "02")]);
}

/// Malformed parameters fall back to defaults instead of failing
#[tokio::test]
async fn test_aggregate_malformed_params() {
    let store = RecordingStore::new(rows(2));
    let (_bus, measurement) = with_store(store.clone());

    let params = ParameterSet::from_json(
        r#"{"time": "every hour", "limit": "-3", "from": "not a date", "format": 7}"#,
    )
    .unwrap();
    let values = collect(&measurement, &params).await.unwrap();

    let query = store.last_query();
    assert_eq!(query.bucket.to_millis(), HOUR);
    assert_eq!(query.limit, 1);
    assert_eq!(query.range.to - query.range.from, 24 * HOUR);
    assert_eq!(values.len(), 1);
}

/// A bucket too wide to represent falls back to one hour
#[tokio::test]
async fn test_aggregate_too_wide_bucket_falls_back() {
    let store = Arc::new(InMemorySeriesStore::new());
    store.record_all([
        SeriesPoint::count("message-count", DAY_START + HOUR, 2.0),
        SeriesPoint::count("message-count", DAY_START + 2 * HOUR, 3.0),
    ]);
    let (_bus, measurement) = with_store(store);

    for time in ["4000000000y", "300000000y"] {
        let params = ParameterSet::new()
            .with("time", time)
            .with("format", "HH")
            .with("limit", 10)
            .with("from", DAY_START)
            .with("to", DAY_START + 3 * HOUR);
        let values = collect(&measurement, &params).await.unwrap();

        let counts: Vec<f64> = values.iter().map(|v| v.value).collect();
        assert_eq!(counts, vec![3.0, 2.0]);
    }
}

/// Concurrent calls with different parameters are independent
#[tokio::test]
async fn test_aggregate_concurrent_calls() {
    let store = Arc::new(InMemorySeriesStore::new());
    for product in ["A", "B"] {
        for i in 0..10 {
            store.record(SeriesPoint::count("message-count", DAY_START + i, 1.0).tag("productId", product));
        }
    }
    let (_bus, measurement) = with_store(store.clone());
    let measurement = Arc::new(measurement);

    let mut handles = Vec::new();
    for product in ["A", "B", "A", "B"] {
        let measurement = Arc::clone(&measurement);
        handles.push(tokio::spawn(async move {
            let params = ParameterSet::new()
                .with("productId", product)
                .with("from", DAY_START)
                .with("to", DAY_START + HOUR);
            collect(&measurement, &params).await
        }));
    }

    for handle in handles {
        let values = handle.await.unwrap().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, 10.0);
    }
    assert_eq!(store.stats().queries_executed, 4);
}

// ============================================================================
// ERROR PATHS
// ============================================================================

/// Store failures end the aggregate stream with QueryExecution
#[tokio::test]
async fn test_aggregate_store_failure() {
    let store = Arc::new(InMemorySeriesStore::new());
    store.fail_with(Some(StoreError::Backend("disk on fire".to_string())));
    let (_bus, measurement) = with_store(store);

    let mut values = measurement
        .get_value(DimensionKind::Aggregate, &ParameterSet::new())
        .unwrap();
    let err = values.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::QueryExecution(StoreError::Backend(_))));
    assert!(values.next().await.is_none());
}

/// from after to never reaches the store
#[tokio::test]
async fn test_aggregate_inverted_range() {
    let store = Arc::new(InMemorySeriesStore::new());
    let (_bus, measurement) = with_store(store.clone());

    let params = ParameterSet::new()
        .with("from", "2024-03-02")
        .with("to", "2024-03-01");
    let err = collect(&measurement, &params).await.unwrap_err();

    assert!(matches!(err, Error::InvalidTimeRange { .. }));
    assert_eq!(store.stats().queries_executed + store.stats().queries_failed, 0);
}

/// Asking for a dimension the measurement lacks fails before any work starts
#[tokio::test]
async fn test_unsupported_dimension() {
    let bus = Arc::new(InMemoryMessageBus::default());
    let full = device_message_measurement(bus.clone(), Arc::new(InMemorySeriesStore::new()), &EngineConfig::default());

    let agg = full.dimension(DimensionKind::Aggregate).unwrap().clone();
    let agg_only = Measurement::new(full.definition().clone(), [agg]);

    let err = agg_only
        .get_value(DimensionKind::RealTime, &ParameterSet::new())
        .err()
        .expect("real-time should be unsupported");
    assert!(matches!(err, Error::UnsupportedDimension { kind: DimensionKind::RealTime, .. }));
    assert_eq!(bus.subscriber_count(), 0);
}
