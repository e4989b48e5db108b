//! Device message volume
//!
//! The `quantity` measurement counts messages sent by devices. Its real-time
//! dimension counts every message on the device topics per window; its
//! aggregate dimension sums the stored `message-count` series per time bucket,
//! optionally narrowed to one product or message type.

use std::sync::Arc;

use super::{AggregateDimension, Dimension, Measurement, MeasurementDefinition, RealTimeDimension};
use crate::aggregation::SeriesStore;
use crate::bus::MessageBus;
use crate::config::EngineConfig;
use crate::params::{ConfigSchema, ParamFormat};
use crate::realtime::WindowCounter;
use crate::types::ValueType;

/// Key of the device message measurement
pub const MEASUREMENT_ID: &str = "quantity";

/// Display name of the device message measurement
pub const MEASUREMENT_NAME: &str = "设备消息量";

/// Parameters of the real-time dimension
pub fn realtime_schema() -> ConfigSchema {
    ConfigSchema::new().add_formatted("interval", "数据统计周期", "例如: 1s,10s", ParamFormat::Duration)
}

/// Parameters of the aggregate dimension
pub fn aggregate_schema() -> ConfigSchema {
    ConfigSchema::new()
        .add("productId", "设备型号", "", ValueType::String)
        .add_formatted("time", "周期", "例如: 1h,10m,30s", ParamFormat::Interval)
        .add("format", "时间格式", "如: MM-dd:HH", ValueType::String)
        .add("msgType", "消息类型", "", ValueType::String)
        .add("limit", "最大数据量", "", ValueType::Int)
        .add("from", "时间从", "", ValueType::DateTime)
        .add("to", "时间至", "", ValueType::DateTime)
}

/// Build the device message measurement against its collaborators
///
/// Registers the real-time dimension first, then the aggregate one.
pub fn device_message_measurement(
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn SeriesStore>,
    config: &EngineConfig,
) -> Measurement {
    let counter = WindowCounter::new(bus, config.realtime.topic_pattern.clone());

    Measurement::new(
        MeasurementDefinition::new(MEASUREMENT_ID, MEASUREMENT_NAME),
        [
            Dimension::RealTime(RealTimeDimension::new(
                counter,
                realtime_schema(),
                &config.realtime,
            )),
            Dimension::Aggregate(AggregateDimension::new(
                store,
                aggregate_schema(),
                &config.aggregate,
            )),
        ],
    )
}
