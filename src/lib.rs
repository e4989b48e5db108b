//! Measurement Engine - one metric, two ways of computing it
//!
//! This library lets a dashboard ask for a named metric either as a live
//! stream or as a historical, time-bucketed aggregation:
//! - Real-time dimension: per-window message counts from a message bus
//! - Aggregate dimension: bucketed sums over a stored series
//! - One parameter-driven interface and one value stream type for both
//! - Per-dimension config schemas for introspection and validation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Typed, defaulting parameter sets and per-dimension config schemas
pub mod params;

/// Message bus boundary and in-process bus
pub mod bus;

/// Per-window counting of live bus messages
pub mod realtime;

/// Aggregation query building, series store boundary and result sequencing
pub mod aggregation;

/// Measurements, dimensions and the device message measurement
pub mod measurement;

// Re-export main types
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use measurement::{
    device_message_measurement, Dimension, DimensionKind, Measurement, MeasurementDefinition,
};
pub use params::ParameterSet;
pub use types::{MeasurementStream, MeasurementValue, TimeRange};
