//! Error types for the measurement engine

use thiserror::Error;

use crate::measurement::DimensionKind;

/// Main error type for the measurement engine
#[derive(Error, Debug)]
pub enum Error {
    /// The measurement does not expose the requested dimension
    #[error("Measurement '{measurement}' has no {kind} dimension")]
    UnsupportedDimension {
        /// Key of the measurement that was asked
        measurement: String,
        /// The dimension kind that was requested
        kind: DimensionKind,
    },

    /// Message bus subscription failed or was closed
    #[error("Subscription error: {0}")]
    Subscription(#[from] BusError),

    /// Series store aggregation failed
    #[error("Query execution error: {0}")]
    QueryExecution(#[from] StoreError),

    /// Resolved date range is inverted
    #[error("Invalid time range: from {from} > to {to}")]
    InvalidTimeRange {
        /// Resolved start, epoch millis
        from: i64,
        /// Resolved end, epoch millis
        to: i64,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message bus errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Subscription could not be established
    #[error("Subscribe to '{pattern}' failed: {reason}")]
    SubscribeFailed {
        /// Topic pattern that was requested
        pattern: String,
        /// Backend supplied reason
        reason: String,
    },

    /// The bus closed the subscription
    #[error("Subscription closed")]
    Closed,

    /// The subscriber fell behind and messages were discarded
    #[error("Subscriber lagged, {0} messages skipped")]
    Lagged(u64),
}

/// Series store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend failure while executing the aggregation
    #[error("Backend error: {0}")]
    Backend(String),

    /// The store rejected the query
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// The store gave up waiting for the backend
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_dimension_display() {
        let err = Error::UnsupportedDimension {
            measurement: "quantity".to_string(),
            kind: DimensionKind::RealTime,
        };
        let display = err.to_string();
        assert!(display.contains("quantity"));
        assert!(display.contains("realTime"));
    }

    #[test]
    fn test_collaborator_errors_convert() {
        let err: Error = BusError::Closed.into();
        assert!(matches!(err, Error::Subscription(BusError::Closed)));

        let err: Error = StoreError::Timeout(500).into();
        assert!(err.to_string().contains("500ms"));
    }
}
