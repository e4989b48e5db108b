//! Message bus boundary
//!
//! The real-time dimension consumes raw device messages from a publish/subscribe
//! transport. This module defines the transport seam ([`MessageBus`]), the
//! message shape, and topic pattern matching. [`memory::InMemoryMessageBus`] is a
//! process-local implementation built on tokio broadcast channels.
//!
//! # Topic patterns
//!
//! Topics are `/`-separated paths such as `/device/product-1/dev-7/online`.
//! A pattern segment `*` matches exactly one topic segment and `**` matches any
//! number of remaining segments, so `/device/**` selects every device-originated
//! message.

pub mod memory;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BusError;

pub use memory::{BusStatsSnapshot, InMemoryMessageBus};

/// Topic pattern matching every device-originated message
pub const DEVICE_TOPIC_PATTERN: &str = "/device/**";

/// Unbounded stream of messages delivered by a subscription
///
/// Dropping the stream releases the underlying subscription.
pub type MessageStream = BoxStream<'static, Result<DeviceMessage, BusError>>;

/// Publish/subscribe transport for device messages
pub trait MessageBus: Send + Sync + 'static {
    /// Open a subscription for every topic matching `pattern`
    ///
    /// The subscription is live as soon as this returns; messages published
    /// afterwards are delivered in publish order.
    fn subscribe(&self, pattern: &str) -> Result<MessageStream, BusError>;
}

/// A raw message originating from a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    /// Topic the message was published on
    pub topic: String,
    /// Arbitrary message body
    #[serde(default)]
    pub payload: Value,
    /// Publish time, epoch millis
    pub timestamp: i64,
}

impl DeviceMessage {
    /// Create a message with an empty payload stamped with the current time
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: Value::Null,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach a payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Compiled topic pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    segments: Vec<String>,
}

impl TopicPattern {
    /// Compile a pattern such as `/device/*/online` or `/device/**`
    pub fn new(pattern: &str) -> Self {
        Self {
            segments: split_topic(pattern).map(str::to_string).collect(),
        }
    }

    /// Whether `topic` is selected by this pattern
    pub fn matches(&self, topic: &str) -> bool {
        let topic: Vec<&str> = split_topic(topic).collect();
        match_segments(&self.segments, &topic)
    }
}

fn split_topic(topic: &str) -> impl Iterator<Item = &str> {
    topic.split('/').filter(|s| !s.is_empty())
}

fn match_segments(pattern: &[String], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((head, _)) if head == "**" => true,
        Some((head, rest)) => match topic.split_first() {
            Some((segment, topic_rest)) => {
                (head == "*" || head == segment) && match_segments(rest, topic_rest)
            },
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_wildcard() {
        let pattern = TopicPattern::new(DEVICE_TOPIC_PATTERN);
        assert!(pattern.matches("/device/p1/d1/online"));
        assert!(pattern.matches("/device/p1/d1/message/event/alarm"));
        assert!(pattern.matches("/device"));
        assert!(!pattern.matches("/dashboard/refresh"));
        assert!(!pattern.matches("/devices/p1"));
    }

    #[test]
    fn test_single_wildcard() {
        let pattern = TopicPattern::new("/device/*/online");
        assert!(pattern.matches("/device/d1/online"));
        assert!(!pattern.matches("/device/d1/offline"));
        assert!(!pattern.matches("/device/p1/d1/online"));
    }

    #[test]
    fn test_exact_topic() {
        let pattern = TopicPattern::new("/device/d1/online");
        assert!(pattern.matches("device/d1/online"));
        assert!(!pattern.matches("/device/d1"));
        assert!(!pattern.matches("/device/d1/online/extra"));
    }
}
