//! In-process message bus
//!
//! Fans published messages out to every live subscription through a tokio
//! broadcast channel; each subscription filters by its own topic pattern.
//!
//! # Usage
//!
//! ```rust
//! use measurement_engine::bus::{DeviceMessage, InMemoryMessageBus, MessageBus};
//!
//! let bus = InMemoryMessageBus::new(256);
//! let _sub = bus.subscribe("/device/**").unwrap();
//! assert_eq!(bus.subscriber_count(), 1);
//!
//! bus.publish(DeviceMessage::new("/device/p1/d1/online"));
//! assert_eq!(bus.stats().messages_published, 1);
//! ```

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::{DeviceMessage, MessageBus, MessageStream, TopicPattern};
use crate::error::BusError;

/// Broadcast-backed message bus for a single process
pub struct InMemoryMessageBus {
    /// `None` once the bus is closed
    sender: RwLock<Option<broadcast::Sender<DeviceMessage>>>,

    /// Statistics
    stats: BusStats,
}

#[derive(Debug, Default)]
struct BusStats {
    subscriptions_created: AtomicU64,
    messages_published: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Snapshot of bus statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusStatsSnapshot {
    /// Total subscriptions opened
    pub subscriptions_created: u64,
    /// Messages handed to at least one subscriber
    pub messages_published: u64,
    /// Messages published while nobody was listening
    pub messages_dropped: u64,
    /// Subscriptions currently open
    pub active_subscriptions: u64,
}

impl InMemoryMessageBus {
    /// Create a bus whose subscribers may fall `buffer_size` messages behind
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self {
            sender: RwLock::new(Some(sender)),
            stats: BusStats::default(),
        }
    }

    /// Publish a message, returning how many subscriptions received it
    ///
    /// Subscriptions whose pattern does not match still receive the message
    /// internally and discard it.
    pub fn publish(&self, message: DeviceMessage) -> usize {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            return 0;
        };

        match sender.send(message) {
            Ok(count) => {
                self.stats
                    .messages_published
                    .fetch_add(1, Ordering::Relaxed);
                count
            },
            Err(_) => {
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                0
            },
        }
    }

    /// Close the bus; open subscriptions end with [`BusError::Closed`]
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            info!("Message bus closed");
        }
    }

    /// Subscriptions currently open
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> BusStatsSnapshot {
        BusStatsSnapshot {
            subscriptions_created: self.stats.subscriptions_created.load(Ordering::Relaxed),
            messages_published: self.stats.messages_published.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_subscriptions: self.subscriber_count() as u64,
        }
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MessageBus for InMemoryMessageBus {
    fn subscribe(&self, pattern: &str) -> Result<MessageStream, BusError> {
        let receiver = self
            .sender
            .read()
            .as_ref()
            .map(|s| s.subscribe())
            .ok_or_else(|| BusError::SubscribeFailed {
                pattern: pattern.to_string(),
                reason: "bus is closed".to_string(),
            })?;

        self.stats
            .subscriptions_created
            .fetch_add(1, Ordering::Relaxed);
        debug!(pattern, "Bus subscription opened");

        let pattern = TopicPattern::new(pattern);
        let stream = stream::unfold(Some(receiver), move |state| {
            let pattern = pattern.clone();
            async move {
                let mut receiver = state?;
                loop {
                    match receiver.recv().await {
                        Ok(message) if pattern.matches(&message.topic) => {
                            return Some((Ok(message), Some(receiver)));
                        },
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Bus subscriber lagged");
                            return Some((Err(BusError::Lagged(skipped)), None));
                        },
                        Err(RecvError::Closed) => {
                            return Some((Err(BusError::Closed), None));
                        },
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
