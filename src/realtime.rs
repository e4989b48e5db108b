//! Real-time window counter
//!
//! Turns an unbounded message subscription into an unbounded sequence of
//! per-window message counts.
//!
//! # Architecture
//!
//! ```text
//! MessageBus ──subscribe("/device/**")──► driver task ──bounded mpsc──► MeasurementStream
//!                                          │
//!                                          ├─ message  → count += 1
//!                                          ├─ tick     → emit (count, now), count = 0
//!                                          └─ consumer gone → drop subscription, exit
//! ```
//!
//! Each call opens its own bus subscription and its own window schedule,
//! aligned to the moment of the call. Windows are closed by the timer alone,
//! so a window without messages still emits `0`. One task owns the counter,
//! which keeps every message attributed to exactly one window no matter how
//! many publishers are active.
//!
//! At most [`PENDING_WINDOWS`] values wait for a consumer that stops polling.
//! The driver then blocks on the send and stops draining the subscription, so
//! a stalled consumer ends up with the bus's own lag error instead of an
//! ever-growing queue.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};

use crate::bus::{MessageBus, MessageStream};
use crate::error::{BusError, Error, Result};
use crate::types::{MeasurementStream, MeasurementValue};

const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Window values buffered for a consumer before the driver waits on it
pub const PENDING_WINDOWS: usize = 16;

/// Counts bus messages per fixed time window
#[derive(Clone)]
pub struct WindowCounter {
    bus: Arc<dyn MessageBus>,
    topic_pattern: String,
}

impl WindowCounter {
    /// Count messages matching `topic_pattern` on `bus`
    pub fn new(bus: Arc<dyn MessageBus>, topic_pattern: impl Into<String>) -> Self {
        Self {
            bus,
            topic_pattern: topic_pattern.into(),
        }
    }

    /// Topic pattern this counter subscribes to
    pub fn topic_pattern(&self) -> &str {
        &self.topic_pattern
    }

    /// Start counting with windows of `window` length
    ///
    /// Must be called from within a tokio runtime; the window schedule runs on
    /// a task of that runtime. If the subscription cannot be opened, or no
    /// runtime is available, the returned stream yields a single error.
    /// Windows shorter than a millisecond are widened to one.
    pub fn count(&self, window: Duration) -> MeasurementStream {
        let window = window.max(MIN_WINDOW);
        let messages = match self.bus.subscribe(&self.topic_pattern) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(pattern = %self.topic_pattern, error = %e, "Real-time subscription failed");
                return stream::once(async move { Err::<MeasurementValue, _>(Error::Subscription(e)) })
                    .boxed();
            },
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                return stream::once(async {
                    Err::<MeasurementValue, _>(Error::Configuration(
                        "real-time counting requires a tokio runtime".to_string(),
                    ))
                })
                .boxed();
            },
        };

        let (tx, rx) = mpsc::channel(PENDING_WINDOWS);
        let start = Instant::now();
        handle.spawn(drive_windows(messages, window, start, tx));

        debug!(
            pattern = %self.topic_pattern,
            window_ms = window.as_millis() as u64,
            "Real-time window counting started"
        );

        stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })
        .boxed()
    }
}

impl std::fmt::Debug for WindowCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowCounter")
            .field("topic_pattern", &self.topic_pattern)
            .finish()
    }
}

/// Owns one subscription and one window schedule until the consumer goes away
/// or the subscription fails.
async fn drive_windows(
    mut messages: MessageStream,
    window: Duration,
    start: Instant,
    tx: mpsc::Sender<Result<MeasurementValue>>,
) {
    let mut ticker = interval_at(start + window, window);
    let mut count: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = tx.closed() => {
                debug!("Real-time consumer dropped, releasing subscription");
                break;
            }

            _ = ticker.tick() => {
                let value = MeasurementValue::at(
                    count as f64,
                    chrono::Utc::now().timestamp_millis(),
                );
                debug!(count, "Window closed");
                count = 0;
                if tx.send(Ok(value)).await.is_err() {
                    break;
                }
            }

            message = messages.next() => {
                match message {
                    Some(Ok(_)) => count += 1,
                    Some(Err(e)) => {
                        warn!(error = %e, "Real-time subscription failed");
                        let _ = tx.send(Err(Error::Subscription(e))).await;
                        break;
                    },
                    None => {
                        warn!("Real-time subscription ended");
                        let _ = tx.send(Err(Error::Subscription(BusError::Closed))).await;
                        break;
                    },
                }
            }
        }
    }
}
