//! Broadcast bus carrying [`CrawlEvent`]s to external collaborators.
//!
//! Subscribers are `tokio::sync::broadcast` receivers; slow consumers lag
//! and lose the oldest events rather than stalling the crawl. Publishing
//! to a bus nobody listens to is reported, not fatal.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;

use super::metrics::{EventBusMetrics, MetricsSnapshot};
use super::types::{CrawlEvent, ShutdownReason};

/// Default event buffer size per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventBusError {
    /// Nobody is subscribed; the event was dropped.
    #[error("no active subscribers")]
    NoSubscribers,
    /// The bus already shut down.
    #[error("event bus is shut down")]
    ShutDown,
}

/// Event bus for publishing and subscribing to crawl events.
#[derive(Debug)]
pub struct CrawlEventBus {
    sender: broadcast::Sender<CrawlEvent>,
    metrics: EventBusMetrics,
    shutdown_flag: AtomicBool,
}

impl CrawlEventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            metrics: EventBusMetrics::default(),
            shutdown_flag: AtomicBool::new(false),
        }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Publish one event. Returns the number of subscribers reached.
    pub fn publish(&self, event: CrawlEvent) -> Result<usize, EventBusError> {
        if self.shutdown_flag.load(Ordering::Acquire) {
            self.metrics.record_failed();
            return Err(EventBusError::ShutDown);
        }
        match self.sender.send(event) {
            Ok(reached) => {
                self.metrics.record_published();
                Ok(reached)
            }
            Err(_) => {
                self.metrics.record_failed();
                Err(EventBusError::NoSubscribers)
            }
        }
    }

    /// Publish the terminal `Shutdown` event and refuse further publishes.
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.shutdown_flag.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(target: "sitehound::events", "Event bus shutting down: {reason:?}");
        // Direct send: the flag is already set, so publish() would refuse.
        let _ = self.sender.send(CrawlEvent::shutdown(reason));
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot_with_subscribers(self.subscriber_count())
    }
}

impl Default for CrawlEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
