//! Crawl event stream for external collaborators.
//!
//! The crawler publishes lifecycle events here; persistence layers, UIs,
//! and progress reporters subscribe without touching crawl internals.

pub mod bus;
pub mod metrics;
pub mod types;

pub use bus::{CrawlEventBus, DEFAULT_CAPACITY, EventBusError};
pub use metrics::{EventBusMetrics, MetricsSnapshot};
pub use types::{CrawlEvent, ProgressSnapshot, ShutdownReason};
