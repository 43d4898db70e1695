//! Configuration for crawl runs.
//!
//! Provides `CrawlConfig` and its type-safe builder with validation and
//! sensible defaults.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::{CrawlConfigBuilder, WithSeedUrl};
pub use types::{CrawlConfig, RendererConfig, RobotsMode};
