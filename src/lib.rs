//! sitehound: concurrent web crawler core for SEO and link auditing.
//!
//! The crate is built from three tightly coupled subsystems: the
//! [`collector`] (callback fetch engine), the [`crawler`] (queue, scope,
//! and result assembly on top of it), and the [`url_store`] (shared
//! visited/in-flight/redirect/link-graph state). The remaining modules
//! (canonicalization, rate limiting, robots evaluation, framework
//! detection, transport, extraction) serve those three.

pub mod canon;
pub mod collector;
pub mod config;
pub mod crawler;
pub mod detect;
pub mod error;
pub mod events;
pub mod extract;
pub mod limiter;
pub mod robots;
pub mod trace;
pub mod transport;
pub mod url_store;

pub use canon::{CanonicalUrl, RejectReason};
pub use collector::{Collector, Context, FetchOutcome, HtmlElement, Request, Response, XmlElement};
pub use config::{CrawlConfig, CrawlConfigBuilder, RendererConfig, RobotsMode};
pub use crawler::page::{Indexability, PageResult};
pub use crawler::{CrawlState, CrawlSummary, Crawler};
pub use detect::{Framework, FrameworkDetector};
pub use error::{CrawlError, CrawlResult};
pub use events::{CrawlEvent, CrawlEventBus, ProgressSnapshot, ShutdownReason};
pub use extract::schema::{Link, LinkPosition, LinkType, UrlAction};
pub use limiter::{RateLimiter, RateRule};
pub use robots::{RobotsEvaluator, RobotsVerdict};
pub use trace::{LogTracer, NoOpTracer, Tracer};
pub use transport::{
    BrowserRenderer, HttpTransport, ProxySelector, Render, RenderedPage, RoundRobinProxy, RoundTrip,
};
pub use url_store::{ReserveOutcome, StoreStats, UrlStore};

// Callers building their own `Request`s or collectors need the token type.
pub use tokio_util::sync::CancellationToken;
