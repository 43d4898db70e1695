//! Core configuration types for crawl runs.
//!
//! `CrawlConfig` is built once per crawl through the builder in
//! [`super::builder`] and shared read-only across workers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::limiter::RateRule;

/// How robots.txt directives are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RobotsMode {
    /// Disallowed URLs are never fetched.
    Respect,
    /// robots.txt is not consulted at all.
    Ignore,
    /// Disallowed URLs are fetched but their page results carry a flag.
    IgnoreReport,
}

/// Timed load + scroll + settle heuristic for client-side-rendered pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Wait after navigation before the scripted scroll.
    pub initial_wait_ms: u64,
    /// Wait after the scroll completes.
    pub scroll_wait_ms: u64,
    /// Final settle wait before the DOM is serialized.
    pub final_wait_ms: u64,
    pub headless: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            initial_wait_ms: 1_000,
            scroll_wait_ms: 1_500,
            final_wait_ms: 500,
            headless: true,
        }
    }
}

impl RendererConfig {
    /// Deadline for one render: the configured waits plus navigation
    /// headroom. Exceeding it is a renderer timeout, not a plain timeout.
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.initial_wait_ms + self.scroll_wait_ms + self.final_wait_ms)
            + Duration::from_secs(30)
    }
}

/// Main configuration for one crawl.
///
/// **INVARIANT:** `allowed_domains` is never empty after `build()`; the
/// builder seeds it from the seed URL's host when the caller sets nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub(crate) seed_url: String,
    pub(crate) project_id: String,
    pub(crate) crawl_id: String,

    pub(crate) allowed_domains: Vec<String>,
    pub(crate) include_subdomains: bool,
    /// Regex whitelist; when non-empty a URL must match at least one to be
    /// fetched.
    pub(crate) url_filters: Vec<String>,
    /// Regex blacklist; a match drops the URL regardless of the whitelist.
    pub(crate) disallowed_url_filters: Vec<String>,

    /// Compiled from `url_filters` at build time to keep regex compilation
    /// out of the per-link hot path.
    #[serde(skip)]
    pub(crate) url_filters_compiled: Vec<regex::Regex>,
    #[serde(skip)]
    pub(crate) disallowed_url_filters_compiled: Vec<regex::Regex>,

    pub(crate) max_depth: u16,
    pub(crate) async_mode: bool,
    pub(crate) parallelism: usize,
    pub(crate) rate_rules: Vec<RateRule>,

    pub(crate) user_agent: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) allow_revisit: bool,
    pub(crate) proxies: Vec<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) max_redirects: usize,
    pub(crate) max_retries: u8,

    pub(crate) renderer: Option<RendererConfig>,
    pub(crate) robots_mode: RobotsMode,

    /// Follow internal links marked rel=nofollow.
    pub(crate) follow_internal_nofollow: bool,
    pub(crate) follow_external_nofollow: bool,
    pub(crate) respect_meta_noindex: bool,
    pub(crate) respect_header_noindex: bool,

    pub(crate) sitemaps: Vec<String>,
    pub(crate) single_page: bool,
    /// Fetch external resources for a status check instead of only
    /// recording them.
    pub(crate) check_external_resources: bool,

    /// Manually pinned framework, bypassing detection.
    pub(crate) framework_override: Option<crate::detect::Framework>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed_url: String::new(),
            project_id: String::new(),
            crawl_id: String::new(),
            allowed_domains: Vec::new(),
            include_subdomains: false,
            url_filters: Vec::new(),
            disallowed_url_filters: Vec::new(),
            url_filters_compiled: Vec::new(),
            disallowed_url_filters_compiled: Vec::new(),
            max_depth: 3,
            async_mode: true,
            parallelism: 8,
            rate_rules: Vec::new(),
            user_agent: concat!("sitehound/", env!("CARGO_PKG_VERSION")).to_string(),
            headers: Vec::new(),
            allow_revisit: false,
            proxies: Vec::new(),
            request_timeout: Duration::from_secs(30),
            max_redirects: 10,
            max_retries: 2,
            renderer: None,
            robots_mode: RobotsMode::Respect,
            follow_internal_nofollow: true,
            follow_external_nofollow: false,
            respect_meta_noindex: true,
            respect_header_noindex: true,
            sitemaps: Vec::new(),
            single_page: false,
            check_external_resources: false,
            framework_override: None,
        }
    }
}
