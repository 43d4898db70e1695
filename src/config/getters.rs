//! Read-only accessors for `CrawlConfig`.

use std::time::Duration;

use super::types::{CrawlConfig, RendererConfig, RobotsMode};
use crate::detect::Framework;
use crate::limiter::RateRule;

impl CrawlConfig {
    #[must_use]
    pub fn seed_url(&self) -> &str {
        &self.seed_url
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn crawl_id(&self) -> &str {
        &self.crawl_id
    }

    #[must_use]
    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    #[must_use]
    pub fn include_subdomains(&self) -> bool {
        self.include_subdomains
    }

    #[must_use]
    pub fn url_filters_compiled(&self) -> &[regex::Regex] {
        &self.url_filters_compiled
    }

    #[must_use]
    pub fn disallowed_url_filters_compiled(&self) -> &[regex::Regex] {
        &self.disallowed_url_filters_compiled
    }

    #[must_use]
    pub fn max_depth(&self) -> u16 {
        self.max_depth
    }

    #[must_use]
    pub fn async_mode(&self) -> bool {
        self.async_mode
    }

    /// Worker count; always 1 in synchronous mode.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism.max(1)
    }

    #[must_use]
    pub fn rate_rules(&self) -> &[RateRule] {
        &self.rate_rules
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub fn allow_revisit(&self) -> bool {
        self.allow_revisit
    }

    #[must_use]
    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    #[must_use]
    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }

    #[must_use]
    pub fn renderer(&self) -> Option<&RendererConfig> {
        self.renderer.as_ref()
    }

    #[must_use]
    pub fn robots_mode(&self) -> RobotsMode {
        self.robots_mode
    }

    #[must_use]
    pub fn follow_internal_nofollow(&self) -> bool {
        self.follow_internal_nofollow
    }

    #[must_use]
    pub fn follow_external_nofollow(&self) -> bool {
        self.follow_external_nofollow
    }

    #[must_use]
    pub fn respect_meta_noindex(&self) -> bool {
        self.respect_meta_noindex
    }

    #[must_use]
    pub fn respect_header_noindex(&self) -> bool {
        self.respect_header_noindex
    }

    #[must_use]
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    #[must_use]
    pub fn single_page(&self) -> bool {
        self.single_page
    }

    #[must_use]
    pub fn check_external_resources(&self) -> bool {
        self.check_external_resources
    }

    #[must_use]
    pub fn framework_override(&self) -> Option<Framework> {
        self.framework_override
    }
}
