//! Type-safe builder for `CrawlConfig`.
//!
//! The typestate parameter guarantees at compile time that a seed URL was
//! provided before `build()` exists; everything else has a default.

use anyhow::{Result, anyhow};
use regex::Regex;
use std::marker::PhantomData;
use std::time::Duration;
use url::Url;

use super::types::{CrawlConfig, RendererConfig, RobotsMode};
use crate::detect::Framework;
use crate::limiter::RateRule;

// Type states for the builder.
pub struct WithSeedUrl;

pub struct CrawlConfigBuilder<State = ()> {
    config: CrawlConfig,
    _phantom: PhantomData<State>,
}

impl Default for CrawlConfigBuilder<()> {
    fn default() -> Self {
        Self {
            config: CrawlConfig::default(),
            _phantom: PhantomData,
        }
    }
}

impl CrawlConfig {
    /// Create a builder for configuring a crawl with a fluent interface.
    #[must_use]
    pub fn builder() -> CrawlConfigBuilder<()> {
        CrawlConfigBuilder::default()
    }
}

impl CrawlConfigBuilder<()> {
    /// The URL the crawl starts from. Required.
    pub fn seed_url(mut self, url: impl Into<String>) -> CrawlConfigBuilder<WithSeedUrl> {
        self.config.seed_url = url.into();
        CrawlConfigBuilder {
            config: self.config,
            _phantom: PhantomData,
        }
    }
}

impl<State> CrawlConfigBuilder<State> {
    #[must_use]
    pub fn project_id(mut self, id: impl Into<String>) -> Self {
        self.config.project_id = id.into();
        self
    }

    #[must_use]
    pub fn crawl_id(mut self, id: impl Into<String>) -> Self {
        self.config.crawl_id = id.into();
        self
    }

    /// Hosts the crawl may fetch from. Defaults to the seed URL's host.
    #[must_use]
    pub fn allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.config.allowed_domains = domains;
        self
    }

    #[must_use]
    pub fn include_subdomains(mut self, include: bool) -> Self {
        self.config.include_subdomains = include;
        self
    }

    /// Regex whitelist applied to candidate URLs.
    #[must_use]
    pub fn url_filters(mut self, patterns: Vec<String>) -> Self {
        self.config.url_filters = patterns;
        self
    }

    /// Regex blacklist applied to candidate URLs.
    #[must_use]
    pub fn disallowed_url_filters(mut self, patterns: Vec<String>) -> Self {
        self.config.disallowed_url_filters = patterns;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: u16) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// `false` forces a single worker (synchronous mode). Delays still
    /// apply.
    #[must_use]
    pub fn async_mode(mut self, enabled: bool) -> Self {
        self.config.async_mode = enabled;
        self
    }

    #[must_use]
    pub fn parallelism(mut self, workers: usize) -> Self {
        self.config.parallelism = workers.max(1);
        self
    }

    #[must_use]
    pub fn rate_rules(mut self, rules: Vec<RateRule>) -> Self {
        self.config.rate_rules = rules;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Extra headers sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn allow_revisit(mut self, allow: bool) -> Self {
        self.config.allow_revisit = allow;
        self
    }

    /// Proxy URLs rotated round-robin across requests.
    #[must_use]
    pub fn proxies(mut self, proxies: Vec<String>) -> Self {
        self.config.proxies = proxies;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, cap: usize) -> Self {
        self.config.max_redirects = cap;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u8) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Enable the headless renderer for pages that need client-side JS.
    #[must_use]
    pub fn renderer(mut self, renderer: RendererConfig) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn robots_mode(mut self, mode: RobotsMode) -> Self {
        self.config.robots_mode = mode;
        self
    }

    #[must_use]
    pub fn follow_internal_nofollow(mut self, follow: bool) -> Self {
        self.config.follow_internal_nofollow = follow;
        self
    }

    #[must_use]
    pub fn follow_external_nofollow(mut self, follow: bool) -> Self {
        self.config.follow_external_nofollow = follow;
        self
    }

    #[must_use]
    pub fn respect_meta_noindex(mut self, respect: bool) -> Self {
        self.config.respect_meta_noindex = respect;
        self
    }

    #[must_use]
    pub fn respect_header_noindex(mut self, respect: bool) -> Self {
        self.config.respect_header_noindex = respect;
        self
    }

    /// Additional sitemap URLs beyond those discovered via robots.txt.
    #[must_use]
    pub fn sitemaps(mut self, sitemaps: Vec<String>) -> Self {
        self.config.sitemaps = sitemaps;
        self
    }

    #[must_use]
    pub fn single_page(mut self, single: bool) -> Self {
        self.config.single_page = single;
        self
    }

    #[must_use]
    pub fn check_external_resources(mut self, check: bool) -> Self {
        self.config.check_external_resources = check;
        self
    }

    /// Pin the framework instead of detecting it from the first HTML
    /// response.
    #[must_use]
    pub fn framework_override(mut self, framework: Framework) -> Self {
        self.config.framework_override = Some(framework);
        self
    }
}

impl CrawlConfigBuilder<WithSeedUrl> {
    /// Validate and finalize the configuration.
    ///
    /// Compiles the URL filter regexes, verifies the seed and proxy URLs
    /// parse, and seeds `allowed_domains` from the seed host when the
    /// caller set none.
    pub fn build(mut self) -> Result<CrawlConfig> {
        let seed = Url::parse(&self.config.seed_url)
            .map_err(|e| anyhow!("Invalid seed URL '{}': {e}", self.config.seed_url))?;
        let host = seed
            .host_str()
            .ok_or_else(|| anyhow!("Seed URL '{}' has no host", self.config.seed_url))?;

        if self.config.allowed_domains.is_empty() {
            self.config.allowed_domains.push(host.to_ascii_lowercase());
        } else {
            for domain in &mut self.config.allowed_domains {
                *domain = domain.to_ascii_lowercase();
            }
        }

        for proxy in &self.config.proxies {
            Url::parse(proxy).map_err(|e| anyhow!("Invalid proxy URL '{proxy}': {e}"))?;
        }

        self.config.url_filters_compiled = compile_patterns(&self.config.url_filters)?;
        self.config.disallowed_url_filters_compiled =
            compile_patterns(&self.config.disallowed_url_filters)?;

        if !self.config.async_mode {
            self.config.parallelism = 1;
        }

        Ok(self.config)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| anyhow!("Invalid URL filter '{p}': {e}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_seeds_allowed_domains_from_seed_host() {
        let config = CrawlConfig::builder()
            .seed_url("https://Example.com/start")
            .build()
            .unwrap();
        assert_eq!(config.allowed_domains, vec!["example.com".to_string()]);
    }

    #[test]
    fn build_rejects_bad_seed() {
        assert!(CrawlConfig::builder().seed_url("not a url").build().is_err());
    }

    #[test]
    fn build_rejects_bad_filter_regex() {
        let result = CrawlConfig::builder()
            .seed_url("https://example.com/")
            .url_filters(vec!["(".to_string()])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn sync_mode_forces_single_worker() {
        let config = CrawlConfig::builder()
            .seed_url("https://example.com/")
            .parallelism(16)
            .async_mode(false)
            .build()
            .unwrap();
        assert_eq!(config.parallelism, 1);
    }
}
