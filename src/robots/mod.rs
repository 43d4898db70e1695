//! robots.txt evaluation with lazy per-host caching.
//!
//! The first URL checked against a host triggers one fetch of that host's
//! robots.txt; the parsed body is cached for the rest of the crawl. A
//! missing or unfetchable robots.txt allows everything.

use dashmap::DashMap;
use log::{debug, warn};
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use url::Url;

use crate::config::RobotsMode;

/// Outcome of checking one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsVerdict {
    Allowed,
    /// Disallowed and the mode says not to fetch.
    Disallowed,
    /// Disallowed, but the mode is `ignore-report`: fetch anyway and flag
    /// the page result.
    FetchedButFlagged,
}

struct HostRecord {
    /// `None` when robots.txt was missing or unfetchable: allow all.
    body: Option<String>,
    sitemaps: Vec<String>,
}

/// Lazy per-host robots.txt evaluator shared by all workers of a crawl.
pub struct RobotsEvaluator {
    client: reqwest::Client,
    user_agent: String,
    mode: RobotsMode,
    cache: DashMap<String, Arc<HostRecord>>,
}

impl RobotsEvaluator {
    /// `client` should carry the crawl's user agent and timeout; robots
    /// fetches bypass proxy rotation and the rate limiter.
    #[must_use]
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>, mode: RobotsMode) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            mode,
            cache: DashMap::new(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> RobotsMode {
        self.mode
    }

    /// Check whether `url` may be fetched under the configured mode.
    pub async fn check(&self, url: &Url) -> RobotsVerdict {
        if self.mode == RobotsMode::Ignore {
            return RobotsVerdict::Allowed;
        }
        let record = self.record_for(url).await;
        let Some(body) = &record.body else {
            return RobotsVerdict::Allowed;
        };

        let mut matcher = DefaultMatcher::default();
        if matcher.one_agent_allowed_by_robots(body, &self.user_agent, url.as_str()) {
            RobotsVerdict::Allowed
        } else {
            match self.mode {
                RobotsMode::Respect => RobotsVerdict::Disallowed,
                RobotsMode::IgnoreReport => RobotsVerdict::FetchedButFlagged,
                RobotsMode::Ignore => RobotsVerdict::Allowed,
            }
        }
    }

    /// `Sitemap:` directives found in the host's robots.txt. Triggers the
    /// lazy fetch when the host wasn't seen yet.
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        self.record_for(url).await.sitemaps.clone()
    }

    async fn record_for(&self, url: &Url) -> Arc<HostRecord> {
        let key = host_key(url);
        if let Some(cached) = self.cache.get(&key) {
            return Arc::clone(&cached);
        }

        let record = Arc::new(self.fetch_record(url).await);
        // Two workers may race on the first check for a host; the first
        // insert wins and both fetches produce the same record.
        self.cache.entry(key).or_insert_with(|| Arc::clone(&record));
        record
    }

    async fn fetch_record(&self, url: &Url) -> HostRecord {
        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        debug!(target: "sitehound::robots", "Fetching {robots_url}");
        let body = match self.client.get(robots_url.as_str()).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(
                        target: "sitehound::robots",
                        "Failed reading robots.txt body for {}: {e}",
                        host_key(url)
                    );
                    None
                }
            },
            Ok(response) => {
                debug!(
                    target: "sitehound::robots",
                    "robots.txt for {} returned {}, allowing all",
                    host_key(url),
                    response.status()
                );
                None
            }
            Err(e) => {
                warn!(
                    target: "sitehound::robots",
                    "robots.txt fetch failed for {}: {e}, allowing all",
                    host_key(url)
                );
                None
            }
        };

        let sitemaps = body.as_deref().map(extract_sitemaps).unwrap_or_default();
        HostRecord { body, sitemaps }
    }
}

fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Pull `Sitemap:` directives out of a robots.txt body. The directive is
/// global, not tied to a user-agent group.
fn extract_sitemaps(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("sitemap") {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            } else {
                None
            }
        })
        .collect()
}
