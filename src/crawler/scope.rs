//! Crawl scope: allowed domains, URL filter regexes, and depth.

use regex::Regex;

use crate::canon::CanonicalUrl;
use crate::config::CrawlConfig;

/// Why a URL fell outside the crawl scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRejection {
    HostNotAllowed,
    FilteredOut,
    Disallowed,
    TooDeep,
}

/// Compiled scope constraints, cheap to consult per candidate link.
pub struct Scope {
    allowed_domains: Vec<String>,
    include_subdomains: bool,
    filters: Vec<Regex>,
    disallowed: Vec<Regex>,
    max_depth: u16,
}

impl Scope {
    #[must_use]
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            allowed_domains: config.allowed_domains().to_vec(),
            include_subdomains: config.include_subdomains(),
            filters: config.url_filters_compiled().to_vec(),
            disallowed: config.disallowed_url_filters_compiled().to_vec(),
            max_depth: config.max_depth(),
        }
    }

    /// Host membership against the allowed-domain list, optionally
    /// extended to subdomains.
    #[must_use]
    pub fn host_allowed(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.allowed_domains.iter().any(|domain| {
            host == *domain
                || (self.include_subdomains && host.ends_with(&format!(".{domain}")))
        })
    }

    /// Whitelist/blacklist regex verdict on the full URL string.
    #[must_use]
    pub fn url_allowed(&self, url: &str) -> bool {
        if self.disallowed.iter().any(|re| re.is_match(url)) {
            return false;
        }
        if self.filters.is_empty() {
            return true;
        }
        self.filters.iter().any(|re| re.is_match(url))
    }

    #[must_use]
    pub fn depth_allowed(&self, depth: u16) -> bool {
        depth <= self.max_depth
    }

    #[must_use]
    pub fn max_depth(&self) -> u16 {
        self.max_depth
    }

    /// Full scope check for a candidate at `depth`.
    pub fn check(&self, url: &CanonicalUrl, depth: u16) -> Result<(), ScopeRejection> {
        if !self.depth_allowed(depth) {
            return Err(ScopeRejection::TooDeep);
        }
        if !self.host_allowed(url.host()) {
            return Err(ScopeRejection::HostNotAllowed);
        }
        if self.disallowed.iter().any(|re| re.is_match(url.as_str())) {
            return Err(ScopeRejection::Disallowed);
        }
        if !self.filters.is_empty() && !self.filters.iter().any(|re| re.is_match(url.as_str())) {
            return Err(ScopeRejection::FilteredOut);
        }
        Ok(())
    }
}
