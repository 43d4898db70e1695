//! Error types for crawl operations.
//!
//! Every failure a request can hit is classified into one `CrawlError` kind.
//! The kind decides retry eligibility and how the failure is surfaced in the
//! page result.

use thiserror::Error;

/// Terminal and transient failure kinds for a single request.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The reference could not be canonicalized into a crawlable URL.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Dropped by allowed-domain, URL-filter, or depth constraints.
    #[error("URL outside crawl scope: {0}")]
    DisallowedByScope(String),

    /// Blocked by robots.txt in respect mode.
    #[error("disallowed by robots.txt: {0}")]
    DisallowedByRobots(String),

    /// Suppressed by a framework filter rule.
    #[error("suppressed by framework filter: {0}")]
    DisallowedByFilter(String),

    /// DNS, connect, TLS, or reset failure.
    #[error("network error: {0}")]
    Network(String),

    /// Request or body-transfer deadline exceeded.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Terminal HTTP status (4xx, or 5xx past the retry budget).
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Headless renderer failed to produce a document.
    #[error("renderer error: {0}")]
    Renderer(String),

    /// The renderer did not settle within its deadline. Distinct from
    /// `Timeout` so callers can tell a slow server from a slow page.
    #[error("renderer timed out after {waited_ms}ms on {url}")]
    RendererTimeout { url: String, waited_ms: u64 },

    /// A user callback panicked. The worker survives; the request fails.
    #[error("callback panicked: {0}")]
    Callback(String),

    /// The crawl was cancelled before this request produced a response.
    #[error("crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    /// Whether the retry policy may re-enqueue the request for this kind.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Classify a transport-level reqwest failure.
    pub(crate) fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{url}: {err}"))
        } else {
            Self::Network(format!("{url}: {err}"))
        }
    }
}

/// Convenience alias used throughout the crate.
pub type CrawlResult<T> = Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(CrawlError::Network("reset".into()).is_retryable());
        assert!(CrawlError::Timeout("30s".into()).is_retryable());
        assert!(
            CrawlError::Http {
                status: 503,
                url: "http://a/".into()
            }
            .is_retryable()
        );
        assert!(
            !CrawlError::Http {
                status: 404,
                url: "http://a/".into()
            }
            .is_retryable()
        );
        assert!(!CrawlError::Cancelled.is_retryable());
        assert!(
            !CrawlError::RendererTimeout {
                url: "http://a/".into(),
                waited_ms: 4000
            }
            .is_retryable()
        );
    }
}
