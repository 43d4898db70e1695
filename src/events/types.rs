//! Event type definitions for the crawl event stream.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::crawler::page::PageResult;

/// Reason the event bus shut down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShutdownReason {
    /// Crawl reached Done.
    CrawlCompleted,
    /// Crawl was cancelled cooperatively.
    Cancelled,
    /// Crawl aborted with an error.
    Error(String),
}

/// Periodic crawl counters delivered with `Progress` events and available
/// on demand from the crawler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub project_id: String,
    pub crawl_id: String,
    /// Primary allowed domain.
    pub domain: String,
    pub seed_url: String,
    /// Terminal results with an HTML content type.
    pub pages_crawled: usize,
    /// Terminal results of any MIME type.
    pub total_urls_crawled: usize,
    pub total_discovered: usize,
    /// First-seen discovery order, truncated to a transport-friendly size.
    pub discovered_urls: Vec<String>,
    pub is_crawling: bool,
}

/// Events emitted over the bus while a crawl runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrawlEvent {
    /// A crawl session started.
    Started {
        crawl_id: String,
        seed_url: String,
        max_depth: u16,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A request is about to hit the transport.
    Request {
        url: String,
        depth: u16,
        retry: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A terminal response arrived (one per URL; redirect hops excluded).
    Response {
        url: String,
        status: u16,
        content_type: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A full page result was assembled.
    Page {
        result: PageResult,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A URL failed terminally.
    Error {
        url: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Periodic counter snapshot.
    Progress {
        snapshot: ProgressSnapshot,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// The crawl finished; final counters attached.
    Completed {
        pages_crawled: usize,
        total_urls_crawled: usize,
        duration: Duration,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// The bus is closing; subscribers should exit their loops.
    Shutdown {
        reason: ShutdownReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CrawlEvent {
    #[must_use]
    pub fn started(crawl_id: String, seed_url: String, max_depth: u16) -> Self {
        Self::Started {
            crawl_id,
            seed_url,
            max_depth,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn request(url: String, depth: u16, retry: u8) -> Self {
        Self::Request {
            url,
            depth,
            retry,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn response(url: String, status: u16, content_type: String) -> Self {
        Self::Response {
            url,
            status,
            content_type,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn page(result: PageResult) -> Self {
        Self::Page {
            result,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn error(url: String, error: String) -> Self {
        Self::Error {
            url,
            error,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn progress(snapshot: ProgressSnapshot) -> Self {
        Self::Progress {
            snapshot,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn completed(pages_crawled: usize, total_urls_crawled: usize, duration: Duration) -> Self {
        Self::Completed {
            pages_crawled,
            total_urls_crawled,
            duration,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn shutdown(reason: ShutdownReason) -> Self {
        Self::Shutdown {
            reason,
            timestamp: chrono::Utc::now(),
        }
    }
}
