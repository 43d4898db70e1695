//! Assembled per-page crawl results.

use serde::{Deserialize, Serialize};

use crate::extract::schema::Link;

/// Verdict derived from the `X-Robots-Tag` header and `<meta name=robots>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indexability {
    Yes,
    No,
}

/// The structured outcome of crawling one URL, delivered through
/// `crawl:page` events and stored in the URL store's page metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub title: String,
    pub meta_description: Option<String>,
    /// xxh3 hash of the body, present for successfully fetched documents.
    pub content_hash: Option<String>,
    pub indexable: Indexability,
    /// Set when the URL was fetched despite a robots disallow
    /// (`ignore-report` mode).
    pub robots_flagged: bool,
    pub internal_links: Vec<Link>,
    pub external_links: Vec<Link>,
    pub resources: Vec<Link>,
    /// Terminal error string for failed fetches.
    pub error: Option<String>,
}

impl PageResult {
    /// A result shell for a URL that produced a terminal error instead of
    /// a response.
    #[must_use]
    pub fn failed(url: String, status: u16, error: String) -> Self {
        Self {
            url,
            status,
            content_type: String::new(),
            title: String::new(),
            meta_description: None,
            content_hash: None,
            indexable: Indexability::No,
            robots_flagged: false,
            internal_links: Vec::new(),
            external_links: Vec::new(),
            resources: Vec::new(),
            error: Some(error),
        }
    }

    /// A result shell carrying only transport-level facts, used when no
    /// extraction ran (non-HTML bodies, collector-only drains).
    #[must_use]
    pub fn minimal(url: String, status: u16, content_type: String) -> Self {
        Self {
            url,
            status,
            content_type,
            title: String::new(),
            meta_description: None,
            content_hash: None,
            indexable: if status < 400 {
                Indexability::Yes
            } else {
                Indexability::No
            },
            robots_flagged: false,
            internal_links: Vec::new(),
            external_links: Vec::new(),
            resources: Vec::new(),
            error: None,
        }
    }

    /// Whether this result counts toward `pages_crawled`. Accepts the same
    /// set as [`Response::is_html`](crate::collector::Response::is_html),
    /// so a page extracted as HTML is always counted as HTML.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type
            .parse::<mime::Mime>()
            .map(|m| {
                (m.type_() == mime::TEXT && m.subtype() == mime::HTML)
                    || m.essence_str() == "application/xhtml+xml"
            })
            .unwrap_or(false)
    }
}
