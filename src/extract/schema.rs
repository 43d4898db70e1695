//! Serializable link and resource records produced by extraction.

use serde::{Deserialize, Serialize};

/// What kind of reference a link record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Anchor,
    Image,
    Script,
    Stylesheet,
    Other,
}

/// Semantic region of the page where a link was found.
///
/// Classification walks the ancestor chain; the variants are ordered by
/// match priority, most specific landmark first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPosition {
    Breadcrumbs,
    Pagination,
    Navigation,
    Sidebar,
    Header,
    Footer,
    Content,
    Unknown,
}

/// What the crawler decided to do with a discovered URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlAction {
    /// In scope: fetch it.
    Crawl,
    /// Keep in the link graph but never fetch (external resources,
    /// framework data endpoints, single-page mode discoveries).
    Record,
    /// Known noise: keep the record, never fetch, never count as pending.
    Skip,
}

/// One extracted hyperlink or resource reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Canonicalized absolute URL.
    pub url: String,
    pub link_type: LinkType,
    /// Whitespace-collapsed textual content of the anchor. Empty for
    /// resource references.
    pub anchor_text: String,
    /// Up to [`CONTEXT_WINDOW`](super::CONTEXT_WINDOW) characters of text
    /// surrounding the anchor in its parent block.
    pub context: String,
    /// Whether the target host falls inside the crawl's allowed domains.
    pub is_internal: bool,
    /// HTTP status of the target, filled in once its fetch completes.
    pub status: Option<u16>,
    pub position: LinkPosition,
    /// Ancestor-chain summary, e.g. `html>body>main>article>p>a`.
    pub dom_path: String,
    pub url_action: UrlAction,
    /// `rel=nofollow` was present on the anchor.
    #[serde(default)]
    pub nofollow: bool,
}
