//! Request and response types moving through the collector.

use reqwest::Method;
use reqwest::header::HeaderMap;
use std::borrow::Cow;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::context::Context;
use crate::canon::CanonicalUrl;

/// One fetch intention. Created by the seed or by extraction, destroyed
/// after its terminal response or error.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: CanonicalUrl,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Link distance from the seed; the seed itself is depth 0.
    pub depth: u16,
    /// URL of the page this request was discovered on.
    pub parent: Option<String>,
    pub retry_count: u8,
    pub context: Context,
    /// Proxy the transport chose for the last attempt.
    pub proxy: Option<String>,
    pub cancel: CancellationToken,
    /// Route through the headless renderer instead of plain HTTP.
    pub use_renderer: bool,
    aborted: bool,
}

impl Request {
    #[must_use]
    pub fn new(url: CanonicalUrl, depth: u16, cancel: CancellationToken) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            depth,
            parent: None,
            retry_count: 0,
            context: Context::new(),
            proxy: None,
            cancel,
            use_renderer: false,
            aborted: false,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.url.fingerprint()
    }

    /// Abort from inside an `on_request` callback; the fetch never starts.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

/// One observed redirect hop.
#[derive(Debug, Clone)]
pub struct RedirectHop {
    pub from: Url,
    pub to: Url,
    pub status: u16,
}

/// A terminal response, after redirects resolved.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// URL that produced the terminal response.
    pub final_url: CanonicalUrl,
    /// Hops traversed between the request URL and `final_url`, in arrival
    /// order.
    pub redirects: Vec<RedirectHop>,
    pub request: Request,
    /// Whether the body came from the headless renderer.
    pub rendered: bool,
    /// Sub-resource URLs the renderer observed while loading the page.
    pub network_requests: Vec<String>,
}

impl Response {
    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// `Content-Type` header value without parameters, lowercased.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_html(&self) -> bool {
        matches!(
            self.content_type().as_str(),
            "text/html" | "application/xhtml+xml"
        )
    }

    #[must_use]
    pub fn is_xml(&self) -> bool {
        let ct = self.content_type();
        ct == "text/xml" || ct == "application/xml" || ct.ends_with("+xml")
    }
}
