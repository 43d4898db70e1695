//! Callback registry types and the element helpers handed to user
//! callbacks.

use parking_lot::Mutex;
use scraper::{ElementRef, Selector};
use std::sync::Arc;
use url::Url;

use super::context::Context;
use super::request::{Request, Response};
use crate::canon::CanonicalUrl;
use crate::error::CrawlError;
use crate::extract::collapse_whitespace;
use crate::extract::xml::XmlNode;

pub type RequestHandler = Arc<dyn Fn(&mut Request) + Send + Sync>;
pub type ResponseHandler = Arc<dyn Fn(&Response) + Send + Sync>;
pub type HtmlHandler = Arc<dyn Fn(&HtmlElement<'_>) + Send + Sync>;
pub type XmlHandler = Arc<dyn Fn(&XmlElement<'_>) + Send + Sync>;
pub type ScrapedHandler = Arc<dyn Fn(&Response) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(Option<&Response>, &CrawlError) + Send + Sync>;
pub type RedirectHandler = Arc<dyn Fn(&Url, &Url) + Send + Sync>;

/// A URL a callback asked to visit, captured during dispatch and drained
/// into the collector's frontier afterwards.
#[derive(Debug)]
pub(super) struct PendingVisit {
    pub url: CanonicalUrl,
    pub depth: u16,
    pub parent: String,
}

/// Collects `visit()` calls made from inside callbacks. Callbacks are
/// synchronous, so this is a plain mutex, never held across awaits.
#[derive(Default)]
pub(super) struct VisitSink {
    visits: Mutex<Vec<PendingVisit>>,
}

impl VisitSink {
    pub(super) fn push(&self, visit: PendingVisit) {
        self.visits.lock().push(visit);
    }

    pub(super) fn drain(&self) -> Vec<PendingVisit> {
        std::mem::take(&mut *self.visits.lock())
    }
}

/// A matched HTML element handed to an `on_html` callback.
pub struct HtmlElement<'a> {
    pub(super) element: ElementRef<'a>,
    pub(super) request: &'a Request,
    pub(super) base: &'a Url,
    pub(super) sink: &'a VisitSink,
}

impl<'a> HtmlElement<'a> {
    /// Attribute value on the matched element.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Whitespace-collapsed text content of the element and its children.
    #[must_use]
    pub fn text(&self) -> String {
        collapse_whitespace(&self.element.text().collect::<String>())
    }

    /// Tag name of the matched element.
    #[must_use]
    pub fn name(&self) -> &str {
        self.element.value().name()
    }

    /// The request that produced the page this element came from.
    #[must_use]
    pub fn request(&self) -> &Request {
        self.request
    }

    /// The request's context map.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.request.context
    }

    /// Resolve a (possibly relative) reference against the page URL.
    #[must_use]
    pub fn absolute_url(&self, reference: &str) -> Option<CanonicalUrl> {
        CanonicalUrl::parse(reference, Some(self.base)).ok()
    }

    /// Ask the collector to fetch `reference`, one level deeper than the
    /// current page. The new request gets a fresh, empty context; nothing
    /// is inherited from this page's request.
    pub fn visit(&self, reference: &str) {
        if let Some(url) = self.absolute_url(reference) {
            self.sink.push(PendingVisit {
                url,
                depth: self.request.depth + 1,
                parent: self.request.url.as_str().to_string(),
            });
        }
    }

    /// Run `f` for every descendant matching `selector`.
    pub fn for_each(&self, selector: &str, mut f: impl FnMut(&HtmlElement<'_>)) {
        let Ok(selector) = Selector::parse(selector) else {
            return;
        };
        for child in self.element.select(&selector) {
            f(&HtmlElement {
                element: child,
                request: self.request,
                base: self.base,
                sink: self.sink,
            });
        }
    }
}

/// A matched XML element handed to an `on_xml` callback.
pub struct XmlElement<'a> {
    pub(super) node: &'a XmlNode,
    pub(super) request: &'a Request,
    pub(super) base: &'a Url,
    pub(super) sink: &'a VisitSink,
}

impl XmlElement<'_> {
    /// Trimmed text content of the matched element.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.node.text
    }

    /// Full element path from the document root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.node.path
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.node
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        self.request
    }

    #[must_use]
    pub fn absolute_url(&self, reference: &str) -> Option<CanonicalUrl> {
        CanonicalUrl::parse(reference, Some(self.base)).ok()
    }

    /// Same contract as [`HtmlElement::visit`]: fresh context, depth + 1.
    pub fn visit(&self, reference: &str) {
        if let Some(url) = self.absolute_url(reference) {
            self.sink.push(PendingVisit {
                url,
                depth: self.request.depth + 1,
                parent: self.request.url.as_str().to_string(),
            });
        }
    }
}
