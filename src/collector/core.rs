//! The callback fetch engine.
//!
//! A [`Collector`] is an explicit handle with its own callback registry,
//! transport, and URL store; two collectors in one process share nothing
//! unless handed the same dependencies. Per request the lifecycle is:
//! `on_request` → rate limit → transport (redirect hops surfaced to
//! `on_redirect`) → `on_response` → `on_html`/`on_xml` in registration
//! order → `on_scraped`, with `on_error` as the terminal error path.

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use scraper::{Html, Selector};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::handlers::{
    ErrorHandler, HtmlElement, HtmlHandler, RedirectHandler, RequestHandler, ResponseHandler,
    ScrapedHandler, VisitSink, XmlElement, XmlHandler,
};
use super::request::{RedirectHop, Request, Response};
use crate::canon::CanonicalUrl;
use crate::config::CrawlConfig;
use crate::crawler::page::PageResult;
use crate::error::{CrawlError, CrawlResult};
use crate::extract::xml;
use crate::limiter::RateLimiter;
use crate::trace::Tracer;
use crate::transport::{Render, RoundTrip};
use crate::url_store::UrlStore;

/// What became of one fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Terminal response; callbacks already ran. Present for every status
    /// code, including 4xx/5xx past the retry budget.
    Response(Box<Response>),
    /// The retry policy re-enqueued the request; not terminal.
    Retrying,
    /// An `on_request` callback aborted the fetch before it started.
    Aborted,
}

#[derive(Default)]
struct Registry {
    on_request: RwLock<Vec<RequestHandler>>,
    on_response: RwLock<Vec<ResponseHandler>>,
    on_html: RwLock<Vec<(Selector, HtmlHandler)>>,
    on_xml: RwLock<Vec<(String, XmlHandler)>>,
    on_scraped: RwLock<Vec<ScrapedHandler>>,
    on_error: RwLock<Vec<ErrorHandler>>,
    on_redirect: RwLock<Vec<RedirectHandler>>,
}

/// Callback-driven fetch engine shared by every worker of a crawl.
pub struct Collector {
    transport: Arc<dyn RoundTrip>,
    renderer: Option<Arc<dyn Render>>,
    limiter: Arc<RateLimiter>,
    store: Arc<UrlStore>,
    tracer: Arc<dyn Tracer>,
    cancel: CancellationToken,
    max_redirects: usize,
    max_retries: u8,
    registry: Registry,
    /// Frontier of requests created by `visit()` calls and retries. The
    /// crawler drains this into its own queue; standalone use drains it
    /// through [`Collector::drain`].
    pending: Mutex<VecDeque<Request>>,
}

impl Collector {
    pub fn new(
        config: &CrawlConfig,
        transport: Arc<dyn RoundTrip>,
        renderer: Option<Arc<dyn Render>>,
        limiter: Arc<RateLimiter>,
        store: Arc<UrlStore>,
        tracer: Arc<dyn Tracer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            renderer,
            limiter,
            store,
            tracer,
            cancel,
            max_redirects: config.max_redirects(),
            max_retries: config.max_retries(),
            registry: Registry::default(),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    // ---- callback registration -------------------------------------------

    /// Last chance to mutate headers or abort before the fetch.
    pub fn on_request(&self, handler: impl Fn(&mut Request) + Send + Sync + 'static) {
        self.registry.on_request.write().push(Arc::new(handler));
    }

    /// Invoked once per terminal response (never per redirect hop).
    pub fn on_response(&self, handler: impl Fn(&Response) + Send + Sync + 'static) {
        self.registry.on_response.write().push(Arc::new(handler));
    }

    /// Invoked for every element of an HTML response matching `selector`.
    pub fn on_html(
        &self,
        selector: &str,
        handler: impl Fn(&HtmlElement<'_>) + Send + Sync + 'static,
    ) -> anyhow::Result<()> {
        let selector = Selector::parse(selector)
            .map_err(|e| anyhow::anyhow!("Invalid CSS selector '{selector}': {e}"))?;
        self.registry
            .on_html
            .write()
            .push((selector, Arc::new(handler)));
        Ok(())
    }

    /// Invoked for every XML element matching the slash-separated element
    /// path (`urlset/url/loc`).
    pub fn on_xml(&self, path: &str, handler: impl Fn(&XmlElement<'_>) + Send + Sync + 'static) {
        self.registry
            .on_xml
            .write()
            .push((path.to_string(), Arc::new(handler)));
    }

    /// Fires after all `on_html`/`on_xml` handlers finished for a response.
    pub fn on_scraped(&self, handler: impl Fn(&Response) + Send + Sync + 'static) {
        self.registry.on_scraped.write().push(Arc::new(handler));
    }

    /// Terminal error path. The response is present for HTTP-status errors.
    pub fn on_error(
        &self,
        handler: impl Fn(Option<&Response>, &CrawlError) + Send + Sync + 'static,
    ) {
        self.registry.on_error.write().push(Arc::new(handler));
    }

    /// Non-terminal redirect hop notification, in arrival order.
    pub fn on_redirect(&self, handler: impl Fn(&Url, &Url) + Send + Sync + 'static) {
        self.registry.on_redirect.write().push(Arc::new(handler));
    }

    // ---- frontier ---------------------------------------------------------

    /// Canonicalize and enqueue a seed URL at depth 0. Returns `false`
    /// when the URL store refused it as a duplicate.
    pub fn visit(&self, url: &str) -> CrawlResult<bool> {
        let canonical = CanonicalUrl::parse(url, None).map_err(|reason| CrawlError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        })?;
        Ok(self.enqueue(canonical, 0, None))
    }

    /// Re-enqueue `request` with its context preserved. Returns `false`
    /// once the retry budget is spent.
    pub fn retry(&self, request: &Request) -> bool {
        if request.retry_count >= self.max_retries {
            return false;
        }
        let mut retried = request.clone();
        retried.retry_count += 1;
        debug_assert!(retried.context.same_as(&request.context));
        self.tracer.on_retry(retried.url.as_str(), retried.retry_count);
        self.pending.lock().push_back(retried);
        true
    }

    /// Push an already-reserved request onto the frontier. The caller is
    /// responsible for having claimed the fingerprint in the URL store.
    pub fn push_pending(&self, request: Request) {
        self.tracer
            .on_enqueued(request.url.as_str(), request.depth);
        self.pending.lock().push_back(request);
    }

    /// Pop the next frontier request.
    pub fn next_pending(&self) -> Option<Request> {
        self.pending.lock().pop_front()
    }

    /// Drain the whole frontier, preserving order.
    pub fn take_pending(&self) -> Vec<Request> {
        self.pending.lock().drain(..).collect()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<UrlStore> {
        &self.store
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn enqueue(&self, url: CanonicalUrl, depth: u16, parent: Option<String>) -> bool {
        use crate::url_store::ReserveOutcome;
        match self.store.try_reserve(url.fingerprint()) {
            ReserveOutcome::Accepted => {
                self.tracer.on_enqueued(url.as_str(), depth);
                let mut request = Request::new(url, depth, self.cancel.clone());
                request.parent = parent;
                self.pending.lock().push_back(request);
                true
            }
            outcome => {
                debug!(
                    target: "sitehound::collector",
                    "Not enqueueing {}: {outcome:?}",
                    url.as_str()
                );
                false
            }
        }
    }

    // ---- fetch lifecycle --------------------------------------------------

    /// Run one request through its full lifecycle.
    ///
    /// On `Ok(FetchOutcome::Response)` every registered callback has fired;
    /// URLs visited from inside callbacks are waiting in the frontier with
    /// fresh contexts. `Err` means a terminal error already routed through
    /// `on_error`, with [`CrawlError::Cancelled`] as the one kind that
    /// emits nothing.
    pub async fn fetch(&self, mut request: Request) -> CrawlResult<FetchOutcome> {
        if request.cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        let request_handlers: Vec<RequestHandler> = self.registry.on_request.read().clone();
        for handler in request_handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&mut request))) {
                let err = CrawlError::Callback(panic_message(payload));
                self.emit_error(None, &err);
                return Err(err);
            }
        }
        if request.is_aborted() {
            debug!(
                target: "sitehound::collector",
                "Request aborted by callback: {}",
                request.url.as_str()
            );
            return Ok(FetchOutcome::Aborted);
        }

        let host = request.url.host().to_string();
        let _permit = tokio::select! {
            permit = self.limiter.admit(&host) => permit,
            () = request.cancel.cancelled() => return Err(CrawlError::Cancelled),
        };

        self.tracer
            .on_dispatch(request.url.as_str(), request.retry_count);
        let started = Instant::now();

        let response = if request.use_renderer && self.renderer.is_some() {
            match self.render_request(request).await {
                Ok(response) => response,
                Err((request, err)) => return self.terminal_error(request, err),
            }
        } else {
            match self.http_request(request).await {
                Ok(Some(response)) => response,
                Ok(None) => return Ok(FetchOutcome::Retrying),
                Err((request, err)) => return self.terminal_error(request, err),
            }
        };

        if response.status >= 400 {
            let err = CrawlError::Http {
                status: response.status,
                url: response.final_url.as_str().to_string(),
            };
            self.tracer
                .on_failed(response.final_url.as_str(), &err.to_string());
            self.emit_error(Some(&response), &err);
            return Ok(FetchOutcome::Response(Box::new(response)));
        }

        self.tracer.on_response(
            response.final_url.as_str(),
            response.status,
            started.elapsed().as_millis(),
        );

        let sink = VisitSink::default();
        if let Err(err) = self.dispatch(&response, &sink) {
            self.emit_error(Some(&response), &err);
            return Err(err);
        }
        for visit in sink.drain() {
            // Fresh context per discovered URL: Request::new allocates a
            // new empty map, never inheriting the parent's.
            self.enqueue(visit.url, visit.depth, Some(visit.parent));
        }

        Ok(FetchOutcome::Response(Box::new(response)))
    }

    fn terminal_error(&self, request: Request, err: CrawlError) -> CrawlResult<FetchOutcome> {
        if matches!(err, CrawlError::Cancelled) {
            return Err(err);
        }
        self.tracer.on_failed(request.url.as_str(), &err.to_string());
        self.emit_error(None, &err);
        Err(err)
    }

    /// Plain-HTTP path: manual redirect loop with retry policy.
    /// `Ok(None)` means the request was re-enqueued for retry.
    async fn http_request(
        &self,
        mut request: Request,
    ) -> Result<Option<Response>, (Request, CrawlError)> {
        let mut hops: Vec<RedirectHop> = Vec::new();
        let mut current: Url = request.url.as_url().clone();

        let terminal = loop {
            if request.cancel.is_cancelled() {
                return Err((request, CrawlError::Cancelled));
            }
            let hop = match self.transport.round_trip(&request, &current).await {
                Ok(hop) => hop,
                Err(CrawlError::Cancelled) => return Err((request, CrawlError::Cancelled)),
                Err(err) => {
                    if err.is_retryable() && self.retry(&request) {
                        return Ok(None);
                    }
                    return Err((request, err));
                }
            };

            let Some(target) = hop.redirect_target() else {
                break hop;
            };
            if hops.len() >= self.max_redirects {
                warn!(
                    target: "sitehound::collector",
                    "Redirect cap ({}) reached at {current}",
                    self.max_redirects
                );
                break hop;
            }

            if let (Ok(from), Ok(to)) = (
                CanonicalUrl::from_url(current.clone()),
                CanonicalUrl::from_url(target.clone()),
            ) {
                self.store
                    .record_redirect_hop(from.fingerprint(), to.fingerprint());
                // Claim the destination so a concurrently discovered direct
                // link to it is refused as a duplicate. It is NOT marked
                // visited; that waits for its terminal response.
                if self.store.try_reserve(to.fingerprint())
                    == crate::url_store::ReserveOutcome::Accepted
                {
                    self.store.mark_in_flight(to.fingerprint());
                }
            }
            self.tracer.on_redirect(current.as_str(), target.as_str());
            let redirect_handlers: Vec<RedirectHandler> = self.registry.on_redirect.read().clone();
            for handler in redirect_handlers {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&current, &target)))
                {
                    warn!(
                        target: "sitehound::collector",
                        "on_redirect handler panicked: {}",
                        panic_message(payload)
                    );
                }
            }

            hops.push(RedirectHop {
                from: current.clone(),
                to: target.clone(),
                status: hop.status,
            });
            current = target;
        };

        if terminal.status >= 500 && self.retry(&request) {
            return Ok(None);
        }

        let final_url = match CanonicalUrl::from_url(terminal.url.clone()) {
            Ok(url) => url,
            Err(reason) => {
                let err = CrawlError::InvalidUrl {
                    url: terminal.url.to_string(),
                    reason: reason.to_string(),
                };
                return Err((request, err));
            }
        };
        request.proxy = terminal.proxy;

        Ok(Some(Response {
            status: terminal.status,
            headers: terminal.headers,
            body: terminal.body,
            final_url,
            redirects: hops,
            request,
            rendered: false,
            network_requests: Vec::new(),
        }))
    }

    /// Renderer path. Renderer failures are permanent; there is no retry.
    async fn render_request(&self, request: Request) -> Result<Response, (Request, CrawlError)> {
        // Presence checked by the caller.
        let Some(renderer) = self.renderer.as_ref() else {
            return Err((
                request,
                CrawlError::Renderer("no renderer configured".into()),
            ));
        };

        let rendered = match renderer.render(request.url.as_url()).await {
            Ok(rendered) => rendered,
            Err(err) => return Err((request, err)),
        };

        let final_url = rendered
            .final_url
            .as_deref()
            .and_then(|raw| CanonicalUrl::parse(raw, None).ok())
            .unwrap_or_else(|| request.url.clone());

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("text/html; charset=utf-8"),
        );

        Ok(Response {
            status: 200,
            headers,
            body: rendered.html.into_bytes(),
            final_url,
            redirects: Vec::new(),
            request,
            rendered: true,
            network_requests: rendered.network_requests,
        })
    }

    /// Run response/html/xml/scraped callbacks, in that order. A panic in
    /// any of them stops dispatch and fails the request.
    fn dispatch(&self, response: &Response, sink: &VisitSink) -> CrawlResult<()> {
        let response_handlers: Vec<ResponseHandler> = self.registry.on_response.read().clone();
        for handler in response_handlers {
            catch_unwind(AssertUnwindSafe(|| handler(response)))
                .map_err(|p| CrawlError::Callback(panic_message(p)))?;
        }

        if response.is_html() {
            let html_handlers: Vec<(Selector, HtmlHandler)> =
                self.registry.on_html.read().clone();
            if !html_handlers.is_empty() {
                let text = response.text();
                let document = Html::parse_document(&text);
                let base = response.final_url.as_url();
                for (selector, handler) in &html_handlers {
                    for element in document.select(selector) {
                        let helper = HtmlElement {
                            element,
                            request: &response.request,
                            base,
                            sink,
                        };
                        catch_unwind(AssertUnwindSafe(|| handler(&helper)))
                            .map_err(|p| CrawlError::Callback(panic_message(p)))?;
                    }
                }
            }
        } else if response.is_xml() {
            let xml_handlers: Vec<(String, XmlHandler)> = self.registry.on_xml.read().clone();
            if !xml_handlers.is_empty() {
                let text = response.text();
                let base = response.final_url.as_url();
                for (pattern, handler) in &xml_handlers {
                    let mut panicked: Option<String> = None;
                    let walk = xml::for_each_match(&text, pattern, |node| {
                        if panicked.is_some() {
                            return;
                        }
                        let helper = XmlElement {
                            node,
                            request: &response.request,
                            base,
                            sink,
                        };
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&helper))) {
                            panicked = Some(panic_message(payload));
                        }
                    });
                    if let Err(e) = walk {
                        warn!(
                            target: "sitehound::collector",
                            "Skipping malformed XML from {}: {e:#}",
                            response.final_url.as_str()
                        );
                    }
                    if let Some(message) = panicked {
                        return Err(CrawlError::Callback(message));
                    }
                }
            }
        }

        let scraped_handlers: Vec<ScrapedHandler> = self.registry.on_scraped.read().clone();
        for handler in scraped_handlers {
            catch_unwind(AssertUnwindSafe(|| handler(response)))
                .map_err(|p| CrawlError::Callback(panic_message(p)))?;
        }

        Ok(())
    }

    fn emit_error(&self, response: Option<&Response>, err: &CrawlError) {
        let handlers: Vec<ErrorHandler> = self.registry.on_error.read().clone();
        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(response, err))) {
                warn!(
                    target: "sitehound::collector",
                    "on_error handler panicked: {}",
                    panic_message(payload)
                );
            }
        }
    }

    // ---- standalone drive -------------------------------------------------

    /// Sequentially process the frontier until it is empty or the crawl is
    /// cancelled. This is the single-task driver for collector-only use;
    /// the crawler runs its own worker pool instead. Returns the number of
    /// terminal results produced.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while let Some(request) = self.next_pending() {
            if self.cancel.is_cancelled() {
                break;
            }
            let fp = request.fingerprint().to_string();
            self.store.mark_in_flight(&fp);

            match self.fetch(request).await {
                Ok(FetchOutcome::Response(response)) => {
                    let final_fp = response.final_url.fingerprint().to_string();
                    let mut result = PageResult::minimal(
                        response.final_url.as_str().to_string(),
                        response.status,
                        response.content_type(),
                    );
                    if response.status >= 400 {
                        result.error = Some(format!("HTTP {}", response.status));
                    }
                    if final_fp != fp {
                        self.store.complete_visit(&final_fp, result.clone());
                    }
                    self.store.complete_visit(&fp, result);
                    self.store.finalize_redirect_chain(&final_fp);
                    processed += 1;
                }
                Ok(FetchOutcome::Retrying) => {
                    self.store.release_in_flight(&fp);
                }
                Ok(FetchOutcome::Aborted) => {
                    let mut result = PageResult::minimal(fp.clone(), 0, String::new());
                    result.error = Some("aborted by on_request callback".to_string());
                    self.store.complete_visit(&fp, result);
                }
                Err(CrawlError::Cancelled) => {
                    self.store.release_in_flight(&fp);
                    break;
                }
                Err(err) => {
                    self.store
                        .complete_visit(&fp, PageResult::failed(fp.clone(), 0, err.to_string()));
                    processed += 1;
                }
            }
        }
        processed
    }
}

/// Render a panic payload as text for error routing.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in user callback".to_string()
    }
}
