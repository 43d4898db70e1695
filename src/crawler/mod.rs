//! Crawl orchestration: queue, scope, workers, page-result assembly.
//!
//! The crawler drives the collector with a bounded pool of concurrent
//! worker futures. Discovered links flow canonicalize → framework filter →
//! scope → URL-store reservation → queue; every terminal fetch produces
//! exactly one page result and one `crawl:page` or `crawl:error` event.

pub mod page;
pub mod scope;

use anyhow::{Context as _, Result, anyhow};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use xxhash_rust::xxh3::xxh3_64;

use crate::canon::CanonicalUrl;
use crate::collector::request::{Request, Response};
use crate::collector::{Collector, FetchOutcome};
use crate::config::{CrawlConfig, RobotsMode};
use crate::detect::FrameworkDetector;
use crate::error::CrawlError;
use crate::events::{CrawlEvent, CrawlEventBus, EventBusError, ProgressSnapshot, ShutdownReason};
use crate::extract::schema::{Link, LinkPosition, LinkType, UrlAction};
use crate::extract::{extract_page, xml};
use crate::limiter::RateLimiter;
use crate::robots::{RobotsEvaluator, RobotsVerdict};
use crate::trace::{LogTracer, Tracer};
use crate::transport::{BrowserRenderer, HttpTransport, Render, RoundTrip};
use crate::url_store::{ReserveOutcome, UrlStore};
use page::{Indexability, PageResult};
use scope::Scope;

/// How long in-flight requests get to finish after a cancel.
const CANCEL_GRACE: Duration = Duration::from_secs(30);

/// Cadence of `crawl:progress` events.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Cap on the discovered-URL list inside progress snapshots.
const DISCOVERED_SNAPSHOT_LIMIT: usize = 200;

/// Upper bound on sitemap documents fetched during discovery.
const MAX_SITEMAP_FETCHES: usize = 32;

/// Lifecycle of one crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlState {
    Idle,
    Running,
    /// Queue empty, workers still finishing.
    Draining,
    Done,
    Cancelled,
}

/// Final counters returned by [`Crawler::run`].
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub pages_crawled: usize,
    pub total_urls_crawled: usize,
    pub total_discovered: usize,
    pub duration: Duration,
    pub state: CrawlState,
}

/// One crawl: configuration, shared state, and the worker loop.
pub struct Crawler {
    config: CrawlConfig,
    transport: Arc<HttpTransport>,
    limiter: Arc<RateLimiter>,
    store: Arc<UrlStore>,
    robots: RobotsEvaluator,
    detector: FrameworkDetector,
    tracer: Arc<dyn Tracer>,
    events: Option<Arc<CrawlEventBus>>,
    cancel: CancellationToken,
    state: Mutex<CrawlState>,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        let robots = RobotsEvaluator::new(
            transport.plain_client()?,
            config.user_agent(),
            config.robots_mode(),
        );
        let limiter = Arc::new(RateLimiter::new(config.rate_rules().to_vec())?);
        let store = Arc::new(UrlStore::new(config.allow_revisit()));
        let detector = match config.framework_override() {
            Some(framework) => FrameworkDetector::with_override(framework),
            None => FrameworkDetector::new(),
        };
        Ok(Self {
            config,
            transport,
            limiter,
            store,
            robots,
            detector,
            tracer: Arc::new(LogTracer),
            events: None,
            cancel: CancellationToken::new(),
            state: Mutex::new(CrawlState::Idle),
        })
    }

    /// Attach an event bus for real-time crawl events.
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<CrawlEventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Replace the default log-backed tracer.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<UrlStore> {
        &self.store
    }

    #[must_use]
    pub fn state(&self) -> CrawlState {
        *self.state.lock()
    }

    #[must_use]
    pub fn detected_framework(&self) -> Option<crate::detect::Framework> {
        self.detector.framework()
    }

    /// Cooperative cancellation: no new requests start, in-flight ones get
    /// [`CANCEL_GRACE`] to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn progress_snapshot(&self, is_crawling: bool) -> ProgressSnapshot {
        let stats = self.store.stats();
        ProgressSnapshot {
            project_id: self.config.project_id().to_string(),
            crawl_id: self.config.crawl_id().to_string(),
            domain: self
                .config
                .allowed_domains()
                .first()
                .cloned()
                .unwrap_or_default(),
            seed_url: self.config.seed_url().to_string(),
            pages_crawled: stats.html_pages,
            total_urls_crawled: stats.visited,
            total_discovered: stats.discovered,
            discovered_urls: self.store.discovered_snapshot(DISCOVERED_SNAPSHOT_LIMIT),
            is_crawling,
        }
    }

    fn set_state(&self, state: CrawlState) {
        *self.state.lock() = state;
    }

    fn publish(&self, event: CrawlEvent) {
        if let Some(bus) = &self.events {
            match bus.publish(event) {
                Ok(_) | Err(EventBusError::NoSubscribers) => {}
                Err(e) => debug!(target: "sitehound::crawler", "Event publish failed: {e}"),
            }
        }
    }

    /// Run the crawl to completion (Done or Cancelled).
    pub async fn run(&self) -> Result<CrawlSummary> {
        if self.state() != CrawlState::Idle {
            return Err(anyhow!("crawler already ran; build a new one per crawl"));
        }
        let started = Instant::now();
        self.set_state(CrawlState::Running);

        let renderer: Option<Arc<dyn Render>> = match self.config.renderer() {
            Some(renderer_config) => {
                let renderer = BrowserRenderer::launch(renderer_config.clone())
                    .await
                    .context("Failed to launch headless renderer")?;
                Some(Arc::new(renderer))
            }
            None => None,
        };

        let collector = Collector::new(
            &self.config,
            Arc::clone(&self.transport) as Arc<dyn RoundTrip>,
            renderer,
            Arc::clone(&self.limiter),
            Arc::clone(&self.store),
            Arc::clone(&self.tracer),
            self.cancel.clone(),
        );
        let scope = Scope::from_config(&self.config);

        self.publish(CrawlEvent::started(
            self.config.crawl_id().to_string(),
            self.config.seed_url().to_string(),
            self.config.max_depth(),
        ));

        let seed = CanonicalUrl::parse(self.config.seed_url(), None)
            .map_err(|reason| anyhow!("Seed URL rejected: {reason}"))?;
        collector
            .visit(self.config.seed_url())
            .map_err(|e| anyhow!("Seed visit failed: {e}"))?;
        let seed_request = collector.next_pending();

        let mut queue: VecDeque<Request> = VecDeque::new();
        if let Some(request) = seed_request {
            queue.push_back(request);
        }
        if !self.config.single_page() {
            queue.extend(self.discover_sitemaps(&collector, &scope, &seed).await);
        }

        info!(
            target: "sitehound::crawler",
            "Crawl starting: seed={} depth<={} workers={}",
            seed.as_str(),
            self.config.max_depth(),
            self.config.parallelism()
        );

        let parallelism = self.config.parallelism();
        let mut active = FuturesUnordered::new();
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut cancel_deadline: Option<Instant> = None;

        loop {
            // Move callback-discovered URLs and retries into the queue.
            // After a cancel no new work is accepted.
            for request in collector.take_pending() {
                if !self.cancel.is_cancelled() {
                    queue.push_back(request);
                }
            }

            if !self.cancel.is_cancelled() {
                while active.len() < parallelism {
                    let Some(request) = queue.pop_front() else {
                        break;
                    };
                    active.push(self.process(&collector, &scope, request));
                }
            }

            if active.is_empty() {
                if queue.is_empty() || self.cancel.is_cancelled() {
                    break;
                }
                continue;
            }
            if queue.is_empty() {
                self.set_state(CrawlState::Draining);
            }

            if let Some(deadline) = cancel_deadline
                && Instant::now() >= deadline
            {
                warn!(
                    target: "sitehound::crawler",
                    "Cancel grace period elapsed with {} requests in flight",
                    active.len()
                );
                break;
            }

            tokio::select! {
                _ = active.next() => {}
                _ = ticker.tick() => {
                    self.publish(CrawlEvent::progress(self.progress_snapshot(true)));
                }
                () = self.cancel.cancelled(), if cancel_deadline.is_none() => {
                    info!(target: "sitehound::crawler", "Cancellation requested, draining in-flight requests");
                    cancel_deadline = Some(Instant::now() + CANCEL_GRACE);
                }
            }
        }
        drop(active);

        let cancelled = self.cancel.is_cancelled();
        // Leak guard: chains whose destination never completed (cancel,
        // terminal errors mid-chain) must not outlive the crawl.
        self.store.clear_redirect_chains();
        self.set_state(if cancelled {
            CrawlState::Cancelled
        } else {
            CrawlState::Done
        });

        let stats = self.store.stats();
        let summary = CrawlSummary {
            pages_crawled: stats.html_pages,
            total_urls_crawled: stats.visited,
            total_discovered: stats.discovered,
            duration: started.elapsed(),
            state: self.state(),
        };

        self.publish(CrawlEvent::progress(self.progress_snapshot(false)));
        self.publish(CrawlEvent::completed(
            summary.pages_crawled,
            summary.total_urls_crawled,
            summary.duration,
        ));
        if let Some(bus) = &self.events {
            bus.shutdown(if cancelled {
                ShutdownReason::Cancelled
            } else {
                ShutdownReason::CrawlCompleted
            });
        }

        info!(
            target: "sitehound::crawler",
            "Crawl {:?}: {} pages, {} URLs, {} discovered in {:?}",
            summary.state,
            summary.pages_crawled,
            summary.total_urls_crawled,
            summary.total_discovered,
            summary.duration
        );
        Ok(summary)
    }

    /// Fetch robots/configured sitemaps (plus nested sitemap indexes) and
    /// turn their locations into depth-0 requests.
    async fn discover_sitemaps(
        &self,
        collector: &Collector,
        scope: &Scope,
        seed: &CanonicalUrl,
    ) -> Vec<Request> {
        let mut candidates: VecDeque<String> =
            self.config.sitemaps().to_vec().into_iter().collect();
        if self.config.robots_mode() != RobotsMode::Ignore {
            candidates.extend(self.robots.sitemaps(seed.as_url()).await);
        }
        if candidates.is_empty() {
            let mut fallback = seed.as_url().clone();
            fallback.set_path("/sitemap.xml");
            fallback.set_query(None);
            candidates.push_back(fallback.to_string());
        }

        let mut page_urls: Vec<String> = Vec::new();
        let mut fetched = 0;
        while let Some(raw) = candidates.pop_front() {
            if self.cancel.is_cancelled() {
                break;
            }
            if fetched >= MAX_SITEMAP_FETCHES {
                warn!(
                    target: "sitehound::crawler",
                    "Sitemap fetch cap ({MAX_SITEMAP_FETCHES}) reached, skipping the rest"
                );
                break;
            }
            let Ok(url) = CanonicalUrl::parse(&raw, Some(seed.as_url())) else {
                debug!(target: "sitehound::crawler", "Ignoring unparsable sitemap URL {raw:?}");
                continue;
            };
            if self.store.try_reserve(url.fingerprint()) != ReserveOutcome::Accepted {
                continue;
            }
            let fp = url.fingerprint().to_string();
            self.store.mark_in_flight(&fp);
            fetched += 1;

            let mut request = Request::new(url.clone(), 0, self.cancel.clone());
            let response = loop {
                match collector.fetch(request).await {
                    Ok(FetchOutcome::Response(response)) => break Some(response),
                    Ok(FetchOutcome::Retrying) => {
                        // Discovery is single-tasked; the only frontier
                        // entry is our own retry.
                        match collector.next_pending() {
                            Some(retried) => request = retried,
                            None => break None,
                        }
                    }
                    Ok(FetchOutcome::Aborted) | Err(_) => break None,
                }
            };

            let Some(response) = response else {
                self.store
                    .complete_visit(&fp, PageResult::failed(raw.clone(), 0, "sitemap fetch failed".into()));
                continue;
            };

            let final_fp = response.final_url.fingerprint().to_string();
            let status = response.status;
            let text = response.text().into_owned();
            self.store.complete_visit(
                &final_fp,
                PageResult::minimal(
                    response.final_url.as_str().to_string(),
                    status,
                    response.content_type(),
                ),
            );
            self.store.finalize_redirect_chain(&final_fp);

            let looks_like_xml =
                response.is_xml() || text.trim_start().starts_with("<?xml");
            if status >= 400 || !looks_like_xml {
                debug!(
                    target: "sitehound::crawler",
                    "Sitemap candidate {} skipped (status {status})",
                    response.final_url.as_str()
                );
                continue;
            }

            let mut nested: Vec<String> = Vec::new();
            if let Err(e) = xml::for_each_match(&text, "sitemapindex/sitemap/loc", |node| {
                nested.push(node.text.clone());
            }) {
                debug!(target: "sitehound::crawler", "Malformed sitemap index: {e:#}");
            }
            candidates.extend(nested);

            if let Err(e) = xml::for_each_match(&text, "urlset/url/loc", |node| {
                page_urls.push(node.text.clone());
            }) {
                debug!(target: "sitehound::crawler", "Malformed sitemap: {e:#}");
            }
        }

        let mut requests = Vec::new();
        for raw in page_urls {
            let Ok(url) = CanonicalUrl::parse(&raw, Some(seed.as_url())) else {
                continue;
            };
            if scope.check(&url, 0).is_err() {
                continue;
            }
            if self.detector.evaluate_url(url.as_url()) != UrlAction::Crawl {
                continue;
            }
            if self.store.try_reserve(url.fingerprint()) != ReserveOutcome::Accepted {
                continue;
            }
            self.tracer.on_enqueued(url.as_str(), 0);
            requests.push(Request::new(url, 0, self.cancel.clone()));
        }
        if !requests.is_empty() {
            info!(
                target: "sitehound::crawler",
                "Sitemap discovery queued {} URLs from {fetched} sitemap(s)",
                requests.len()
            );
        }
        requests
    }

    /// One worker: robots gate, fetch, result assembly, bookkeeping.
    async fn process(&self, collector: &Collector, scope: &Scope, mut request: Request) {
        let fp = request.fingerprint().to_string();
        let url_str = request.url.as_str().to_string();

        let mut robots_flagged = false;
        if self.config.robots_mode() != RobotsMode::Ignore {
            match self.robots.check(request.url.as_url()).await {
                RobotsVerdict::Allowed => {}
                RobotsVerdict::FetchedButFlagged => robots_flagged = true,
                RobotsVerdict::Disallowed => {
                    debug!(target: "sitehound::crawler", "Robots disallows {url_str}");
                    self.store.complete_visit(
                        &fp,
                        PageResult::failed(
                            url_str.clone(),
                            0,
                            CrawlError::DisallowedByRobots(url_str).to_string(),
                        ),
                    );
                    return;
                }
            }
        }
        if self.cancel.is_cancelled() {
            return;
        }

        self.store.mark_in_flight(&fp);
        request.use_renderer = self.config.renderer().is_some();
        self.publish(CrawlEvent::request(
            url_str.clone(),
            request.depth,
            request.retry_count,
        ));

        match collector.fetch(request).await {
            Ok(FetchOutcome::Response(response)) => {
                self.handle_response(collector, scope, *response, robots_flagged);
            }
            Ok(FetchOutcome::Retrying) => {
                self.store.release_in_flight(&fp);
            }
            Ok(FetchOutcome::Aborted) => {
                let mut result = PageResult::minimal(url_str, 0, String::new());
                result.error = Some("aborted by on_request callback".to_string());
                self.store.complete_visit(&fp, result);
            }
            Err(CrawlError::Cancelled) => {
                self.store.release_in_flight(&fp);
            }
            Err(err) => {
                let result = PageResult::failed(url_str.clone(), 0, err.to_string());
                self.store.complete_visit(&fp, result);
                self.publish(CrawlEvent::error(url_str, err.to_string()));
            }
        }
    }

    /// Assemble the page result from a terminal response, fan out links,
    /// and publish. Redirect-chain finalization is deliberately the last
    /// store operation.
    fn handle_response(
        &self,
        collector: &Collector,
        scope: &Scope,
        response: Response,
        robots_flagged: bool,
    ) {
        let final_fp = response.final_url.fingerprint().to_string();
        let url_str = response.final_url.as_str().to_string();
        let status = response.status;
        let content_type = response.content_type();

        self.publish(CrawlEvent::response(
            url_str.clone(),
            status,
            content_type.clone(),
        ));

        let mut result = PageResult::minimal(url_str.clone(), status, content_type);
        result.robots_flagged = robots_flagged;

        if status >= 400 {
            result.error = Some(format!("HTTP {status}"));
            result.indexable = Indexability::No;
        } else if response.is_html() {
            let text = response.text();
            self.detector.observe(&text, response.final_url.as_url());

            let extract = extract_page(&text, response.final_url.as_url(), &|url| {
                scope.host_allowed(url.host_str().unwrap_or_default())
            });
            result.title = extract.title;
            result.meta_description = extract.meta_description;
            result.content_hash = Some(format!("{:016x}", xxh3_64(&response.body)));
            result.indexable = self.indexability(&response, extract.meta_robots.as_deref());

            // Pages at the depth limit are leaves: their links are neither
            // followed nor recorded.
            if response.request.depth < scope.max_depth() {
                let next_depth = response.request.depth + 1;
                for mut link in extract.links {
                    let Ok(url) = CanonicalUrl::parse(&link.url, None) else {
                        continue;
                    };
                    link.url_action = self.decide_link_action(&link, &url, next_depth, scope);

                    if link.url_action == UrlAction::Crawl
                        && self.store.try_reserve(url.fingerprint()) == ReserveOutcome::Accepted
                    {
                        collector.push_pending(
                            Request::new(url, next_depth, self.cancel.clone())
                                .with_parent(url_str.clone()),
                        );
                    }

                    match link.link_type {
                        LinkType::Anchor if link.is_internal => {
                            result.internal_links.push(link.clone());
                        }
                        LinkType::Anchor => result.external_links.push(link.clone()),
                        _ => result.resources.push(link.clone()),
                    }
                    self.store.add_link(&final_fp, link);
                }
            }

            for raw in &response.network_requests {
                let Ok(url) = CanonicalUrl::parse(raw, None) else {
                    continue;
                };
                let link = Link {
                    is_internal: scope.host_allowed(url.host()),
                    url: url.as_str().to_string(),
                    link_type: LinkType::Other,
                    anchor_text: String::new(),
                    context: String::new(),
                    status: None,
                    position: LinkPosition::Unknown,
                    dom_path: String::new(),
                    url_action: UrlAction::Record,
                    nofollow: false,
                };
                result.resources.push(link.clone());
                self.store.add_link(&final_fp, link);
            }
        }

        self.store.complete_visit(&final_fp, result.clone());
        self.store.finalize_redirect_chain(&final_fp);
        self.publish(CrawlEvent::page(result));
    }

    /// Framework filters first, then link-kind and scope rules. `Record`
    /// keeps the link in the graph without fetching it.
    fn decide_link_action(
        &self,
        link: &Link,
        url: &CanonicalUrl,
        next_depth: u16,
        scope: &Scope,
    ) -> UrlAction {
        match self.detector.evaluate_url(url.as_url()) {
            UrlAction::Skip => return UrlAction::Skip,
            UrlAction::Record => return UrlAction::Record,
            UrlAction::Crawl => {}
        }

        if link.link_type != LinkType::Anchor {
            return if self.config.check_external_resources() && !link.is_internal {
                UrlAction::Crawl
            } else {
                UrlAction::Record
            };
        }

        if !link.is_internal {
            // External anchors are never fetched; nofollow ones can be
            // suppressed from auditing entirely.
            return if link.nofollow && !self.config.follow_external_nofollow() {
                UrlAction::Skip
            } else {
                UrlAction::Record
            };
        }
        if link.nofollow && !self.config.follow_internal_nofollow() {
            return UrlAction::Record;
        }
        if self.config.single_page() {
            return UrlAction::Record;
        }
        match scope.check(url, next_depth) {
            Ok(()) => UrlAction::Crawl,
            Err(_) => UrlAction::Record,
        }
    }

    fn indexability(&self, response: &Response, meta_robots: Option<&str>) -> Indexability {
        if !(200..300).contains(&response.status) {
            return Indexability::No;
        }
        if self.config.respect_header_noindex() {
            let noindex = response
                .headers
                .get_all("x-robots-tag")
                .iter()
                .filter_map(|value| value.to_str().ok())
                .any(|value| value.to_ascii_lowercase().contains("noindex"));
            if noindex {
                return Indexability::No;
            }
        }
        if self.config.respect_meta_noindex()
            && meta_robots
                .map(|value| value.to_ascii_lowercase().contains("noindex"))
                .unwrap_or(false)
        {
            return Indexability::No;
        }
        Indexability::Yes
    }
}
