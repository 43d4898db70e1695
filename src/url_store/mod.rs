//! Shared crawl bookkeeping: visited/in-flight/queued sets, redirect
//! chains, the link graph, and per-URL page metadata.
//!
//! All mutation goes through one writer lock so the reserve → in-flight →
//! visited transitions stay atomic with respect to each other. Workers and
//! user callbacks never touch the sets directly; they go through the
//! methods here.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::crawler::page::PageResult;
use crate::extract::schema::Link;

/// Admission decision for a fingerprint that wants to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Fingerprint accepted and moved into the queued set.
    Accepted,
    AlreadyVisited,
    AlreadyQueued,
    AlreadyInFlight,
}

/// Counter snapshot for progress reporting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreStats {
    pub visited: usize,
    pub queued: usize,
    pub in_flight: usize,
    /// Distinct fingerprints ever seen, fetched or not.
    pub discovered: usize,
    /// Visited fingerprints whose result was an HTML page.
    pub html_pages: usize,
}

#[derive(Default)]
struct Inner {
    visited: HashSet<String>,
    in_flight: HashSet<String>,
    queued: HashSet<String>,
    /// destination fingerprint -> ordered intermediate hops leading to it.
    redirect_chains: HashMap<String, Vec<String>>,
    outlinks: HashMap<String, Vec<Link>>,
    inlinks: HashMap<String, Vec<String>>,
    page_meta: HashMap<String, PageResult>,
    discovered: HashSet<String>,
    discovered_order: Vec<String>,
    html_pages: usize,
}

impl Inner {
    fn note_discovered(&mut self, fp: &str) {
        if self.discovered.insert(fp.to_string()) {
            self.discovered_order.push(fp.to_string());
        }
    }
}

/// Concurrency-safe URL state shared by every worker in a crawl.
pub struct UrlStore {
    inner: RwLock<Inner>,
    allow_revisit: bool,
}

impl UrlStore {
    #[must_use]
    pub fn new(allow_revisit: bool) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            allow_revisit,
        }
    }

    /// Try to claim a fingerprint for fetching.
    ///
    /// A fingerprint is admitted only when absent from
    /// `visited ∪ queued ∪ in_flight`. With revisits enabled the visited
    /// check is skipped, but a URL currently queued or being fetched is
    /// still refused so the same resource is never fetched twice
    /// concurrently.
    pub fn try_reserve(&self, fp: &str) -> ReserveOutcome {
        let mut inner = self.inner.write();
        inner.note_discovered(fp);
        if inner.in_flight.contains(fp) {
            return ReserveOutcome::AlreadyInFlight;
        }
        if inner.queued.contains(fp) {
            return ReserveOutcome::AlreadyQueued;
        }
        if inner.visited.contains(fp) {
            if self.allow_revisit {
                inner.visited.remove(fp);
            } else {
                return ReserveOutcome::AlreadyVisited;
            }
        }
        inner.queued.insert(fp.to_string());
        ReserveOutcome::Accepted
    }

    /// Move a queued fingerprint into the in-flight set. Called by the
    /// worker that popped it, immediately before the fetch starts.
    pub fn mark_in_flight(&self, fp: &str) {
        let mut inner = self.inner.write();
        inner.queued.remove(fp);
        inner.in_flight.insert(fp.to_string());
    }

    /// Return an in-flight fingerprint to the queued set, for requests the
    /// retry policy re-enqueued instead of completing.
    pub fn release_in_flight(&self, fp: &str) {
        let mut inner = self.inner.write();
        if inner.in_flight.remove(fp) {
            inner.queued.insert(fp.to_string());
        }
    }

    /// Publish the terminal result for a fingerprint and mark it visited.
    /// The in-flight → visited transition and the metadata write happen
    /// under one lock acquisition.
    pub fn complete_visit(&self, fp: &str, result: PageResult) {
        let mut inner = self.inner.write();
        inner.in_flight.remove(fp);
        inner.queued.remove(fp);
        if inner.visited.insert(fp.to_string()) && result.is_html() && result.error.is_none() {
            inner.html_pages += 1;
        }
        inner.page_meta.insert(fp.to_string(), result);
    }

    /// Append a redirect hop. Any chain already accumulated for `from`
    /// (when `from` was itself a redirect target) is carried forward to the
    /// new destination. Intermediates are NOT marked visited here; that
    /// waits for [`Self::finalize_redirect_chain`].
    pub fn record_redirect_hop(&self, from: &str, to: &str) {
        let mut inner = self.inner.write();
        inner.note_discovered(to);
        let mut chain = inner.redirect_chains.remove(from).unwrap_or_default();
        chain.push(from.to_string());
        inner.redirect_chains.insert(to.to_string(), chain);
    }

    /// Mark every intermediate hop leading to `destination` as visited and
    /// drop the chain. Called as the last step of processing the
    /// destination's terminal response, so a destination reached by
    /// redirect behaves exactly like one reached by a direct link.
    /// Returns the hops that were finalized.
    pub fn finalize_redirect_chain(&self, destination: &str) -> Vec<String> {
        let mut inner = self.inner.write();
        let chain = inner
            .redirect_chains
            .remove(destination)
            .unwrap_or_default();
        for hop in &chain {
            inner.queued.remove(hop);
            inner.in_flight.remove(hop);
            inner.visited.insert(hop.clone());
        }
        chain
    }

    /// Drop all pending redirect chains. Called on cancellation so
    /// half-traversed chains don't outlive the crawl.
    pub fn clear_redirect_chains(&self) {
        self.inner.write().redirect_chains.clear();
    }

    /// Record a link discovered on the page `from_fp`. The graph is
    /// append-only for the duration of a crawl.
    pub fn add_link(&self, from_fp: &str, link: Link) {
        let mut inner = self.inner.write();
        inner.note_discovered(&link.url);
        inner
            .inlinks
            .entry(link.url.clone())
            .or_default()
            .push(from_fp.to_string());
        inner
            .outlinks
            .entry(from_fp.to_string())
            .or_default()
            .push(link);
    }

    #[must_use]
    pub fn is_visited(&self, fp: &str) -> bool {
        self.inner.read().visited.contains(fp)
    }

    #[must_use]
    pub fn outlinks(&self, fp: &str) -> Vec<Link> {
        self.inner.read().outlinks.get(fp).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn inlinks(&self, fp: &str) -> Vec<String> {
        self.inner.read().inlinks.get(fp).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn page_meta(&self, fp: &str) -> Option<PageResult> {
        self.inner.read().page_meta.get(fp).cloned()
    }

    /// Fingerprints currently accepted but not yet fetched.
    #[must_use]
    pub fn queue_snapshot(&self) -> Vec<String> {
        self.inner.read().queued.iter().cloned().collect()
    }

    /// First-seen discovery order, truncated to `limit` entries.
    #[must_use]
    pub fn discovered_snapshot(&self, limit: usize) -> Vec<String> {
        let inner = self.inner.read();
        inner.discovered_order.iter().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            visited: inner.visited.len(),
            queued: inner.queued.len(),
            in_flight: inner.in_flight.len(),
            discovered: inner.discovered.len(),
            html_pages: inner.html_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::page::{Indexability, PageResult};
    use crate::extract::schema::{LinkPosition, LinkType, UrlAction};

    fn page(url: &str) -> PageResult {
        PageResult {
            url: url.to_string(),
            status: 200,
            content_type: "text/html".to_string(),
            title: String::new(),
            meta_description: None,
            content_hash: None,
            indexable: Indexability::Yes,
            robots_flagged: false,
            internal_links: Vec::new(),
            external_links: Vec::new(),
            resources: Vec::new(),
            error: None,
        }
    }

    fn link(url: &str) -> Link {
        Link {
            url: url.to_string(),
            link_type: LinkType::Anchor,
            anchor_text: String::new(),
            context: String::new(),
            is_internal: true,
            status: None,
            position: LinkPosition::Unknown,
            dom_path: String::new(),
            url_action: UrlAction::Crawl,
            nofollow: false,
        }
    }

    #[test]
    fn reserve_transitions() {
        let store = UrlStore::new(false);
        assert_eq!(store.try_reserve("a"), ReserveOutcome::Accepted);
        assert_eq!(store.try_reserve("a"), ReserveOutcome::AlreadyQueued);
        store.mark_in_flight("a");
        assert_eq!(store.try_reserve("a"), ReserveOutcome::AlreadyInFlight);
        store.complete_visit("a", page("http://h.test/a"));
        assert_eq!(store.try_reserve("a"), ReserveOutcome::AlreadyVisited);
    }

    #[test]
    fn revisit_flag_allows_second_pass() {
        let store = UrlStore::new(true);
        assert_eq!(store.try_reserve("a"), ReserveOutcome::Accepted);
        store.mark_in_flight("a");
        store.complete_visit("a", page("http://h.test/a"));
        // Visited no longer blocks, but queued/in-flight still do.
        assert_eq!(store.try_reserve("a"), ReserveOutcome::Accepted);
        assert_eq!(store.try_reserve("a"), ReserveOutcome::AlreadyQueued);
    }

    #[test]
    fn redirect_hops_stay_unvisited_until_finalized() {
        let store = UrlStore::new(false);
        store.try_reserve("start");
        store.mark_in_flight("start");
        store.record_redirect_hop("start", "mid");
        store.record_redirect_hop("mid", "end");
        assert!(!store.is_visited("start"));
        assert!(!store.is_visited("mid"));

        store.complete_visit("end", page("http://h.test/end"));
        let chain = store.finalize_redirect_chain("end");
        assert_eq!(chain, vec!["start".to_string(), "mid".to_string()]);
        assert!(store.is_visited("start"));
        assert!(store.is_visited("mid"));
        assert!(store.is_visited("end"));
        // Chain storage is cleared on finalization.
        assert!(store.finalize_redirect_chain("end").is_empty());
    }

    #[test]
    fn link_graph_is_bidirectional() {
        let store = UrlStore::new(false);
        store.add_link("page", link("http://h.test/x"));
        store.add_link("page", link("http://h.test/y"));
        store.add_link("other", link("http://h.test/x"));
        assert_eq!(store.outlinks("page").len(), 2);
        assert_eq!(
            store.inlinks("http://h.test/x"),
            vec!["page".to_string(), "other".to_string()]
        );
    }

    #[test]
    fn stats_track_discovery_and_html() {
        let store = UrlStore::new(false);
        store.try_reserve("a");
        store.add_link("a", link("http://h.test/b"));
        store.mark_in_flight("a");
        store.complete_visit("a", page("http://h.test/a"));
        let stats = store.stats();
        assert_eq!(stats.visited, 1);
        assert_eq!(stats.discovered, 2);
        assert_eq!(stats.html_pages, 1);
        assert_eq!(stats.in_flight, 0);
    }
}
