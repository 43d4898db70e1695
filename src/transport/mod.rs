//! HTTP transport: single-hop round trips, proxy rotation, cookie jar.
//!
//! The transport never follows redirects on its own; the collector drives
//! the hop loop so every 3xx can be surfaced to the redirect hooks. All
//! clients (direct and per-proxy) share one cookie jar, so cookies set on
//! a host persist across requests regardless of which proxy carried them.

pub mod renderer;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use reqwest::cookie::Jar;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

use crate::collector::request::Request;
use crate::config::CrawlConfig;
use crate::error::{CrawlError, CrawlResult};

pub use renderer::{BrowserRenderer, Render, RenderedPage};

/// One hop of a fetch: the transport's view before redirect resolution.
#[derive(Debug)]
pub struct HopResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub url: Url,
    /// Proxy that carried this hop, if any.
    pub proxy: Option<String>,
}

impl HopResponse {
    /// The `Location` target for 3xx responses, resolved against the hop
    /// URL.
    #[must_use]
    pub fn redirect_target(&self) -> Option<Url> {
        if !(300..400).contains(&self.status) {
            return None;
        }
        let location = self
            .headers
            .get(reqwest::header::LOCATION)?
            .to_str()
            .ok()?;
        self.url.join(location).ok()
    }
}

/// Minimal fetch capability. Implementations send exactly one request and
/// return whatever the server said, redirects included.
#[async_trait]
pub trait RoundTrip: Send + Sync {
    async fn round_trip(&self, request: &Request, url: &Url) -> CrawlResult<HopResponse>;
}

/// Chooses a proxy for an outgoing request. `None` means direct.
pub trait ProxySelector: Send + Sync {
    fn select(&self, url: &Url) -> Option<String>;
}

/// Default built-in selector: rotate over a fixed list.
pub struct RoundRobinProxy {
    proxies: Vec<String>,
    next: AtomicUsize,
}

impl RoundRobinProxy {
    #[must_use]
    pub fn new(proxies: Vec<String>) -> Self {
        Self {
            proxies,
            next: AtomicUsize::new(0),
        }
    }
}

impl ProxySelector for RoundRobinProxy {
    fn select(&self, _url: &Url) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        self.proxies.get(index).cloned()
    }
}

/// Direct HTTP transport backed by reqwest.
///
/// reqwest pins proxies to clients, so each distinct proxy URL gets its
/// own lazily built client. The shared [`Jar`] keeps the cookie state
/// identical across all of them.
pub struct HttpTransport {
    direct: reqwest::Client,
    proxy_clients: DashMap<String, reqwest::Client>,
    selector: Option<Arc<dyn ProxySelector>>,
    jar: Arc<Jar>,
    user_agent: String,
    timeout: Duration,
    default_headers: HeaderMap,
}

impl HttpTransport {
    pub fn from_config(config: &CrawlConfig) -> Result<Self> {
        let selector: Option<Arc<dyn ProxySelector>> = if config.proxies().is_empty() {
            None
        } else {
            Some(Arc::new(RoundRobinProxy::new(config.proxies().to_vec())))
        };
        Self::new(
            config.user_agent(),
            config.request_timeout(),
            config.headers(),
            selector,
        )
    }

    pub fn new(
        user_agent: &str,
        timeout: Duration,
        headers: &[(String, String)],
        selector: Option<Arc<dyn ProxySelector>>,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name: reqwest::header::HeaderName = name
                .parse()
                .with_context(|| format!("Invalid header name '{name}'"))?;
            let value = value
                .parse()
                .with_context(|| format!("Invalid header value for '{name:?}'"))?;
            default_headers.insert(name, value);
        }

        let jar = Arc::new(Jar::default());
        let direct = build_client(user_agent, timeout, &default_headers, &jar, None)?;

        Ok(Self {
            direct,
            proxy_clients: DashMap::new(),
            selector,
            jar,
            user_agent: user_agent.to_string(),
            timeout,
            default_headers,
        })
    }

    /// Use a custom proxy selection strategy instead of round-robin.
    #[must_use]
    pub fn with_selector(mut self, selector: Arc<dyn ProxySelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// A plain client sharing this transport's identity and cookie jar,
    /// for out-of-band fetches (robots.txt).
    pub fn plain_client(&self) -> Result<reqwest::Client> {
        build_client(
            &self.user_agent,
            self.timeout,
            &self.default_headers,
            &self.jar,
            None,
        )
    }

    fn client_for(&self, proxy: Option<&str>) -> CrawlResult<reqwest::Client> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };
        if let Some(client) = self.proxy_clients.get(proxy) {
            return Ok(client.value().clone());
        }
        let client = build_client(
            &self.user_agent,
            self.timeout,
            &self.default_headers,
            &self.jar,
            Some(proxy),
        )
        .map_err(|e| CrawlError::Network(format!("proxy client for {proxy}: {e}")))?;
        self.proxy_clients
            .insert(proxy.to_string(), client.clone());
        Ok(client)
    }
}

fn build_client(
    user_agent: &str,
    timeout: Duration,
    default_headers: &HeaderMap,
    jar: &Arc<Jar>,
    proxy: Option<&str>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .default_headers(default_headers.clone())
        .cookie_provider(Arc::clone(jar))
        .redirect(reqwest::redirect::Policy::none());
    if let Some(proxy) = proxy {
        builder = builder
            .proxy(reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy '{proxy}'"))?);
    }
    builder.build().context("Failed to build HTTP client")
}

#[async_trait]
impl RoundTrip for HttpTransport {
    async fn round_trip(&self, request: &Request, url: &Url) -> CrawlResult<HopResponse> {
        let proxy = self.selector.as_ref().and_then(|s| s.select(url));
        let client = self.client_for(proxy.as_deref())?;

        let mut builder = client
            .request(request.method.clone(), url.as_str())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        if let Some(proxy) = &proxy {
            debug!(target: "sitehound::transport", "{} {url} via {proxy}", request.method);
        } else {
            debug!(target: "sitehound::transport", "{} {url}", request.method);
        }

        let send = async {
            let response = builder
                .send()
                .await
                .map_err(|e| CrawlError::from_reqwest(&e, url.as_str()))?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let final_url = response.url().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| CrawlError::from_reqwest(&e, url.as_str()))?;
            Ok(HopResponse {
                status,
                headers,
                body: body.to_vec(),
                url: final_url,
                proxy: proxy.clone(),
            })
        };

        tokio::select! {
            result = send => result,
            () = request.cancel.cancelled() => Err(CrawlError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_through_proxies() {
        let selector = RoundRobinProxy::new(vec![
            "http://p1:8080".to_string(),
            "http://p2:8080".to_string(),
        ]);
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(selector.select(&url).as_deref(), Some("http://p1:8080"));
        assert_eq!(selector.select(&url).as_deref(), Some("http://p2:8080"));
        assert_eq!(selector.select(&url).as_deref(), Some("http://p1:8080"));
    }

    #[test]
    fn empty_proxy_list_selects_direct() {
        let selector = RoundRobinProxy::new(Vec::new());
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(selector.select(&url), None);
    }

    #[test]
    fn redirect_target_resolves_relative_location() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::LOCATION, "/intro".parse().unwrap());
        let hop = HopResponse {
            status: 307,
            headers,
            body: Vec::new(),
            url: Url::parse("http://h.test/").unwrap(),
            proxy: None,
        };
        assert_eq!(
            hop.redirect_target().unwrap().as_str(),
            "http://h.test/intro"
        );
    }

    #[test]
    fn non_redirect_status_has_no_target() {
        let hop = HopResponse {
            status: 200,
            headers: HeaderMap::new(),
            body: Vec::new(),
            url: Url::parse("http://h.test/").unwrap(),
            proxy: None,
        };
        assert!(hop.redirect_target().is_none());
    }
}
