//! Headless renderer for client-side-rendered pages.
//!
//! Implements the timed load + scroll + settle heuristic: navigate, wait,
//! run a scripted scroll to the bottom, wait again, then serialize the DOM
//! and report the network URLs the page loaded. Nothing here attempts
//! rendering-correctness parity with a real user session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use url::Url;

use crate::config::RendererConfig;
use crate::error::{CrawlError, CrawlResult};

/// Scroll to the bottom in steps so lazy-loaded content below the fold
/// gets a chance to request its resources.
const SCROLL_SCRIPT: &str = r"
    (async () => {
        const step = window.innerHeight;
        const limit = document.body ? document.body.scrollHeight : 0;
        for (let y = 0; y < limit; y += step) {
            window.scrollTo(0, y);
            await new Promise(r => setTimeout(r, 100));
        }
        window.scrollTo(0, 0);
        return true;
    })()
";

/// Every network request the page issued, from the performance timeline.
const NETWORK_ENTRIES_SCRIPT: &str = r"
    JSON.stringify(performance.getEntriesByType('resource').map(e => e.name))
";

/// Output of one render.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Serialized DOM after the settle wait.
    pub html: String,
    /// Where the browser ended up, when it differs from the input URL.
    pub final_url: Option<String>,
    /// Sub-resource URLs observed during the load. These let the crawler
    /// enumerate resources the plain HTTP path would never see.
    pub network_requests: Vec<String>,
}

/// Optional render capability next to [`super::RoundTrip`].
#[async_trait]
pub trait Render: Send + Sync {
    async fn render(&self, url: &Url) -> CrawlResult<RenderedPage>;
}

/// Find a Chrome/Chromium executable, preferring the `CHROMIUM_PATH`
/// override, then well-known install locations, then `which`.
async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!(
            "CHROMIUM_PATH points to non-existent file: {}",
            path.display()
        );
    }

    let paths = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };
    for path_str in paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
        if let Ok(output) = Command::new("which").arg(cmd).output()
            && output.status.success()
        {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                let path = PathBuf::from(path_str);
                info!("Found browser via 'which': {}", path.display());
                return Ok(path);
            }
        }
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download a managed Chromium when no system browser exists.
async fn download_managed_browser() -> Result<PathBuf> {
    info!("Downloading managed Chromium browser...");
    let cache_dir = std::env::temp_dir().join("sitehound_chromium");
    std::fs::create_dir_all(&cache_dir).context("Failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );
    let revision_info = fetcher.fetch().await.context("Failed to fetch browser")?;
    info!(
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );
    Ok(revision_info.executable_path)
}

/// A launched browser shared by every render in a crawl.
pub struct BrowserRenderer {
    browser: Browser,
    handler_task: JoinHandle<()>,
    config: RendererConfig,
}

impl BrowserRenderer {
    /// Find or download a browser, launch it, and spawn the CDP handler
    /// task that drives the connection.
    pub async fn launch(config: RendererConfig) -> Result<Self> {
        let executable = match find_browser_executable().await {
            Ok(path) => path,
            Err(_) => download_managed_browser().await?,
        };

        let user_data_dir =
            std::env::temp_dir().join(format!("sitehound_chrome_{}", std::process::id()));
        std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

        let mut builder = BrowserConfigBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .window_size(1366, 900)
            .user_data_dir(user_data_dir)
            .chrome_executable(executable)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--mute-audio");
        if config.headless {
            builder = builder.headless_mode(HeadlessMode::default());
        } else {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    // Chrome emits CDP events chromiumoxide can't always
                    // deserialize; those are noise, not failures.
                    let msg = e.to_string();
                    if !msg.contains("data did not match any variant of untagged enum Message") {
                        warn!(target: "sitehound::renderer", "Browser handler error: {msg}");
                    }
                }
            }
            debug!(target: "sitehound::renderer", "Browser handler task completed");
        });

        Ok(Self {
            browser,
            handler_task,
            config,
        })
    }

    /// Close the browser and stop the handler task.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(target: "sitehound::renderer", "Browser close failed: {e}");
        }
        self.handler_task.abort();
        if let Err(e) = self.handler_task.await
            && !e.is_cancelled()
        {
            warn!(target: "sitehound::renderer", "Handler task failed during abort: {e}");
        }
    }

    async fn render_inner(&self, url: &Url) -> Result<RenderedPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to create page")?;

        let result = async {
            page.goto(url.as_str()).await.context("Navigation failed")?;
            page.wait_for_navigation()
                .await
                .context("Page load failed")?;

            tokio::time::sleep(Duration::from_millis(self.config.initial_wait_ms)).await;

            if let Err(e) = page.evaluate(SCROLL_SCRIPT).await {
                debug!(target: "sitehound::renderer", "Scroll script failed on {url}: {e}");
            }
            tokio::time::sleep(Duration::from_millis(self.config.scroll_wait_ms)).await;
            tokio::time::sleep(Duration::from_millis(self.config.final_wait_ms)).await;

            let html = page
                .content()
                .await
                .context("Failed to serialize rendered DOM")?;

            let network_requests = match page.evaluate(NETWORK_ENTRIES_SCRIPT).await {
                Ok(value) => value
                    .into_value::<String>()
                    .ok()
                    .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
                    .unwrap_or_default(),
                Err(e) => {
                    debug!(target: "sitehound::renderer", "Network entries script failed: {e}");
                    Vec::new()
                }
            };

            let final_url = page.url().await.ok().flatten();

            Ok(RenderedPage {
                html,
                final_url,
                network_requests,
            })
        }
        .await;

        if let Err(e) = page.close().await {
            debug!(target: "sitehound::renderer", "Page close failed: {e}");
        }
        result
    }
}

#[async_trait]
impl Render for BrowserRenderer {
    async fn render(&self, url: &Url) -> CrawlResult<RenderedPage> {
        let budget = self.config.total_budget();
        match tokio::time::timeout(budget, self.render_inner(url)).await {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(e)) => Err(CrawlError::Renderer(format!("{url}: {e:#}"))),
            Err(_) => Err(CrawlError::RendererTimeout {
                url: url.to_string(),
                waited_ms: budget.as_millis() as u64,
            }),
        }
    }
}
