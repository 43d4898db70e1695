//! End-to-end crawl scenarios against a local mock server.

use std::sync::Arc;

use sitehound::{
    CanonicalUrl, CrawlConfig, CrawlEvent, CrawlEventBus, CrawlState, Crawler, Framework,
    Indexability, RobotsMode, UrlAction,
};

fn fp(server: &mockito::Server, path: &str) -> String {
    CanonicalUrl::parse(&format!("{}{path}", server.url()), None)
        .unwrap()
        .fingerprint()
        .to_string()
}

fn html_mock(server: &mut mockito::Server, path: &str, body: &str) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(body.to_string())
}

#[tokio::test]
async fn redirect_chain_destination_is_always_crawled() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(307)
        .with_header("location", "/intro")
        .create_async()
        .await;
    let _intro = html_mock(&mut server, "/intro", r#"<a href="/about">about</a>"#)
        .create_async()
        .await;
    let _about = html_mock(&mut server, "/about", "<p>about</p>")
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.state, CrawlState::Done);

    let store = crawler.store();
    // The redirect source is recorded as visited even though the terminal
    // response belonged to the destination.
    assert!(store.is_visited(&fp(&server, "/")));
    let intro = store.page_meta(&fp(&server, "/intro")).expect("/intro crawled");
    assert_eq!(intro.status, 200);
    let about = store.page_meta(&fp(&server, "/about")).expect("/about crawled");
    assert_eq!(about.status, 200);

    // Link-graph symmetry: /about's inlinks name /intro, whose outlinks
    // contain /about.
    let inlinks = store.inlinks(&fp(&server, "/about"));
    assert_eq!(inlinks, vec![fp(&server, "/intro")]);
    assert!(
        store
            .outlinks(&fp(&server, "/intro"))
            .iter()
            .any(|l| l.url.ends_with("/about"))
    );
}

#[tokio::test]
async fn depth_limit_stops_extraction_at_the_leaf() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(&mut server, "/", r#"<a href="/a">a</a>"#)
        .create_async()
        .await;
    let _a = html_mock(&mut server, "/a", r#"<a href="/b">b</a>"#)
        .create_async()
        .await;
    let b = html_mock(&mut server, "/b", "<p>too deep</p>")
        .expect(0)
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .max_depth(1)
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    crawler.run().await.unwrap();

    let store = crawler.store();
    assert_eq!(store.page_meta(&fp(&server, "/a")).unwrap().status, 200);
    assert!(!store.is_visited(&fp(&server, "/b")));
    // Pages at the depth limit are leaves: no outlinks recorded.
    assert!(store.outlinks(&fp(&server, "/a")).is_empty());
    b.assert_async().await;
}

#[tokio::test]
async fn url_filter_whitelist_restricts_the_fetched_set() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(
        &mut server,
        "/",
        r#"<a href="/e1">e</a><a href="/h1">h</a><a href="/x1">x</a>"#,
    )
    .create_async()
    .await;
    let _e1 = html_mock(&mut server, "/e1", "<p>e1</p>").create_async().await;
    let _h1 = html_mock(&mut server, "/h1", "<p>h1</p>").create_async().await;
    let x1 = html_mock(&mut server, "/x1", "<p>x1</p>")
        .expect(0)
        .create_async()
        .await;

    let base = regex::escape(&server.url());
    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .url_filters(vec![
            format!("^{base}/(|e.+)$"),
            format!("^{base}/h.+"),
        ])
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    crawler.run().await.unwrap();

    let store = crawler.store();
    assert_eq!(store.page_meta(&fp(&server, "/")).unwrap().status, 200);
    assert_eq!(store.page_meta(&fp(&server, "/e1")).unwrap().status, 200);
    assert_eq!(store.page_meta(&fp(&server, "/h1")).unwrap().status, 200);
    assert!(store.page_meta(&fp(&server, "/x1")).is_none());
    assert!(!store.is_visited(&fp(&server, "/x1")));
    // The filtered link still exists in the graph, marked record-only.
    let filtered = store
        .outlinks(&fp(&server, "/"))
        .into_iter()
        .find(|l| l.url.ends_with("/x1"))
        .expect("filtered link recorded");
    assert_eq!(filtered.url_action, UrlAction::Record);
    x1.assert_async().await;
}

#[tokio::test]
async fn framework_filter_skips_noise_urls() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(
        &mut server,
        "/",
        r#"<a href="/page?_rsc=abc">payload</a><a href="/page">page</a>"#,
    )
    .create_async()
    .await;
    let _page = html_mock(&mut server, "/page", "<p>page</p>")
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .framework_override(Framework::NextJs)
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    crawler.run().await.unwrap();

    let store = crawler.store();
    assert_eq!(store.page_meta(&fp(&server, "/page")).unwrap().status, 200);
    assert!(!store.is_visited(&fp(&server, "/page?_rsc=abc")));
    let skipped = store
        .outlinks(&fp(&server, "/"))
        .into_iter()
        .find(|l| l.url.contains("_rsc="))
        .expect("skipped link recorded in graph");
    assert_eq!(skipped.url_action, UrlAction::Skip);
    assert_eq!(crawler.detected_framework(), Some(Framework::NextJs));
}

#[tokio::test]
async fn duplicate_links_are_fetched_once() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(
        &mut server,
        "/",
        r#"<a href="/dup">one</a><a href="/dup?">two</a><a href="/dup#frag">three</a>"#,
    )
    .create_async()
    .await;
    let dup = html_mock(&mut server, "/dup", "<p>dup</p>")
        .expect(1)
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    crawler.run().await.unwrap();
    dup.assert_async().await;
}

#[tokio::test]
async fn single_page_mode_records_links_without_following() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(&mut server, "/", r#"<a href="/next">next</a>"#)
        .create_async()
        .await;
    let next = html_mock(&mut server, "/next", "<p>next</p>")
        .expect(0)
        .create_async()
        .await;
    let sitemap = server
        .mock("GET", "/sitemap.xml")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .single_page(true)
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    let summary = crawler.run().await.unwrap();

    assert_eq!(summary.pages_crawled, 1);
    let store = crawler.store();
    let link = store
        .outlinks(&fp(&server, "/"))
        .into_iter()
        .find(|l| l.url.ends_with("/next"))
        .expect("link recorded");
    assert_eq!(link.url_action, UrlAction::Record);
    assert!(!store.is_visited(&fp(&server, "/next")));
    next.assert_async().await;
    sitemap.assert_async().await;
}

#[tokio::test]
async fn meta_and_header_noindex_mark_pages_unindexable() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(
        &mut server,
        "/",
        r#"<a href="/meta">m</a><a href="/header">h</a><a href="/plain">p</a>"#,
    )
    .create_async()
    .await;
    let _meta = html_mock(
        &mut server,
        "/meta",
        r#"<head><meta name="robots" content="noindex"></head><body></body>"#,
    )
    .create_async()
    .await;
    let _header = server
        .mock("GET", "/header")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_header("x-robots-tag", "noindex, nofollow")
        .with_body("<p>h</p>")
        .create_async()
        .await;
    let _plain = html_mock(&mut server, "/plain", "<p>p</p>").create_async().await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    crawler.run().await.unwrap();

    let store = crawler.store();
    assert_eq!(
        store.page_meta(&fp(&server, "/meta")).unwrap().indexable,
        Indexability::No
    );
    assert_eq!(
        store.page_meta(&fp(&server, "/header")).unwrap().indexable,
        Indexability::No
    );
    assert_eq!(
        store.page_meta(&fp(&server, "/plain")).unwrap().indexable,
        Indexability::Yes
    );
}

#[tokio::test]
async fn page_results_carry_title_description_and_hash() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(
        &mut server,
        "/",
        r#"<html><head><title>Widgets</title>
           <meta name="description" content="All the widgets.">
           </head><body><p>hello</p></body></html>"#,
    )
    .create_async()
    .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    crawler.run().await.unwrap();

    let page = crawler.store().page_meta(&fp(&server, "/")).unwrap();
    assert_eq!(page.title, "Widgets");
    assert_eq!(page.meta_description.as_deref(), Some("All the widgets."));
    assert!(page.content_hash.is_some());
    assert_eq!(page.content_type, "text/html");
}

#[tokio::test]
async fn sitemap_locations_are_seeded_into_the_queue() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body(format!(
            "User-agent: *\nAllow: /\nSitemap: {}/sitemap.xml\n",
            server.url()
        ))
        .create_async()
        .await;
    let _map = server
        .mock("GET", "/sitemap.xml")
        .with_status(200)
        .with_header("content-type", "application/xml")
        .with_body(format!(
            r#"<?xml version="1.0"?><urlset><url><loc>{}/from-sitemap</loc></url></urlset>"#,
            server.url()
        ))
        .create_async()
        .await;
    let _root = html_mock(&mut server, "/", "<p>root</p>").create_async().await;
    let _orphan = html_mock(&mut server, "/from-sitemap", "<p>orphan</p>")
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    crawler.run().await.unwrap();

    // The orphan page is reachable only through the sitemap.
    let page = crawler
        .store()
        .page_meta(&fp(&server, "/from-sitemap"))
        .expect("sitemap URL crawled");
    assert_eq!(page.status, 200);
}

#[tokio::test]
async fn crawl_events_cover_the_lifecycle() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(&mut server, "/", r#"<a href="/a">a</a>"#)
        .create_async()
        .await;
    let _a = html_mock(&mut server, "/a", "<p>a</p>").create_async().await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let bus = Arc::new(CrawlEventBus::default());
    let mut receiver = bus.subscribe();
    let crawler = Crawler::new(config).unwrap().with_event_bus(Arc::clone(&bus));
    crawler.run().await.unwrap();

    let mut kinds: Vec<&'static str> = Vec::new();
    let mut pages = 0;
    while let Ok(event) = receiver.try_recv() {
        kinds.push(match event {
            CrawlEvent::Started { .. } => "started",
            CrawlEvent::Request { .. } => "request",
            CrawlEvent::Response { .. } => "response",
            CrawlEvent::Page { .. } => {
                pages += 1;
                "page"
            }
            CrawlEvent::Error { .. } => "error",
            CrawlEvent::Progress { .. } => "progress",
            CrawlEvent::Completed { .. } => "completed",
            CrawlEvent::Shutdown { .. } => "shutdown",
        });
    }

    assert_eq!(kinds.first(), Some(&"started"));
    assert_eq!(pages, 2);
    let completed = kinds.iter().position(|k| *k == "completed").unwrap();
    let shutdown = kinds.iter().position(|k| *k == "shutdown").unwrap();
    assert!(completed < shutdown);
}

#[tokio::test]
async fn cancel_before_run_produces_a_clean_cancelled_state() {
    let mut server = mockito::Server::new_async().await;
    let root = html_mock(&mut server, "/", "<p>never</p>")
        .expect(0)
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    crawler.cancel();
    let summary = crawler.run().await.unwrap();

    assert_eq!(summary.state, CrawlState::Cancelled);
    assert_eq!(summary.pages_crawled, 0);
    root.assert_async().await;
}

#[tokio::test]
async fn error_pages_emit_exactly_one_terminal_result() {
    let mut server = mockito::Server::new_async().await;
    let _root = html_mock(&mut server, "/", r#"<a href="/gone">gone</a>"#)
        .create_async()
        .await;
    let _gone = server
        .mock("GET", "/gone")
        .with_status(404)
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .robots_mode(RobotsMode::Ignore)
        .build()
        .unwrap();
    let crawler = Crawler::new(config).unwrap();
    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.state, CrawlState::Done);

    let gone = crawler.store().page_meta(&fp(&server, "/gone")).unwrap();
    assert_eq!(gone.status, 404);
    assert!(gone.error.as_deref().unwrap_or_default().contains("404"));
    assert_eq!(gone.indexable, Indexability::No);
}
