//! HTML link/resource extraction and XML path evaluation.
//!
//! [`extract_page`] turns one fetched HTML document into the structured
//! data the crawler assembles page results from: title, meta tags, and a
//! link record for every anchor and resource reference, each tagged with
//! its DOM path and semantic position.

pub mod schema;
pub mod xml;

use log::debug;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::canon::CanonicalUrl;
use schema::{Link, LinkPosition, LinkType, UrlAction};

/// Characters of surrounding text captured around each anchor.
pub const CONTEXT_WINDOW: usize = 80;

/// Everything extraction pulls out of one HTML document.
#[derive(Debug, Default)]
pub struct PageExtract {
    pub title: String,
    pub meta_description: Option<String>,
    /// Raw content of `<meta name=robots>`, if present.
    pub meta_robots: Option<String>,
    pub links: Vec<Link>,
}

/// Extract title, meta tags, anchors, and resource references.
///
/// `is_internal` decides host membership against the crawl's allowed
/// domains. Anchors default to `UrlAction::Crawl` and resources to
/// `UrlAction::Record`; the crawler refines both through scope and
/// framework filters before enqueueing.
pub fn extract_page(html: &str, base: &Url, is_internal: &dyn Fn(&Url) -> bool) -> PageExtract {
    let document = Html::parse_document(html);
    let mut out = PageExtract {
        title: select_text(&document, "title"),
        meta_description: select_attr(&document, "meta[name=description]", "content"),
        meta_robots: select_attr(&document, "meta[name=robots]", "content"),
        links: Vec::new(),
    };

    collect_links(&document, "a[href]", "href", LinkType::Anchor, base, is_internal, &mut out.links);
    collect_links(&document, "img[src]", "src", LinkType::Image, base, is_internal, &mut out.links);
    collect_links(&document, "script[src]", "src", LinkType::Script, base, is_internal, &mut out.links);
    collect_links(
        &document,
        r#"link[rel="stylesheet"][href]"#,
        "href",
        LinkType::Stylesheet,
        base,
        is_internal,
        &mut out.links,
    );

    out
}

fn collect_links(
    document: &Html,
    selector: &str,
    attr: &str,
    link_type: LinkType,
    base: &Url,
    is_internal: &dyn Fn(&Url) -> bool,
    links: &mut Vec<Link>,
) {
    // The selectors are string literals; parse failure is a programmer
    // error caught by the tests below, not a runtime condition.
    let Ok(selector) = Selector::parse(selector) else {
        return;
    };

    for element in document.select(&selector) {
        let Some(reference) = element.value().attr(attr) else {
            continue;
        };
        let url = match CanonicalUrl::parse(reference, Some(base)) {
            Ok(url) => url,
            Err(reason) => {
                debug!(
                    target: "sitehound::extract",
                    "Dropping reference {reference:?} on {base}: {reason}"
                );
                continue;
            }
        };

        let anchor_text = if link_type == LinkType::Anchor {
            collapse_whitespace(&element.text().collect::<String>())
        } else {
            String::new()
        };
        let context = if link_type == LinkType::Anchor {
            context_window(element, &anchor_text)
        } else {
            String::new()
        };
        let nofollow = element
            .value()
            .attr("rel")
            .map(|rel| rel.split_whitespace().any(|token| token == "nofollow"))
            .unwrap_or(false);

        links.push(Link {
            is_internal: is_internal(url.as_url()),
            url: url.as_str().to_string(),
            link_type,
            anchor_text,
            context,
            status: None,
            position: classify_position(element),
            dom_path: dom_path(element),
            url_action: if link_type == LinkType::Anchor {
                UrlAction::Crawl
            } else {
                UrlAction::Record
            },
            nofollow,
        });
    }
}

fn select_text(document: &Html, selector: &str) -> String {
    Selector::parse(selector)
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        })
        .unwrap_or_default()
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Collapse runs of whitespace into single spaces and trim.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Up to [`CONTEXT_WINDOW`] characters on each side of the anchor within
/// its parent's text.
fn context_window(element: ElementRef<'_>, anchor_text: &str) -> String {
    let parent_text = element
        .parent()
        .and_then(ElementRef::wrap)
        .map(|parent| collapse_whitespace(&parent.text().collect::<String>()))
        .unwrap_or_default();
    if parent_text.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = parent_text.chars().collect();
    let anchor_start = if anchor_text.is_empty() {
        0
    } else {
        find_char_offset(&parent_text, anchor_text).unwrap_or(0)
    };
    let start = anchor_start.saturating_sub(CONTEXT_WINDOW);
    let end = (anchor_start + anchor_text.chars().count() + CONTEXT_WINDOW).min(chars.len());
    chars[start..end].iter().collect()
}

/// Char offset of `needle` in `haystack`, if present.
fn find_char_offset(haystack: &str, needle: &str) -> Option<usize> {
    let byte_offset = haystack.find(needle)?;
    Some(haystack[..byte_offset].chars().count())
}

/// Ancestor-chain summary like `html>body>main>article>p>a`.
fn dom_path(element: ElementRef<'_>) -> String {
    let mut names: Vec<&str> = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .map(|el| el.value().name())
        .collect();
    names.reverse();
    names.push(element.value().name());
    names.join(">")
}

/// Derive the semantic position by walking ancestors for landmarks and
/// class/id hints. All candidate signals are gathered first; the
/// highest-priority one wins, so `<nav class="breadcrumb">` classifies as
/// breadcrumbs rather than navigation.
fn classify_position(element: ElementRef<'_>) -> LinkPosition {
    let mut best = LinkPosition::Unknown;

    let chain = std::iter::once(element).chain(element.ancestors().filter_map(ElementRef::wrap));
    for ancestor in chain {
        for candidate in position_signals(ancestor) {
            if priority(candidate) < priority(best) {
                best = candidate;
            }
        }
    }
    best
}

fn priority(position: LinkPosition) -> u8 {
    match position {
        LinkPosition::Breadcrumbs => 0,
        LinkPosition::Pagination => 1,
        LinkPosition::Navigation => 2,
        LinkPosition::Sidebar => 3,
        LinkPosition::Header => 4,
        LinkPosition::Footer => 5,
        LinkPosition::Content => 6,
        LinkPosition::Unknown => 7,
    }
}

fn position_signals(element: ElementRef<'_>) -> Vec<LinkPosition> {
    let mut signals = Vec::new();
    let value = element.value();

    let mut hints = String::new();
    if let Some(id) = value.id() {
        hints.push_str(&id.to_ascii_lowercase());
        hints.push(' ');
    }
    for class in value.classes() {
        hints.push_str(&class.to_ascii_lowercase());
        hints.push(' ');
    }

    if hints.contains("breadcrumb") {
        signals.push(LinkPosition::Breadcrumbs);
    }
    if hints.contains("pagination") || hints.contains("pager") {
        signals.push(LinkPosition::Pagination);
    }
    if hints.contains("sidebar") {
        signals.push(LinkPosition::Sidebar);
    }
    if hints.contains("menu") || hints.contains("navbar") {
        signals.push(LinkPosition::Navigation);
    }

    let role = value.attr("role").unwrap_or_default();
    match value.name() {
        "nav" => signals.push(LinkPosition::Navigation),
        "aside" => signals.push(LinkPosition::Sidebar),
        "header" => signals.push(LinkPosition::Header),
        "footer" => signals.push(LinkPosition::Footer),
        "main" | "article" => signals.push(LinkPosition::Content),
        _ => {}
    }
    match role {
        "navigation" => signals.push(LinkPosition::Navigation),
        "main" => signals.push(LinkPosition::Content),
        _ => {}
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://h.test/page").unwrap()
    }

    fn extract(html: &str) -> PageExtract {
        let base = base();
        extract_page(html, &base, &|url| url.host_str() == Some("h.test"))
    }

    #[test]
    fn anchors_resolve_against_base() {
        let out = extract(r#"<a href="/about">About us</a>"#);
        assert_eq!(out.links.len(), 1);
        assert_eq!(out.links[0].url, "https://h.test/about");
        assert_eq!(out.links[0].anchor_text, "About us");
        assert!(out.links[0].is_internal);
        assert_eq!(out.links[0].url_action, UrlAction::Crawl);
    }

    #[test]
    fn unsupported_schemes_are_dropped() {
        let out = extract(
            r#"<a href="javascript:void(0)">x</a>
               <a href="mailto:a@b.c">mail</a>
               <a href="/keep">keep</a>"#,
        );
        assert_eq!(out.links.len(), 1);
        assert_eq!(out.links[0].url, "https://h.test/keep");
    }

    #[test]
    fn resources_are_recorded_not_crawled() {
        let out = extract(
            r#"<img src="/hero.png">
               <script src="/app.js"></script>
               <link rel="stylesheet" href="/style.css">"#,
        );
        assert_eq!(out.links.len(), 3);
        for link in &out.links {
            assert_eq!(link.url_action, UrlAction::Record);
            assert!(link.anchor_text.is_empty());
        }
        assert_eq!(out.links[0].link_type, LinkType::Image);
        assert_eq!(out.links[1].link_type, LinkType::Script);
        assert_eq!(out.links[2].link_type, LinkType::Stylesheet);
    }

    #[test]
    fn external_hosts_are_flagged() {
        let out = extract(r#"<a href="https://other.test/x">x</a>"#);
        assert!(!out.links[0].is_internal);
    }

    #[test]
    fn title_and_meta_are_extracted() {
        let out = extract(
            r#"<html><head>
                <title>  Widget   Shop </title>
                <meta name="description" content="Widgets for all.">
                <meta name="robots" content="noindex, nofollow">
               </head><body></body></html>"#,
        );
        assert_eq!(out.title, "Widget Shop");
        assert_eq!(out.meta_description.as_deref(), Some("Widgets for all."));
        assert_eq!(out.meta_robots.as_deref(), Some("noindex, nofollow"));
    }

    #[test]
    fn nofollow_rel_is_captured() {
        let out = extract(r#"<a href="/a" rel="sponsored nofollow">a</a><a href="/b">b</a>"#);
        assert!(out.links[0].nofollow);
        assert!(!out.links[1].nofollow);
    }

    #[test]
    fn breadcrumb_class_beats_nav_element() {
        let out = extract(r#"<nav class="breadcrumb"><a href="/x">x</a></nav>"#);
        assert_eq!(out.links[0].position, LinkPosition::Breadcrumbs);
    }

    #[test]
    fn main_article_classifies_as_content() {
        let out = extract(r#"<main><article><a href="/y">y</a></article></main>"#);
        assert_eq!(out.links[0].position, LinkPosition::Content);
    }

    #[test]
    fn footer_links_classify_as_footer() {
        let out = extract(r#"<footer><a href="/z">z</a></footer>"#);
        assert_eq!(out.links[0].position, LinkPosition::Footer);
    }

    #[test]
    fn pagination_beats_navigation() {
        let out = extract(r#"<nav class="pagination"><a href="/page/2">2</a></nav>"#);
        assert_eq!(out.links[0].position, LinkPosition::Pagination);
    }

    #[test]
    fn role_attributes_count_as_landmarks() {
        let out = extract(r#"<div role="navigation"><a href="/n">n</a></div>"#);
        assert_eq!(out.links[0].position, LinkPosition::Navigation);
    }

    #[test]
    fn dom_path_lists_ancestor_chain() {
        let out = extract(r#"<main><article><p><a href="/y">y</a></p></article></main>"#);
        assert_eq!(out.links[0].dom_path, "html>body>main>article>p>a");
    }

    #[test]
    fn context_window_surrounds_anchor() {
        let out = extract(
            r#"<p>Before text leading up to the <a href="/x">anchor label</a> and trailing words after.</p>"#,
        );
        let context = &out.links[0].context;
        assert!(context.contains("anchor label"));
        assert!(context.contains("Before text"));
        assert!(context.contains("trailing words"));
    }

    #[test]
    fn anchor_text_whitespace_is_collapsed() {
        let out = extract("<a href=\"/x\">  spread\n  over \t lines </a>");
        assert_eq!(out.links[0].anchor_text, "spread over lines");
    }
}
