//! XML element-path evaluation for sitemap-style documents.
//!
//! Patterns are slash-separated local names (`urlset/url/loc`). A pattern
//! matches every element whose open-tag stack ends with those segments, so
//! `url/loc` also matches inside nested index structures. Namespace
//! prefixes are ignored; matching uses local names only.

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;

/// One matched element with its accumulated text and attributes.
#[derive(Debug, Clone)]
pub struct XmlNode {
    /// Full element path from the document root, slash-separated.
    pub path: String,
    /// Concatenated, trimmed text content.
    pub text: String,
    pub attributes: Vec<(String, String)>,
}

/// Walk the document and invoke `handler` for every element matching
/// `pattern`. Handlers run in document order.
pub fn for_each_match(
    xml: &str,
    pattern: &str,
    mut handler: impl FnMut(&XmlNode),
) -> Result<()> {
    let segments: Vec<&str> = pattern
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return Ok(());
    }

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    // Text accumulates for the innermost currently-matching element.
    let mut pending: Option<XmlNode> = None;

    loop {
        match reader.read_event().context("Malformed XML")? {
            Event::Start(start) => {
                stack.push(local_name(start.name().as_ref()));
                if stack_matches(&stack, &segments) {
                    pending = Some(XmlNode {
                        path: stack.join("/"),
                        text: String::new(),
                        attributes: collect_attributes(&start)?,
                    });
                }
            }
            Event::Empty(start) => {
                stack.push(local_name(start.name().as_ref()));
                if stack_matches(&stack, &segments) {
                    let node = XmlNode {
                        path: stack.join("/"),
                        text: String::new(),
                        attributes: collect_attributes(&start)?,
                    };
                    handler(&node);
                }
                stack.pop();
            }
            Event::Text(text) => {
                if let Some(node) = &mut pending {
                    let value = text.unescape().context("Invalid XML text")?;
                    if !node.text.is_empty() {
                        node.text.push(' ');
                    }
                    node.text.push_str(value.trim());
                }
            }
            Event::CData(data) => {
                if let Some(node) = &mut pending {
                    let value = String::from_utf8_lossy(&data);
                    if !node.text.is_empty() {
                        node.text.push(' ');
                    }
                    node.text.push_str(value.trim());
                }
            }
            Event::End(_) => {
                if let Some(node) = pending.take() {
                    if node.path == stack.join("/") {
                        handler(&node);
                    } else {
                        // End of a child inside the match; keep collecting.
                        pending = Some(node);
                    }
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}

fn local_name(qname: &[u8]) -> String {
    let name = String::from_utf8_lossy(qname);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn stack_matches(stack: &[String], segments: &[&str]) -> bool {
    if stack.len() < segments.len() {
        return false;
    }
    stack
        .iter()
        .rev()
        .zip(segments.iter().rev())
        .all(|(have, want)| have == want)
}

fn collect_attributes(start: &quick_xml::events::BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.context("Malformed XML attribute")?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .context("Invalid XML attribute value")?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <url><loc>https://h.test/</loc><priority>1.0</priority></url>
            <url><loc>https://h.test/about</loc></url>
        </urlset>"#;

    #[test]
    fn matches_sitemap_locations() {
        let mut found = Vec::new();
        for_each_match(SITEMAP, "urlset/url/loc", |node| {
            found.push(node.text.clone());
        })
        .unwrap();
        assert_eq!(
            found,
            vec![
                "https://h.test/".to_string(),
                "https://h.test/about".to_string()
            ]
        );
    }

    #[test]
    fn suffix_patterns_match_nested_elements() {
        let mut count = 0;
        for_each_match(SITEMAP, "loc", |_| count += 1).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn nonmatching_pattern_finds_nothing() {
        let mut count = 0;
        for_each_match(SITEMAP, "sitemapindex/sitemap/loc", |_| count += 1).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn attributes_are_collected() {
        let xml = r#"<feed><entry><link href="https://h.test/post" rel="alternate"/></entry></feed>"#;
        let mut hrefs = Vec::new();
        for_each_match(xml, "entry/link", |node| {
            if let Some((_, href)) = node.attributes.iter().find(|(k, _)| k == "href") {
                hrefs.push(href.clone());
            }
        })
        .unwrap();
        assert_eq!(hrefs, vec!["https://h.test/post".to_string()]);
    }

    #[test]
    fn namespace_prefixes_are_ignored() {
        let xml = r#"<ns:urlset xmlns:ns="x"><ns:url><ns:loc>https://h.test/a</ns:loc></ns:url></ns:urlset>"#;
        let mut found = Vec::new();
        for_each_match(xml, "urlset/url/loc", |node| found.push(node.text.clone())).unwrap();
        assert_eq!(found, vec!["https://h.test/a".to_string()]);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(for_each_match("<a><b></a>", "a/b", |_| {}).is_err());
    }
}
