//! URL canonicalization and fingerprinting.
//!
//! Every reference discovered during a crawl passes through [`CanonicalUrl::parse`]
//! before it can be queued, deduplicated, or recorded in the link graph. Two
//! URLs with equal fingerprints are the same resource.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Schemes that can never be fetched and are dropped at extraction time.
const UNSUPPORTED_SCHEMES: &[&str] = &["javascript", "mailto", "tel", "data", "ftp", "file"];

/// Why a raw reference was rejected by the canonicalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("malformed reference: {0}")]
    Malformed(String),
    /// Parsed, but has no host to fetch from (e.g. `about:blank`).
    #[error("URL cannot be fetched")]
    NotFetchable,
}

/// An immutable, cheaply-cloneable canonical URL.
///
/// The parsed [`Url`] is shared via `Arc`; the fingerprint is computed once
/// at construction. Equality, hashing, and serialization all go through the
/// fingerprint so the type can key the visited set directly.
#[derive(Debug, Clone)]
pub struct CanonicalUrl {
    url: Arc<Url>,
    fingerprint: Arc<str>,
}

impl CanonicalUrl {
    /// Canonicalize a raw reference, optionally resolved against `base`.
    ///
    /// Normalization applied on top of `url` crate parsing: fragment removal,
    /// alphabetical query ordering, default-port stripping. Scheme and host
    /// arrive lowercased from the parser; trailing slashes are preserved as
    /// written.
    pub fn parse(input: &str, base: Option<&Url>) -> Result<Self, RejectReason> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RejectReason::Malformed("empty reference".into()));
        }

        // Scheme-only rejections happen before resolution so that
        // `javascript:void(0)` on a page never reaches the parser error path.
        if let Some((scheme, _)) = trimmed.split_once(':') {
            let scheme = scheme.to_ascii_lowercase();
            if UNSUPPORTED_SCHEMES.contains(&scheme.as_str()) {
                return Err(RejectReason::UnsupportedScheme(scheme));
            }
        }

        let parsed = match base {
            Some(base) => base.join(trimmed),
            None => Url::parse(trimmed),
        }
        .map_err(|e| RejectReason::Malformed(e.to_string()))?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(RejectReason::UnsupportedScheme(other.to_string())),
        }
        if parsed.host_str().is_none() {
            return Err(RejectReason::NotFetchable);
        }

        Ok(Self::from_normalized(normalize(parsed)))
    }

    /// Wrap an already-parsed URL (e.g. a redirect target from the transport).
    pub fn from_url(url: Url) -> Result<Self, RejectReason> {
        Self::parse(url.as_str(), None)
    }

    fn from_normalized(url: Url) -> Self {
        let fingerprint = fingerprint_of(&url);
        Self {
            url: Arc::new(url),
            fingerprint: fingerprint.into(),
        }
    }

    /// The deduplication key: `scheme://host:port/path?sorted-query`.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    #[must_use]
    pub fn port_or_default(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Resolve a reference against this URL, canonicalizing the result.
    pub fn join(&self, reference: &str) -> Result<Self, RejectReason> {
        Self::parse(reference, Some(&self.url))
    }
}

/// Strip the fragment and sort query parameters alphabetically by key.
/// Parsing already lowercased scheme/host, collapsed dot segments, and
/// dropped default ports, so the result is a fixpoint of this function.
fn normalize(mut url: Url) -> Url {
    url.set_fragment(None);

    if let Some(query) = url.query() {
        if query.is_empty() {
            url.set_query(None);
        } else {
            let mut pairs: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            pairs.sort();
            let sorted = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            url.set_query(Some(&sorted));
        }
    }

    url
}

fn fingerprint_of(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or_default();
    let port = url.port_or_known_default().unwrap_or(0);
    match url.query() {
        Some(q) => format!("{scheme}://{host}:{port}{}?{q}", url.path()),
        None => format!("{scheme}://{host}:{port}{}", url.path()),
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl PartialEq for CanonicalUrl {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for CanonicalUrl {}

impl Hash for CanonicalUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl AsRef<Url> for CanonicalUrl {
    fn as_ref(&self) -> &Url {
        &self.url
    }
}

impl Serialize for CanonicalUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.url.as_str())
    }
}

impl<'de> Deserialize<'de> for CanonicalUrl {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw, None).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_schemes() {
        for input in [
            "javascript:void(0)",
            "mailto:team@example.com",
            "tel:+15551234567",
            "data:text/plain;base64,aGk=",
        ] {
            assert!(matches!(
                CanonicalUrl::parse(input, None),
                Err(RejectReason::UnsupportedScheme(_))
            ));
        }
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            CanonicalUrl::parse("http://exa mple.com/", None),
            Err(RejectReason::Malformed(_))
        ));
        assert!(matches!(
            CanonicalUrl::parse("not a url", None),
            Err(RejectReason::Malformed(_))
        ));
    }

    #[test]
    fn resolves_relative_against_base() {
        let base = Url::parse("https://example.com/docs/guide/").unwrap();
        let url = CanonicalUrl::parse("../api?b=2&a=1", Some(&base)).unwrap();
        assert_eq!(url.as_str(), "https://example.com/docs/api?a=1&b=2");
    }

    #[test]
    fn strips_fragment_and_default_port() {
        let url = CanonicalUrl::parse("HTTP://Example.COM:80/page#section", None).unwrap();
        assert_eq!(url.as_str(), "http://example.com/page");
        assert_eq!(url.fingerprint(), "http://example.com:80/page");
    }

    #[test]
    fn sorts_query_parameters() {
        let a = CanonicalUrl::parse("http://h.test/p?z=1&a=2&m=3", None).unwrap();
        let b = CanonicalUrl::parse("http://h.test/p?a=2&m=3&z=1", None).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.query(), Some("a=2&m=3&z=1"));
    }

    #[test]
    fn preserves_trailing_slash() {
        let with = CanonicalUrl::parse("http://h.test/a/", None).unwrap();
        let without = CanonicalUrl::parse("http://h.test/a", None).unwrap();
        assert_ne!(with.fingerprint(), without.fingerprint());
    }

    #[test]
    fn collapses_dot_segments() {
        let url = CanonicalUrl::parse("http://h.test/a/b/../c/./d", None).unwrap();
        assert_eq!(url.path(), "/a/c/d");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let once = CanonicalUrl::parse("https://Example.com/A/../b?y=2&x=1#frag", None).unwrap();
        let twice = CanonicalUrl::parse(once.as_str(), None).unwrap();
        assert_eq!(once.as_str(), twice.as_str());
        assert_eq!(once.fingerprint(), twice.fingerprint());
    }

    #[test]
    fn fingerprint_distinguishes_ports() {
        let a = CanonicalUrl::parse("http://h.test:8080/p", None).unwrap();
        let b = CanonicalUrl::parse("http://h.test/p", None).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
