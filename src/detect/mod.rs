//! Site technology detection and framework-aware URL filtering.
//!
//! The first HTML response of a crawl is scored against per-framework
//! signal lists; a framework is declared once its cumulative score reaches
//! [`DETECTION_THRESHOLD`]. The declared framework selects a fixed filter
//! set that suppresses known noise URLs (Next.js `_rsc` payloads,
//! WordPress `replytocom` permutations, and similar) before they are
//! enqueued.

use log::{debug, info};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use crate::extract::schema::UrlAction;

/// Cumulative signal score at which a framework is declared.
pub const DETECTION_THRESHOLD: u32 = 3;

/// Site technologies with dedicated filter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    NextJs,
    Nuxt,
    Gatsby,
    WordPress,
    Drupal,
    Shopify,
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NextJs => "Next.js",
            Self::Nuxt => "Nuxt",
            Self::Gatsby => "Gatsby",
            Self::WordPress => "WordPress",
            Self::Drupal => "Drupal",
            Self::Shopify => "Shopify",
        };
        write!(f, "{name}")
    }
}

/// Body substring weighted toward one framework.
struct Signal {
    needle: &'static str,
    weight: u32,
}

/// Generator-meta substring (matched case-insensitively) with its weight.
struct GeneratorSignal {
    needle: &'static str,
    weight: u32,
}

struct Profile {
    framework: Framework,
    body_signals: &'static [Signal],
    generator: &'static [GeneratorSignal],
}

const PROFILES: &[Profile] = &[
    Profile {
        framework: Framework::NextJs,
        body_signals: &[
            Signal { needle: "/_next/static/", weight: 2 },
            Signal { needle: "id=\"__next\"", weight: 2 },
            Signal { needle: "self.__next_f", weight: 2 },
            Signal { needle: "/_next/image?", weight: 1 },
        ],
        generator: &[GeneratorSignal { needle: "next.js", weight: 3 }],
    },
    Profile {
        framework: Framework::Nuxt,
        body_signals: &[
            Signal { needle: "/_nuxt/", weight: 2 },
            Signal { needle: "id=\"__nuxt\"", weight: 2 },
            Signal { needle: "window.__NUXT__", weight: 2 },
        ],
        generator: &[GeneratorSignal { needle: "nuxt", weight: 3 }],
    },
    Profile {
        framework: Framework::Gatsby,
        body_signals: &[
            Signal { needle: "id=\"___gatsby\"", weight: 2 },
            Signal { needle: "/page-data/", weight: 2 },
            Signal { needle: "window.___chunkMapping", weight: 1 },
        ],
        generator: &[GeneratorSignal { needle: "gatsby", weight: 3 }],
    },
    Profile {
        framework: Framework::WordPress,
        body_signals: &[
            Signal { needle: "/wp-content/", weight: 2 },
            Signal { needle: "/wp-includes/", weight: 2 },
            Signal { needle: "/wp-json/", weight: 1 },
        ],
        generator: &[GeneratorSignal { needle: "wordpress", weight: 3 }],
    },
    Profile {
        framework: Framework::Drupal,
        body_signals: &[
            Signal { needle: "/sites/default/files/", weight: 2 },
            Signal { needle: "data-drupal-selector", weight: 2 },
            Signal { needle: "drupal-settings-json", weight: 2 },
        ],
        generator: &[GeneratorSignal { needle: "drupal", weight: 3 }],
    },
    Profile {
        framework: Framework::Shopify,
        body_signals: &[
            Signal { needle: "cdn.shopify.com", weight: 2 },
            Signal { needle: "Shopify.theme", weight: 2 },
            Signal { needle: "/cdn/shop/", weight: 1 },
        ],
        generator: &[GeneratorSignal { needle: "shopify", weight: 3 }],
    },
];

/// URL substring mapped to an action.
pub struct FilterRule {
    pub needle: &'static str,
    pub action: UrlAction,
}

/// Query-parameter key mapped to an action.
pub struct ParamRule {
    pub key: &'static str,
    pub action: UrlAction,
}

/// Noise-suppression rules for one framework.
pub struct FilterSet {
    url_patterns: &'static [FilterRule],
    query_params: &'static [ParamRule],
}

impl FilterSet {
    /// Decide what to do with a candidate URL. `Crawl` means no rule
    /// matched and normal scope rules apply.
    #[must_use]
    pub fn evaluate(&self, url: &Url) -> UrlAction {
        for param in url.query_pairs() {
            if let Some(rule) = self.query_params.iter().find(|r| r.key == param.0) {
                return rule.action;
            }
        }
        let full = url.as_str();
        for rule in self.url_patterns {
            if full.contains(rule.needle) {
                return rule.action;
            }
        }
        UrlAction::Crawl
    }
}

const NEXTJS_FILTERS: FilterSet = FilterSet {
    url_patterns: &[
        FilterRule { needle: "/_next/data/", action: UrlAction::Record },
        FilterRule { needle: "/_next/static/", action: UrlAction::Record },
        FilterRule { needle: "/__nextjs", action: UrlAction::Skip },
    ],
    query_params: &[ParamRule { key: "_rsc", action: UrlAction::Skip }],
};

const NUXT_FILTERS: FilterSet = FilterSet {
    url_patterns: &[
        FilterRule { needle: "/_nuxt/", action: UrlAction::Record },
        FilterRule { needle: "/_payload.json", action: UrlAction::Record },
    ],
    query_params: &[],
};

const GATSBY_FILTERS: FilterSet = FilterSet {
    url_patterns: &[
        FilterRule { needle: "/page-data/", action: UrlAction::Record },
        FilterRule { needle: "/static/d/", action: UrlAction::Record },
    ],
    query_params: &[],
};

const WORDPRESS_FILTERS: FilterSet = FilterSet {
    url_patterns: &[
        FilterRule { needle: "/wp-json/", action: UrlAction::Record },
        FilterRule { needle: "/xmlrpc.php", action: UrlAction::Skip },
        FilterRule { needle: "/wp-login.php", action: UrlAction::Skip },
    ],
    query_params: &[ParamRule { key: "replytocom", action: UrlAction::Skip }],
};

const DRUPAL_FILTERS: FilterSet = FilterSet {
    url_patterns: &[FilterRule {
        needle: "/core/assets/",
        action: UrlAction::Record,
    }],
    query_params: &[],
};

const SHOPIFY_FILTERS: FilterSet = FilterSet {
    url_patterns: &[FilterRule {
        needle: "/cdn/shop/",
        action: UrlAction::Record,
    }],
    query_params: &[ParamRule { key: "pr_prod_strat", action: UrlAction::Skip }],
};

impl Framework {
    #[must_use]
    pub fn filters(&self) -> &'static FilterSet {
        match self {
            Self::NextJs => &NEXTJS_FILTERS,
            Self::Nuxt => &NUXT_FILTERS,
            Self::Gatsby => &GATSBY_FILTERS,
            Self::WordPress => &WORDPRESS_FILTERS,
            Self::Drupal => &DRUPAL_FILTERS,
            Self::Shopify => &SHOPIFY_FILTERS,
        }
    }
}

/// Score one HTML document against every profile.
///
/// Exposed for tests; crawl code goes through [`FrameworkDetector`].
#[must_use]
pub fn classify(html: &str) -> Option<Framework> {
    let generator = extract_generator(html).map(|g| g.to_ascii_lowercase());

    let mut best: Option<(Framework, u32)> = None;
    for profile in PROFILES {
        let mut score = 0;
        for signal in profile.body_signals {
            if html.contains(signal.needle) {
                score += signal.weight;
            }
        }
        if let Some(generator) = &generator {
            for signal in profile.generator {
                if generator.contains(signal.needle) {
                    score += signal.weight;
                }
            }
        }
        if score >= DETECTION_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
            best = Some((profile.framework, score));
        }
    }
    best.map(|(framework, _)| framework)
}

fn extract_generator(html: &str) -> Option<String> {
    // Cheap pre-check keeps full HTML parsing off pages without the tag.
    if !html.contains("generator") {
        return None;
    }
    let selector = Selector::parse("meta[name=generator]").ok()?;
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

/// Per-crawl detector. Scores exactly one document (the first HTML
/// response) and caches the verdict, declared or not.
pub struct FrameworkDetector {
    result: OnceLock<Option<Framework>>,
}

impl FrameworkDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            result: OnceLock::new(),
        }
    }

    /// Detector pinned to a manually chosen framework.
    #[must_use]
    pub fn with_override(framework: Framework) -> Self {
        let result = OnceLock::new();
        let _ = result.set(Some(framework));
        Self { result }
    }

    /// Feed the first HTML response. Later calls are no-ops.
    pub fn observe(&self, html: &str, url: &Url) -> Option<Framework> {
        *self.result.get_or_init(|| {
            let detected = classify(html);
            match detected {
                Some(framework) => info!(
                    target: "sitehound::detect",
                    "Detected {framework} from first HTML response ({url})"
                ),
                None => debug!(
                    target: "sitehound::detect",
                    "No framework crossed threshold on {url}"
                ),
            }
            detected
        })
    }

    /// The cached verdict, if detection has run.
    #[must_use]
    pub fn framework(&self) -> Option<Framework> {
        self.result.get().copied().flatten()
    }

    /// Apply the detected framework's filters to a candidate URL.
    /// `Crawl` when nothing was detected or no rule matches.
    #[must_use]
    pub fn evaluate_url(&self, url: &Url) -> UrlAction {
        match self.framework() {
            Some(framework) => framework.filters().evaluate(url),
            None => UrlAction::Crawl,
        }
    }
}

impl Default for FrameworkDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEXT_PAGE: &str = r#"<html><body>
        <div id="__next"><a href="/a">a</a></div>
        <script src="/_next/static/chunks/main.js"></script>
        </body></html>"#;

    #[test]
    fn detects_nextjs_from_asset_signals() {
        assert_eq!(classify(NEXT_PAGE), Some(Framework::NextJs));
    }

    #[test]
    fn detects_wordpress_from_generator_meta() {
        let html = r#"<html><head>
            <meta name="generator" content="WordPress 6.4.2">
            </head><body></body></html>"#;
        assert_eq!(classify(html), Some(Framework::WordPress));
    }

    #[test]
    fn plain_page_stays_undeclared() {
        let html = "<html><body><p>hello</p></body></html>";
        assert_eq!(classify(html), None);
    }

    #[test]
    fn single_weak_signal_is_not_enough() {
        let html = r#"<img src="/_next/image?url=x">"#;
        assert_eq!(classify(html), None);
    }

    #[test]
    fn detector_scores_only_first_document() {
        let detector = FrameworkDetector::new();
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(detector.observe("<html></html>", &url), None);
        // A later Next.js page cannot change the cached verdict.
        assert_eq!(detector.observe(NEXT_PAGE, &url), None);
        assert_eq!(detector.framework(), None);
    }

    #[test]
    fn override_bypasses_detection() {
        let detector = FrameworkDetector::with_override(Framework::NextJs);
        assert_eq!(detector.framework(), Some(Framework::NextJs));
        let rsc = Url::parse("https://example.com/page?_rsc=abc").unwrap();
        assert_eq!(detector.evaluate_url(&rsc), UrlAction::Skip);
        let page = Url::parse("https://example.com/page").unwrap();
        assert_eq!(detector.evaluate_url(&page), UrlAction::Crawl);
    }

    #[test]
    fn wordpress_filters_mark_noise() {
        let filters = Framework::WordPress.filters();
        let reply = Url::parse("https://example.com/post/?replytocom=42").unwrap();
        assert_eq!(filters.evaluate(&reply), UrlAction::Skip);
        let api = Url::parse("https://example.com/wp-json/wp/v2/posts").unwrap();
        assert_eq!(filters.evaluate(&api), UrlAction::Record);
    }
}
