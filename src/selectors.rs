//! Per-site selector configuration.
//!
//! Each site maps logical review fields to ordered selector lists. Values come
//! from `<dir>/<site>_selectors.json` when present and fall back to built-in
//! defaults field by field, so a missing or broken file never stops a run.

use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Ordered alternatives for locating one field; the first one that matches wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectorList(Vec<String>);

impl SelectorList {
    /// Split a selector string on top-level commas.
    ///
    /// Commas nested in `[...]`, `(...)` or quotes stay part of their
    /// selector, so `a[title='x, y'], :is(h2, h3)` yields two entries.
    pub fn parse(raw: &str) -> Self {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;

        for c in raw.chars() {
            match (quote, c) {
                (Some(q), _) if c == q => {
                    quote = None;
                    current.push(c);
                }
                (Some(_), _) => current.push(c),
                (None, '\'' | '"') => {
                    quote = Some(c);
                    current.push(c);
                }
                (None, '[' | '(') => {
                    depth += 1;
                    current.push(c);
                }
                (None, ']' | ')') => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                (None, ',') if depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            }
        }
        parts.push(current);

        SelectorList(
            parts
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: Into<String>> FromIterator<S> for SelectorList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        SelectorList(
            iter.into_iter()
                .map(Into::into)
                .map(|s: String| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Resolved selectors for one site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSelectors {
    /// Canonical site tag, e.g. "g2"
    pub site: String,
    /// Search page with a `{company}` placeholder
    pub search_url_template: Option<String>,
    pub product_link: SelectorList,
    pub review_block: SelectorList,
    pub title: SelectorList,
    pub body: SelectorList,
    pub date: SelectorList,
    pub date_attr_prefer: String,
    pub rating: SelectorList,
    pub rating_attr_prefer: String,
    pub reviewer: SelectorList,
}

/// Canonical tag for a site identifier ("Trust" -> "trustradius").
pub fn canonical_site(site: &str) -> String {
    let site = site.trim().to_ascii_lowercase();
    if site == "trust" {
        "trustradius".to_string()
    } else {
        site
    }
}

impl SiteSelectors {
    /// Built-in selectors for a site. Unknown sites get a generic set without
    /// a search template.
    pub fn defaults(site: &str) -> Self {
        let site = canonical_site(site);
        let list = SelectorList::parse;
        let key = site.clone();
        match key.as_str() {
            "g2" => SiteSelectors {
                search_url_template: Some("https://www.g2.com/search?query={company}".to_string()),
                product_link: list("a[href*='/products/']"),
                review_block: list(
                    "div.paper-review, div.review, li.review-item, article, div[data-testid*='review']",
                ),
                title: list("h3, .review__title, .headline"),
                body: list("div.review__body, .review-body, p, .description"),
                date: list("time, .review-date, .date, .posted-on, .meta, span"),
                date_attr_prefer: "datetime".to_string(),
                rating: list(".rating, [data-rating], .stars, [class*='star']"),
                rating_attr_prefer: "aria-label".to_string(),
                reviewer: list(".consumer-name, .reviewer, .author, .user"),
                site,
            },
            "capterra" => SiteSelectors {
                search_url_template: Some(
                    "https://www.capterra.in/search?search={company}".to_string(),
                ),
                product_link: list(
                    "a[href*='/reviews/'], a[href*='/software/'], a[href*='/p/'], a[href*='/products/']",
                ),
                review_block: list("#reviews > div"),
                title: list("h3"),
                body: list("p"),
                date: list("time, .date"),
                date_attr_prefer: "datetime".to_string(),
                rating: list("[data-rating], .rating, [class*='star']"),
                rating_attr_prefer: "aria-label".to_string(),
                reviewer: list(".reviewer, .user, .author"),
                site,
            },
            "trustradius" => SiteSelectors {
                search_url_template: Some(
                    "https://www.trustradius.com/search?search={company}".to_string(),
                ),
                product_link: list("a[href*='/products/'], a[href*='/product/']"),
                review_block: list(".review, .tr-review, article, li.review"),
                title: list(".review-title, h3"),
                body: list(".review-body, .pros-cons, p"),
                date: list("time, .date, .review-date"),
                date_attr_prefer: "datetime".to_string(),
                rating: list(".rating, [data-rating], [class*='star']"),
                rating_attr_prefer: "aria-label".to_string(),
                reviewer: list(".user, .author, .reviewer"),
                site,
            },
            _ => SiteSelectors {
                search_url_template: None,
                product_link: list("a[href*='/products/'], a[href*='/product/'], a[href*='/reviews/']"),
                review_block: list("[itemprop='review'], .review, article, li.review"),
                title: list("[itemprop='name'], .review-title, h3, h2"),
                body: list("[itemprop='reviewBody'], .review-body, p"),
                date: list("[itemprop='datePublished'], time, .review-date, .date"),
                date_attr_prefer: "datetime".to_string(),
                rating: list("[itemprop='ratingValue'], [data-rating], .rating, [class*='star']"),
                rating_attr_prefer: "aria-label".to_string(),
                reviewer: list("[itemprop='author'], .reviewer, .author, .user"),
                site,
            },
        }
    }

    /// Resolve selectors for `site`, overlaying `<dir>/<site>_selectors.json`
    /// on the defaults. Never fails.
    pub fn resolve(site: &str, dir: &Path) -> Self {
        let mut selectors = Self::defaults(site);
        let path = dir.join(format!("{}_selectors.json", selectors.site));

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No selector file at {} ({}), using defaults", path.display(), e);
                return selectors;
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(entries)) => selectors.apply(&entries),
            Ok(_) => warn!("⚠️ Selector file {} is not a JSON object, using defaults", path.display()),
            Err(e) => warn!("⚠️ Selector file {} is malformed ({}), using defaults", path.display(), e),
        }
        selectors
    }

    /// Overlay configured entries; malformed or empty values keep the default.
    pub fn apply(&mut self, entries: &Map<String, Value>) {
        for (key, value) in entries {
            let applied = match key.as_str() {
                "searchUrlTemplate" => text_value(value)
                    .filter(|t| t.contains("{company}"))
                    .map(|t| self.search_url_template = Some(t))
                    .is_some(),
                "productLink" => set_list(&mut self.product_link, value),
                "reviewBlock" => set_list(&mut self.review_block, value),
                "title" => set_list(&mut self.title, value),
                "body" => set_list(&mut self.body, value),
                "date" => set_list(&mut self.date, value),
                "rating" => set_list(&mut self.rating, value),
                "reviewer" => set_list(&mut self.reviewer, value),
                "dateAttrPrefer" => text_value(value)
                    .map(|t| self.date_attr_prefer = t)
                    .is_some(),
                "ratingAttrPrefer" => text_value(value)
                    .map(|t| self.rating_attr_prefer = t)
                    .is_some(),
                other => {
                    debug!("Ignoring unknown selector key '{}' for {}", other, self.site);
                    continue;
                }
            };
            if !applied {
                warn!("⚠️ Malformed selector entry '{}' for {}, keeping default", key, self.site);
            }
        }
    }
}

fn text_value(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn set_list(target: &mut SelectorList, value: &Value) -> bool {
    let parsed = match value {
        Value::String(s) => SelectorList::parse(s),
        Value::Array(items) => {
            if items.iter().any(|item| !item.is_string()) {
                return false;
            }
            items.iter().filter_map(Value::as_str).collect()
        }
        _ => return false,
    };
    if parsed.is_empty() {
        return false;
    }
    *target = parsed;
    true
}
