//! Selector-driven field extraction from a single review block.

use tracing::debug;

use crate::dom::{Element, LookupError};
use crate::review::Review;
use crate::selectors::{SelectorList, SiteSelectors};
use crate::session::BrowserSession;

/// Fallback attribute for dates when the preferred one is missing
pub const SECONDARY_DATE_ATTR: &str = "data-date";
/// Fallback attribute for ratings when the preferred one is missing
pub const SECONDARY_RATING_ATTR: &str = "data-rating";

/// Turns review blocks into partial [`Review`]s.
///
/// Only the page-derived fields are filled in: `title`, `body`, `reviewer`,
/// `rating` and `raw_date`. Date normalization and provenance belong to the
/// caller.
pub struct FieldExtractor<'a> {
    selectors: &'a SiteSelectors,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(selectors: &'a SiteSelectors) -> Self {
        Self { selectors }
    }

    pub fn extract<S: BrowserSession + ?Sized>(&self, session: &S, block: &Element) -> Review {
        let sel = self.selectors;
        let rating_text = attr_or_text(
            session,
            block,
            &sel.rating,
            &sel.rating_attr_prefer,
            SECONDARY_RATING_ATTR,
        );

        Review {
            title: plain_text(session, block, &sel.title),
            body: plain_text(session, block, &sel.body),
            raw_date: attr_or_text(session, block, &sel.date, &sel.date_attr_prefer, SECONDARY_DATE_ATTR),
            reviewer: plain_text(session, block, &sel.reviewer),
            rating: rating_text.as_deref().and_then(parse_rating),
            ..Default::default()
        }
    }
}

/// Extract one block with `selectors`.
pub fn extract<S: BrowserSession + ?Sized>(
    session: &S,
    block: &Element,
    selectors: &SiteSelectors,
) -> Review {
    FieldExtractor::new(selectors).extract(session, block)
}

/// Keep digits and decimal points, then parse. Anything unparseable is `None`.
pub fn parse_rating(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok().filter(|r| r.is_finite())
}

fn plain_text<S: BrowserSession + ?Sized>(
    session: &S,
    block: &Element,
    selectors: &SelectorList,
) -> Option<String> {
    let el = session.find_first(block, selectors)?;
    degrade(session.text(&el), "text").and_then(non_blank)
}

fn attr_or_text<S: BrowserSession + ?Sized>(
    session: &S,
    block: &Element,
    selectors: &SelectorList,
    preferred: &str,
    secondary: &str,
) -> Option<String> {
    let el = session.find_first(block, selectors)?;

    for name in [preferred, secondary] {
        if name.is_empty() {
            continue;
        }
        if let Some(value) = degrade(session.attribute(&el, name), name).flatten().and_then(non_blank) {
            return Some(value);
        }
    }

    degrade(session.text(&el), "text").and_then(non_blank)
}

fn degrade<T>(result: Result<T, LookupError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Field lookup ({}) failed: {}", what, e);
            None
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
