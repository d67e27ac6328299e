//! Rendered-page snapshots and element handles.
//!
//! Both session implementations hand out [`Element`] handles that point into
//! the snapshot taken for the current page. A handle from an earlier page is
//! stale and every read through it fails with [`LookupError::Stale`].

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::selectors::SelectorList;

/// Handle to an element of a page snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    generation: u64,
    node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("stale element reference (page changed since lookup)")]
    Stale,
    #[error("no page loaded")]
    NoPage,
}

pub struct DomSnapshot {
    generation: u64,
    document: Html,
}

impl DomSnapshot {
    pub fn parse(generation: u64, html: &str) -> Self {
        Self {
            generation,
            document: Html::parse_document(html),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn title(&self) -> Option<String> {
        let selector = compile("title")?;
        self.document
            .select(&selector)
            .next()
            .map(|el| collapse_whitespace(el.text()))
            .filter(|t| !t.is_empty())
    }

    /// All matches of the first selector in `selectors` that matches anything.
    pub fn select_all(&self, selectors: &SelectorList) -> Vec<Element> {
        for raw in selectors.iter() {
            let Some(selector) = compile(raw) else { continue };
            let found: Vec<Element> = self
                .document
                .select(&selector)
                .map(|el| self.handle(el))
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// First descendant of `scope` matched by the earliest matching selector.
    pub fn select_first(
        &self,
        scope: &Element,
        selectors: &SelectorList,
    ) -> Result<Option<Element>, LookupError> {
        let scope = self.resolve(scope)?;
        Ok(selectors.iter().find_map(|raw| {
            let selector = compile(raw)?;
            scope.select(&selector).next().map(|el| self.handle(el))
        }))
    }

    pub fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>, LookupError> {
        let el = self.resolve(element)?;
        Ok(el.value().attr(name).map(str::to_string))
    }

    /// Visible text with whitespace runs collapsed to single spaces.
    pub fn text(&self, element: &Element) -> Result<String, LookupError> {
        let el = self.resolve(element)?;
        Ok(collapse_whitespace(el.text()))
    }

    fn handle(&self, el: ElementRef<'_>) -> Element {
        Element {
            generation: self.generation,
            node: el.id(),
        }
    }

    fn resolve(&self, element: &Element) -> Result<ElementRef<'_>, LookupError> {
        if element.generation != self.generation {
            return Err(LookupError::Stale);
        }
        self.document
            .tree
            .get(element.node)
            .and_then(ElementRef::wrap)
            .ok_or(LookupError::Stale)
    }
}

fn compile(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(selector) => Some(selector),
        Err(e) => {
            debug!("Skipping unparseable selector '{}': {:?}", raw, e);
            None
        }
    }
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head><title> Acme  Reviews </title></head><body>
          <div class="review" data-id="1"><h3>First</h3><p>Good
             tool</p></div>
          <div class="review" data-id="2"><h3>Second</h3></div>
          <article><h3>Not a review div</h3></article>
        </body></html>"#;

    #[test]
    fn first_matching_selector_wins() {
        let snapshot = DomSnapshot::parse(1, PAGE);
        let blocks = snapshot.select_all(&SelectorList::parse(".missing, div.review, article"));
        assert_eq!(blocks.len(), 2);
        assert_eq!(snapshot.attribute(&blocks[1], "data-id").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn invalid_selectors_are_skipped() {
        let snapshot = DomSnapshot::parse(1, PAGE);
        let blocks = snapshot.select_all(&["div[", "article"].into_iter().collect::<SelectorList>());
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn scoped_lookup_and_text() {
        let snapshot = DomSnapshot::parse(1, PAGE);
        let blocks = snapshot.select_all(&SelectorList::parse("div.review"));
        let body = snapshot
            .select_first(&blocks[0], &SelectorList::parse("p"))
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.text(&body).unwrap(), "Good tool");
        let missing = snapshot.select_first(&blocks[1], &SelectorList::parse("p")).unwrap();
        assert!(missing.is_none());
        assert_eq!(snapshot.title().as_deref(), Some("Acme Reviews"));
    }

    #[test]
    fn handles_from_an_older_snapshot_are_stale() {
        let old = DomSnapshot::parse(1, PAGE);
        let block = old.select_all(&SelectorList::parse("div.review"))[0];
        let new = DomSnapshot::parse(2, PAGE);
        assert_eq!(new.text(&block), Err(LookupError::Stale));
        assert_eq!(new.attribute(&block, "data-id"), Err(LookupError::Stale));
    }
}
