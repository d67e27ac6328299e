//! Offline browser session over saved pages.
//!
//! Pages are keyed by URL through [`fixture_key`], so a directory of saved
//! `<key>.html` files can be replayed with `--fixtures`. Unknown URLs load as
//! empty documents, the same as a page without any matching markup.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::dom::{DomSnapshot, Element, LookupError};
use crate::error::{Result, ScrapeError};
use crate::selectors::SelectorList;
use crate::session::BrowserSession;

/// File-name-safe key for a URL: every non-alphanumeric character becomes `_`.
pub fn fixture_key(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Default)]
pub struct FixtureSession {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    failing: HashSet<String>,
    unloadable: HashSet<String>,
    broken_scripts: bool,
    current_url: Option<String>,
    snapshot: Option<DomSnapshot>,
    generation: u64,
    navigations: Vec<String>,
    scripts: Vec<String>,
    scrolls: usize,
    closed: Arc<AtomicBool>,
}

impl FixtureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(fixture_key(url), html.to_string());
        self
    }

    /// Loading `from` lands on `to`, like a search that jumps straight to a
    /// product page.
    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(fixture_key(from), to.to_string());
        self
    }

    /// Loading `url` fails as if the browser had died.
    pub fn failing_at(mut self, url: &str) -> Self {
        self.failing.insert(fixture_key(url));
        self
    }

    /// Loading `url` fails like a dropped connection or a proxy error while
    /// the browser stays usable.
    pub fn unloadable_at(mut self, url: &str) -> Self {
        self.unloadable.insert(fixture_key(url));
        self
    }

    /// Script execution and scrolling fail.
    pub fn with_broken_scripts(mut self) -> Self {
        self.broken_scripts = true;
        self
    }

    /// Load every `*.html` file in `dir`, keyed by file stem.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut session = Self::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            session.pages.insert(stem.to_string(), fs::read_to_string(&path)?);
        }
        debug!("Loaded {} fixture pages from {}", session.pages.len(), dir.display());
        Ok(session)
    }

    /// Every URL passed to `navigate`, in order.
    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }

    pub fn scroll_count(&self) -> usize {
        self.scrolls
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shared flag that flips when the session is closed; stays readable
    /// after the session has been dropped.
    pub fn close_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl BrowserSession for FixtureSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        if self.is_closed() {
            return Err(ScrapeError::Session("session already closed".to_string()));
        }
        self.navigations.push(url.to_string());

        let key = fixture_key(url);
        if self.failing.contains(&key) {
            return Err(ScrapeError::Session(format!(
                "browser connection lost while loading {}",
                url
            )));
        }
        if self.unloadable.contains(&key) {
            self.generation += 1;
            self.snapshot = Some(DomSnapshot::parse(self.generation, ""));
            self.current_url = Some(url.to_string());
            return Err(ScrapeError::PageLoad {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }

        let landed = self.redirects.get(&key).cloned().unwrap_or_else(|| url.to_string());
        let html = match self.pages.get(&fixture_key(&landed)) {
            Some(html) => html.as_str(),
            None => {
                debug!("No fixture for {}, serving an empty page", landed);
                ""
            }
        };

        self.generation += 1;
        self.snapshot = Some(DomSnapshot::parse(self.generation, html));
        self.current_url = Some(landed);
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.current_url.clone()
    }

    fn page_title(&self) -> Option<String> {
        self.snapshot.as_ref().and_then(DomSnapshot::title)
    }

    fn find_all(&mut self, selectors: &SelectorList, _timeout: Duration) -> Vec<Element> {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.select_all(selectors))
            .unwrap_or_default()
    }

    fn find_first(&self, scope: &Element, selectors: &SelectorList) -> Option<Element> {
        self.snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.select_first(scope, selectors).ok().flatten())
    }

    fn attribute(&self, element: &Element, name: &str) -> std::result::Result<Option<String>, LookupError> {
        self.snapshot
            .as_ref()
            .ok_or(LookupError::NoPage)?
            .attribute(element, name)
    }

    fn text(&self, element: &Element) -> std::result::Result<String, LookupError> {
        self.snapshot.as_ref().ok_or(LookupError::NoPage)?.text(element)
    }

    fn execute_script(&mut self, code: &str) -> Result<serde_json::Value> {
        if self.broken_scripts {
            return Err(ScrapeError::Session("script execution failed".to_string()));
        }
        self.scripts.push(code.to_string());
        Ok(serde_json::Value::Null)
    }

    fn scroll_to_bottom(&mut self) -> Result<()> {
        if self.broken_scripts {
            return Err(ScrapeError::Session("scroll script failed".to_string()));
        }
        self.scrolls += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.snapshot = None;
    }
}
