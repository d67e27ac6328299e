use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::dom::{Element, LookupError};
use crate::error::Result;
use crate::selectors::SelectorList;

/// Browser operations the extraction pipeline relies on.
///
/// `navigate`, `execute_script` and `scroll_to_bottom` fail only when the
/// browser itself is unusable. Lookups never fail the run: `find_all` returns
/// an empty list on timeout and `find_first` returns `None`; reads through a
/// handle report [`LookupError`] so callers can degrade a single field.
pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<()>;

    fn current_url(&self) -> Option<String>;

    fn page_title(&self) -> Option<String>;

    /// Matches of the first selector that finds anything, waiting up to
    /// `timeout` for the page to render them.
    fn find_all(&mut self, selectors: &SelectorList, timeout: Duration) -> Vec<Element>;

    fn find_first(&self, scope: &Element, selectors: &SelectorList) -> Option<Element>;

    fn attribute(&self, element: &Element, name: &str) -> std::result::Result<Option<String>, LookupError>;

    fn text(&self, element: &Element) -> std::result::Result<String, LookupError>;

    fn execute_script(&mut self, code: &str) -> Result<serde_json::Value>;

    fn scroll_to_bottom(&mut self) -> Result<()>;

    /// Release the browser. Must be safe to call more than once.
    fn close(&mut self);
}

/// Owns a session for the length of a scope and closes it on every exit path.
pub struct SessionGuard<S: BrowserSession> {
    session: S,
}

impl<S: BrowserSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: BrowserSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: BrowserSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}
