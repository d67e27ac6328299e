//! Product resolution and page-by-page fetching of review listings.
//!
//! The controller moves through `Searching -> Fetching(1..=max_pages)` and
//! ends in `Done` or `Aborted`. Every fetch attempt is followed by the
//! politeness delay whatever it returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use url::Url;

use crate::dom::Element;
use crate::error::{Result, ScrapeError};
use crate::selectors::SiteSelectors;
use crate::session::BrowserSession;

/// Path fragments that mark a URL as a product or review page already
const PRODUCT_MARKERS: &[&str] = &["/products/", "/product/", "/reviews", "/software/", "/p/"];

/// Upper bound on the pause after scrolling for lazy-loaded content
pub const MAX_LAZY_LOAD_PAUSE: Duration = Duration::from_millis(1200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Searching,
    Fetching { page: u32 },
    Done,
    Aborted,
}

/// Timing and budget for one pagination stream
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub max_pages: u32,
    pub page_delay: Duration,
    pub link_timeout: Duration,
    pub block_timeout: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            max_pages: 10,
            page_delay: Duration::from_millis(800),
            link_timeout: Duration::from_secs(10),
            block_timeout: Duration::from_secs(15),
        }
    }
}

impl Pacing {
    pub fn lazy_load_pause(&self) -> Duration {
        self.page_delay.min(MAX_LAZY_LOAD_PAUSE)
    }
}

/// Cooperative cancellation, checked between page fetches.
///
/// Clones share the flag, so a handle kept by a signal handler can stop a
/// run that owns another clone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that trips by itself once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Where a product's reviews live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTarget {
    pub product_url: String,
    pub reviews_url: String,
    /// Tried once if `reviews_url` shows no review blocks
    pub fallback_url: Option<String>,
}

impl ReviewTarget {
    pub fn from_product_url(product_url: &str) -> Self {
        let (reviews_url, fallback_url) = normalize_reviews_url(product_url);
        Self {
            product_url: product_url.to_string(),
            reviews_url,
            fallback_url,
        }
    }
}

/// Primary reviews URL for a product page plus an alternate to fall back on.
///
/// - already a reviews URL: used as is, no fallback
/// - `/software/` page: reviews are usually inline, so the page itself is
///   primary and the `/reviews/` substitution is the fallback
/// - anything else: `/reviews` appended, bare product page as fallback
pub fn normalize_reviews_url(product_url: &str) -> (String, Option<String>) {
    if product_url.contains("/reviews") {
        return (product_url.to_string(), None);
    }
    if product_url.contains("/software/") {
        let alternate = product_url.replacen("/software/", "/reviews/", 1);
        return (product_url.to_string(), Some(alternate));
    }
    let reviews = if product_url.ends_with('/') {
        format!("{}reviews", product_url)
    } else {
        format!("{}/reviews", product_url)
    };
    (reviews, Some(product_url.to_string()))
}

/// URL of `page` (1-based) of a review listing.
pub fn page_url(base: &str, page: u32) -> String {
    if page <= 1 {
        return base.to_string();
    }
    match Url::parse(base) {
        Ok(mut url) => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "page")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair("page", &page.to_string());
            url.to_string()
        }
        Err(_) => {
            let sep = if base.contains('?') { '&' } else { '?' };
            format!("{}{}page={}", base, sep, page)
        }
    }
}

fn is_direct_url(company_or_url: &str) -> bool {
    let lower = company_or_url.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn looks_like_product_page(url: &str) -> bool {
    PRODUCT_MARKERS.iter().any(|marker| url.contains(marker))
}

/// One fetched listing page that had review blocks
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub page: u32,
    pub url: String,
    pub blocks: Vec<Element>,
}

pub struct PaginationController<'a> {
    selectors: &'a SiteSelectors,
    pacing: Pacing,
    state: PaginationState,
    target: Option<ReviewTarget>,
    base_url: String,
    fallback_url: Option<String>,
    /// Whether the current base URL has shown any review blocks
    base_yielded: bool,
    attempts: u32,
}

impl<'a> PaginationController<'a> {
    pub fn new(selectors: &'a SiteSelectors, pacing: Pacing) -> Self {
        Self {
            selectors,
            pacing,
            state: PaginationState::Searching,
            target: None,
            base_url: String::new(),
            fallback_url: None,
            base_yielded: false,
            attempts: 0,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn target(&self) -> Option<&ReviewTarget> {
        self.target.as_ref()
    }

    /// Navigations made while fetching pages, fallback retries included
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Resolve the product and move to `Fetching { page: 1 }`.
    ///
    /// `Ok(None)` (state `Done`) when nothing resolvable was found; only
    /// session failures are errors.
    pub fn resolve<S: BrowserSession + ?Sized>(
        &mut self,
        session: &mut S,
        company_or_url: &str,
    ) -> Result<Option<ReviewTarget>> {
        let company_or_url = company_or_url.trim();
        let product_url = if is_direct_url(company_or_url) {
            Some(company_or_url.to_string())
        } else {
            self.search_product(session, company_or_url)?
        };

        let Some(product_url) = product_url else {
            self.state = PaginationState::Done;
            return Ok(None);
        };

        let target = ReviewTarget::from_product_url(&product_url);
        info!("🎯 {}: reviews at {} (product {})", self.selectors.site, target.reviews_url, target.product_url);
        self.base_url = target.reviews_url.clone();
        self.fallback_url = target.fallback_url.clone().filter(|alt| *alt != target.reviews_url);
        self.target = Some(target.clone());
        self.state = PaginationState::Fetching { page: 1 };
        Ok(Some(target))
    }

    fn search_product<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        company: &str,
    ) -> Result<Option<String>> {
        let site = &self.selectors.site;
        let Some(template) = self.selectors.search_url_template.as_deref() else {
            warn!("⚠️ {}: no search URL configured, pass a product URL instead", site);
            return Ok(None);
        };

        let search_url = template.replace("{company}", &urlencoding::encode(company));
        match session.navigate(&search_url) {
            Ok(()) => {}
            Err(ScrapeError::PageLoad { url, reason }) => {
                warn!("⚠️ {}: search page {} did not load: {}", site, url, reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        let current = session.current_url().unwrap_or_else(|| search_url.clone());
        debug!(
            "Opened search {} (now at {}, title {:?})",
            search_url,
            current,
            session.page_title()
        );

        let links = session.find_all(&self.selectors.product_link, self.pacing.link_timeout);
        debug!("{} product link candidates for '{}'", links.len(), company);
        for link in &links {
            let href = match session.attribute(link, "href") {
                Ok(Some(href)) if !href.trim().is_empty() => href,
                _ => continue,
            };
            match Url::parse(&current).and_then(|base| base.join(href.trim())) {
                Ok(resolved) => return Ok(Some(resolved.to_string())),
                Err(e) => debug!("Skipping product link '{}': {}", href, e),
            }
        }

        if looks_like_product_page(&current) {
            debug!("Search landed on a product page: {}", current);
            return Ok(Some(current));
        }

        warn!("⚠️ {}: no product link found for '{}'", site, company);
        Ok(None)
    }

    /// Fetch the next page with review blocks.
    ///
    /// `Ok(None)` once the controller is `Done` or `Aborted`.
    pub async fn next_page<S: BrowserSession + ?Sized>(
        &mut self,
        session: &mut S,
        cancel: &CancelToken,
    ) -> Result<Option<FetchedPage>> {
        loop {
            let page = match self.state {
                PaginationState::Fetching { page } => page,
                PaginationState::Searching | PaginationState::Done | PaginationState::Aborted => {
                    return Ok(None)
                }
            };

            if cancel.is_cancelled() {
                info!("🛑 {}: cancelled before page {}", self.selectors.site, page);
                self.state = PaginationState::Aborted;
                return Ok(None);
            }
            if page > self.pacing.max_pages {
                debug!("Page budget of {} reached", self.pacing.max_pages);
                self.state = PaginationState::Done;
                return Ok(None);
            }

            let url = page_url(&self.base_url, page);
            let blocks = self.fetch(session, &url).await?;

            if !blocks.is_empty() {
                debug!("{} review blocks on {}", blocks.len(), url);
                self.base_yielded = true;
                self.state = PaginationState::Fetching { page: page + 1 };
                return Ok(Some(FetchedPage { page, url, blocks }));
            }

            debug!("No review blocks at {} with {}", url, self.selectors.review_block);
            // Running out of pages on a listing that had reviews is the normal end.
            let fallback = if self.base_yielded { None } else { self.fallback_url.take() };
            match fallback {
                Some(fallback) => {
                    debug!("Retrying page {} on fallback {}", page, fallback);
                    self.base_url = fallback;
                }
                None => {
                    self.state = PaginationState::Done;
                    return Ok(None);
                }
            }
        }
    }

    /// One fetch attempt. A page that fails to load counts as a page without
    /// blocks; only a lost session is an error.
    async fn fetch<S: BrowserSession + ?Sized>(&mut self, session: &mut S, url: &str) -> Result<Vec<Element>> {
        self.attempts += 1;
        let blocks = match session.navigate(url) {
            Ok(()) => {
                if let Err(e) = session.scroll_to_bottom() {
                    debug!("Scroll to bottom failed on {}: {}", url, e);
                }
                tokio::time::sleep(self.pacing.lazy_load_pause()).await;
                session.find_all(&self.selectors.review_block, self.pacing.block_timeout)
            }
            Err(ScrapeError::PageLoad { url, reason }) => {
                warn!("⚠️ Could not load {}: {}", url, reason);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        tokio::time::sleep(self.pacing.page_delay).await;
        Ok(blocks)
    }
}
