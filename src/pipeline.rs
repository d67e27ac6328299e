//! Per-site review runs: resolve the product, page through its reviews and
//! keep every in-range, first-seen review in extraction order.

use chrono::NaiveDate;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::behavior::{HumanBehavior, NoBehavior};
use crate::date::DateNormalizer;
use crate::dedup::DedupEngine;
use crate::error::{Result, ScrapeError};
use crate::extract::FieldExtractor;
use crate::pagination::{CancelToken, PaginationController, PaginationState};
use crate::review::{Review, ReviewDate};
use crate::selectors::{canonical_site, SiteSelectors};
use crate::session::BrowserSession;
use crate::settings::ScraperSettings;

/// Outcome of one site run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub site: String,
    pub reviews: Vec<Review>,
    /// Terminal pagination state: `Done` or `Aborted`
    pub state: PaginationState,
    /// Listing pages that produced review blocks
    pub pages: u32,
    /// Blocks dropped for falling outside the date range
    pub out_of_range: usize,
    /// Blocks dropped as repeats
    pub duplicates: usize,
}

impl RunReport {
    fn empty(run_id: Uuid, site: &str, state: PaginationState) -> Self {
        Self {
            run_id,
            site: site.to_string(),
            reviews: Vec::new(),
            state,
            pages: 0,
            out_of_range: 0,
            duplicates: 0,
        }
    }
}

pub struct ReviewPipeline {
    settings: ScraperSettings,
    normalizer: DateNormalizer,
    behavior: Box<dyn HumanBehavior>,
    cancel: CancelToken,
}

impl ReviewPipeline {
    pub fn new(settings: ScraperSettings) -> Self {
        Self {
            settings,
            normalizer: DateNormalizer::system(),
            behavior: Box::new(NoBehavior),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: DateNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_behavior(mut self, behavior: Box<dyn HumanBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    /// Handle that stops this pipeline between page fetches.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Scrape one site for `company_or_url`, keeping reviews dated within
    /// `[start, end]` and reviews whose date could not be parsed.
    ///
    /// An unresolvable product yields an empty report. Errors are session
    /// failures and an inverted range.
    pub async fn run<S: BrowserSession>(
        &mut self,
        session: &mut S,
        site: &str,
        company_or_url: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RunReport> {
        if end < start {
            return Err(ScrapeError::InvalidRange { start, end });
        }

        let selectors = SiteSelectors::resolve(site, &self.settings.selectors_dir);
        let run_id = Uuid::new_v4();
        let span = info_span!("review_run", %run_id, site = %selectors.site);

        self.run_with(session, &selectors, run_id, company_or_url, start, end)
            .instrument(span)
            .await
    }

    async fn run_with<S: BrowserSession>(
        &mut self,
        session: &mut S,
        selectors: &SiteSelectors,
        run_id: Uuid,
        company_or_url: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RunReport> {
        info!("🚀 Scraping {} reviews for '{}' ({} to {})", selectors.site, company_or_url, start, end);

        let mut controller = PaginationController::new(selectors, self.settings.pacing());
        let Some(target) = controller.resolve(session, company_or_url)? else {
            warn!("⚠️ {}: could not resolve a product for '{}'", selectors.site, company_or_url);
            return Ok(RunReport::empty(run_id, &selectors.site, controller.state()));
        };

        let extractor = FieldExtractor::new(selectors);
        let mut dedup = DedupEngine::new();
        let mut report = RunReport::empty(run_id, &selectors.site, controller.state());

        while let Some(page) = controller.next_page(session, &self.cancel).await? {
            report.pages += 1;
            for block in &page.blocks {
                let mut review = extractor.extract(&*session, block);
                review.source = selectors.site.clone();
                review.source_url = page.url.clone();
                review.product_url = target.product_url.clone();
                review.date = review.raw_date.as_deref().map(|raw| match self.normalizer.parse(raw) {
                    Some(date) => ReviewDate::Parsed(date),
                    None => ReviewDate::Raw(raw.to_string()),
                });

                if let Some(date) = review.date.as_ref().and_then(ReviewDate::parsed) {
                    if date < start || date > end {
                        debug!("Skipping review dated {} (outside range)", date);
                        report.out_of_range += 1;
                        continue;
                    }
                }
                if !dedup.should_keep(&review) {
                    debug!("Skipping duplicate review {:?}", review.title);
                    report.duplicates += 1;
                    continue;
                }
                report.reviews.push(review);
            }
            debug!("Page {}: {} reviews kept so far", page.page, report.reviews.len());

            let pause = self.behavior.between_pages(session);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        report.state = controller.state();
        match report.state {
            PaginationState::Aborted => warn!(
                "🛑 {}: aborted after {} pages with {} reviews",
                report.site,
                report.pages,
                report.reviews.len()
            ),
            _ => info!(
                "✅ {}: {} reviews from {} pages ({} out of range, {} duplicates)",
                report.site,
                report.reviews.len(),
                report.pages,
                report.out_of_range,
                report.duplicates
            ),
        }
        Ok(report)
    }

    /// Run every site in order over one session and concatenate the results.
    pub async fn run_sites<S: BrowserSession>(
        &mut self,
        session: &mut S,
        sites: &[String],
        company_or_url: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Review>> {
        if end < start {
            return Err(ScrapeError::InvalidRange { start, end });
        }

        let mut reviews = Vec::new();
        for site in sites {
            if self.cancel.is_cancelled() {
                warn!("🛑 Cancelled, skipping remaining sites");
                break;
            }
            let report = self.run(session, site, company_or_url, start, end).await?;
            reviews.extend(report.reviews);
        }
        Ok(reviews)
    }
}

/// Split a comma-separated source argument into canonical site tags,
/// dropping blanks and repeats.
pub fn parse_sites(raw: &str) -> Vec<String> {
    let mut sites: Vec<String> = Vec::new();
    for site in raw.split(',').map(canonical_site).filter(|s| !s.is_empty()) {
        if !sites.contains(&site) {
            sites.push(site);
        }
    }
    sites
}
