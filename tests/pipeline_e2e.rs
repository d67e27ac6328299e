use chrono::NaiveDate;
use review_crawler::{
    dedup_key, page_url, BrowserSession, CancelToken, FixtureSession, PaginationState, ReviewDate,
    ReviewPipeline, ScrapeError, ScraperSettings, SessionGuard,
};
use std::collections::HashSet;
use std::time::Duration;

const SEARCH: &str = "https://www.g2.com/search?query=Acme";
const PRODUCT: &str = "https://www.g2.com/products/acme";
const REVIEWS: &str = "https://www.g2.com/products/acme/reviews";

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn settings(max_pages: u32) -> ScraperSettings {
    ScraperSettings {
        max_pages,
        page_delay: Duration::ZERO,
        link_timeout: Duration::ZERO,
        block_timeout: Duration::ZERO,
        selectors_dir: "does-not-exist".into(),
        ..Default::default()
    }
}

fn pipeline(max_pages: u32) -> ReviewPipeline {
    ReviewPipeline::new(settings(max_pages))
        .with_normalizer(review_crawler::DateNormalizer::fixed(ymd(2024, 6, 18)))
}

fn block(title: &str, body: &str, date: &str, reviewer: &str) -> String {
    format!(
        r#"<div class="paper-review">
             <h3>{title}</h3>
             <div class="review__body">{body}</div>
             <time datetime="{date}">{date}</time>
             <span class="reviewer">{reviewer}</span>
           </div>"#
    )
}

fn acme_session(review_page: &str) -> FixtureSession {
    FixtureSession::new()
        .with_page(SEARCH, r#"<a href="/products/acme">Acme</a>"#)
        .with_page(REVIEWS, review_page)
}

#[tokio::test]
async fn g2_acme_keeps_only_reviews_in_range() {
    let page = format!(
        "{}{}",
        block("Inside", "Great", "2024-03-01", "Ann"),
        block("Outside", "Old", "2023-12-31", "Bob")
    );
    let mut session = acme_session(&page);

    let report = pipeline(5)
        .run(&mut session, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    assert_eq!(report.reviews.len(), 1);
    let review = &report.reviews[0];
    assert_eq!(review.title.as_deref(), Some("Inside"));
    assert_eq!(review.date, Some(ReviewDate::Parsed(ymd(2024, 3, 1))));
    assert_eq!(review.source, "g2");
    assert_eq!(review.source_url, REVIEWS);
    assert_eq!(review.product_url, PRODUCT);
    assert_eq!(report.out_of_range, 1);
    assert_eq!(report.state, PaginationState::Done);
}

#[tokio::test]
async fn unparsed_dates_are_kept_raw_and_duplicates_dropped() {
    let page = format!(
        "{}{}{}{}",
        block("A", "Body", "sometime last spring", "Ann"),
        block("A", "Body", "sometime last spring", "Ann"),
        block("B", "Body", "3 months ago", "Cid"),
        block("C", "Body", "2 years ago", "Dee"),
    );
    let mut session = acme_session(&page);

    let report = pipeline(1)
        .run(&mut session, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    let dates: Vec<_> = report.reviews.iter().map(|r| r.date.clone()).collect();
    assert_eq!(
        dates,
        [
            Some(ReviewDate::Raw("sometime last spring".to_string())),
            Some(ReviewDate::Parsed(ymd(2024, 3, 18))),
        ]
    );
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.out_of_range, 1);

    let keys: HashSet<String> = report.reviews.iter().map(dedup_key).collect();
    assert_eq!(keys.len(), report.reviews.len());
}

#[tokio::test]
async fn identical_fixtures_give_identical_output() {
    let mut page = String::new();
    for i in 1..=6 {
        page.push_str(&block(&format!("Review {i}"), "Text", &format!("2024-0{i}-10"), "R"));
    }

    let mut first = acme_session(&page);
    let mut second = acme_session(&page);
    let a = pipeline(3)
        .run(&mut first, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();
    let b = pipeline(3)
        .run(&mut second, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    assert_eq!(a.reviews.len(), 6);
    assert_eq!(a.reviews, b.reviews);
    for review in &a.reviews {
        let date = review.date.as_ref().and_then(ReviewDate::parsed).unwrap();
        assert!(ymd(2024, 1, 1) <= date && date <= ymd(2024, 12, 31));
    }
}

#[tokio::test]
async fn pages_are_followed_in_order_until_an_empty_one() {
    let mut session = acme_session(&block("P1", "x", "2024-02-01", "A"))
        .with_page(&page_url(REVIEWS, 2), &block("P2", "x", "2024-02-02", "A"));

    let report = pipeline(10)
        .run(&mut session, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    let titles: Vec<_> = report.reviews.iter().filter_map(|r| r.title.as_deref()).collect();
    assert_eq!(titles, ["P1", "P2"]);
    assert_eq!(report.pages, 2);
    assert_eq!(report.reviews[1].source_url, "https://www.g2.com/products/acme/reviews?page=2");
}

#[tokio::test]
async fn all_empty_pages_terminate_after_one_fallback() {
    let mut session = FixtureSession::new();

    let report = pipeline(3)
        .run(&mut session, "g2", PRODUCT, ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    assert!(report.reviews.is_empty());
    assert_eq!(report.state, PaginationState::Done);
    assert!(session.navigations().len() <= 3);
    let fallbacks = session.navigations().iter().filter(|u| *u == PRODUCT).count();
    assert_eq!(fallbacks, 1);
}

#[tokio::test]
async fn search_redirect_to_product_page_is_followed() {
    let mut session = FixtureSession::new()
        .with_redirect(SEARCH, PRODUCT)
        .with_page(PRODUCT, "<title>Acme</title><p>No links here</p>")
        .with_page(REVIEWS, &block("Via redirect", "x", "2024-05-05", "A"));

    let report = pipeline(1)
        .run(&mut session, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    assert_eq!(report.reviews.len(), 1);
    assert_eq!(report.reviews[0].product_url, PRODUCT);
}

#[tokio::test]
async fn no_product_link_yields_empty_result() {
    let mut session = FixtureSession::new().with_page(SEARCH, "<p>No results</p>");

    let reviews = pipeline(3)
        .run_sites(&mut session, &["g2".to_string()], "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    assert!(reviews.is_empty());
    assert_eq!(session.navigations(), [SEARCH.to_string()]);
}

#[tokio::test]
async fn cancellation_aborts_and_guard_releases_session() {
    let session = acme_session(&block("T", "x", "2024-02-01", "A"));
    let closed = session.close_flag();
    let cancel = CancelToken::new();
    let mut pipeline = pipeline(3).with_cancel(cancel.clone());

    {
        let mut guard = SessionGuard::new(session);
        cancel.cancel();
        let report = pipeline
            .run(&mut *guard, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
            .await
            .unwrap();
        assert_eq!(report.state, PaginationState::Aborted);
        assert!(report.reviews.is_empty());
    }
    assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn session_failure_propagates_and_session_is_still_released() {
    let session = acme_session(&block("T", "x", "2024-02-01", "A")).failing_at(REVIEWS);
    let closed = session.close_flag();

    let mut guard = SessionGuard::new(session);
    let result = pipeline(3)
        .run(&mut *guard, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await;
    drop(guard);

    assert!(matches!(result, Err(ScrapeError::Session(_))));
    assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn inverted_range_is_rejected_before_navigation() {
    let mut session = acme_session("");
    let result = pipeline(3)
        .run(&mut session, "g2", "Acme", ymd(2024, 12, 31), ymd(2024, 1, 1))
        .await;

    assert!(matches!(result, Err(ScrapeError::InvalidRange { .. })));
    assert!(session.navigations().is_empty());
    assert!(session.current_url().is_none());
}

#[tokio::test]
async fn multiple_sites_concatenate_in_order() {
    let capterra_product = "https://www.capterra.in/reviews/42/acme";
    let mut session = acme_session(&block("From G2", "x", "2024-02-01", "A")).with_page(
        capterra_product,
        r#"<div id="reviews"><div><h3>From Capterra</h3><time datetime="2024-02-03"></time></div></div>"#,
    );

    // A direct URL is shared by every site, so give each site its own run.
    let mut pipeline = pipeline(1);
    let mut reviews = pipeline
        .run_sites(&mut session, &["g2".to_string()], "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();
    reviews.extend(
        pipeline
            .run_sites(
                &mut session,
                &["capterra".to_string()],
                capterra_product,
                ymd(2024, 1, 1),
                ymd(2024, 12, 31),
            )
            .await
            .unwrap(),
    );

    let sources: Vec<_> = reviews.iter().map(|r| (r.source.as_str(), r.title.as_deref())).collect();
    assert_eq!(sources, [("g2", Some("From G2")), ("capterra", Some("From Capterra"))]);
}

#[tokio::test]
async fn run_sites_visits_each_site() {
    let mut session = acme_session(&block("From G2", "x", "2024-02-01", "A"));

    let reviews = pipeline(1)
        .run_sites(
            &mut session,
            &["g2".to_string(), "trustradius".to_string()],
            "Acme",
            ymd(2024, 1, 1),
            ymd(2024, 12, 31),
        )
        .await
        .unwrap();

    assert_eq!(reviews.len(), 1);
    assert!(session
        .navigations()
        .iter()
        .any(|u| u == "https://www.trustradius.com/search?search=Acme"));
}

#[tokio::test]
async fn exhausted_listing_does_not_continue_on_the_product_page() {
    let mut session = acme_session(&block("Real", "x", "2024-02-01", "A")).with_page(
        &page_url(PRODUCT, 2),
        "<article><h3>Pricing</h3></article><article><h3>Alternatives</h3></article>",
    );

    let report = pipeline(10)
        .run(&mut session, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    let titles: Vec<_> = report.reviews.iter().filter_map(|r| r.title.as_deref()).collect();
    assert_eq!(titles, ["Real"]);
    assert_eq!(
        session.navigations(),
        [SEARCH.to_string(), REVIEWS.to_string(), page_url(REVIEWS, 2)]
    );
}

#[tokio::test]
async fn page_that_fails_to_load_does_not_end_a_multi_site_run() {
    let mut session = acme_session(&block("From G2", "x", "2024-02-01", "A"))
        .unloadable_at("https://www.trustradius.com/search?search=Acme");

    let reviews = pipeline(1)
        .run_sites(
            &mut session,
            &["g2".to_string(), "trustradius".to_string()],
            "Acme",
            ymd(2024, 1, 1),
            ymd(2024, 12, 31),
        )
        .await
        .unwrap();

    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].title.as_deref(), Some("From G2"));
}

#[tokio::test]
async fn unloadable_reviews_page_falls_back_to_product_page() {
    let mut session = FixtureSession::new()
        .with_page(SEARCH, r#"<a href="/products/acme">Acme</a>"#)
        .unloadable_at(REVIEWS)
        .with_page(PRODUCT, &block("On product page", "x", "2024-04-04", "A"));

    let report = pipeline(1)
        .run(&mut session, "g2", "Acme", ymd(2024, 1, 1), ymd(2024, 12, 31))
        .await
        .unwrap();

    assert_eq!(report.reviews.len(), 1);
    assert_eq!(report.reviews[0].source_url, PRODUCT);
}
