use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use review_crawler::{
    parse_sites, write_reviews, BrowserSession, CancelToken, ChromeSession, FixtureSession, Jitter,
    ReviewPipeline, ScraperSettings, SessionGuard,
};

#[derive(Parser)]
#[command(name = "review-crawler")]
#[command(about = "Scrape product reviews from G2, Capterra and TrustRadius into JSON")]
#[command(version)]
struct Cli {
    /// Company name to search for, or a product/reviews URL
    company: String,

    /// First review date to keep (YYYY-MM-DD)
    start: NaiveDate,

    /// Last review date to keep (YYYY-MM-DD)
    end: NaiveDate,

    /// g2, capterra, trustradius (or trust), comma-separated for several
    source: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Listing pages to fetch per site
    #[arg(long)]
    max_pages: Option<u32>,

    /// Pause after every page fetch, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Directory holding <site>_selectors.json overrides
    #[arg(long)]
    selectors_dir: Option<PathBuf>,

    /// Where the JSON file is written
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Proxy server, e.g. socks5://127.0.0.1:9050
    #[arg(long)]
    proxy: Option<String>,

    /// Replay saved pages from this directory instead of launching Chrome
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Stop fetching new pages after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Simulate mouse movement and scrolling between pages
    #[arg(long)]
    human: bool,
}

impl Cli {
    fn settings(&self) -> ScraperSettings {
        let mut settings = ScraperSettings::from_env();
        if self.headed {
            settings.headless = false;
        }
        if let Some(max_pages) = self.max_pages {
            settings.max_pages = max_pages;
        }
        if let Some(delay_ms) = self.delay_ms {
            settings.page_delay = Duration::from_millis(delay_ms);
        }
        if let Some(ref dir) = self.selectors_dir {
            settings.selectors_dir = dir.clone();
        }
        if let Some(ref dir) = self.out_dir {
            settings.output_dir = dir.clone();
        }
        if self.proxy.is_some() {
            settings.proxy = self.proxy.clone();
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = cli.settings();

    let sites = parse_sites(&cli.source);
    if sites.is_empty() {
        bail!("no source given (expected g2, capterra or trustradius)");
    }
    if cli.end < cli.start {
        bail!("end date {} is before start date {}", cli.end, cli.start);
    }

    let cancel = match cli.deadline_secs {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, finishing the current page");
            ctrl_c.cancel();
        }
    });

    let mut pipeline = ReviewPipeline::new(settings.clone()).with_cancel(cancel);
    if cli.human {
        pipeline = pipeline.with_behavior(Box::new(Jitter::new()));
    }

    let reviews = match cli.fixtures {
        Some(ref dir) => {
            let session = FixtureSession::from_dir(dir)
                .with_context(|| format!("loading fixtures from {}", dir.display()))?;
            scrape(&mut pipeline, session, &sites, &cli).await?
        }
        None => {
            let session = ChromeSession::launch(&settings.session_options()).context("launching Chrome")?;
            scrape(&mut pipeline, session, &sites, &cli).await?
        }
    };

    let path = write_reviews(
        &settings.output_dir,
        &sites.join("-"),
        &cli.company,
        cli.start,
        cli.end,
        &reviews,
    )?;
    info!("Done: {} reviews written to {}", reviews.len(), path.display());
    Ok(())
}

async fn scrape<S: BrowserSession>(
    pipeline: &mut ReviewPipeline,
    session: S,
    sites: &[String],
    cli: &Cli,
) -> Result<Vec<review_crawler::Review>> {
    let mut session = SessionGuard::new(session);
    let reviews = pipeline
        .run_sites(&mut *session, sites, &cli.company, cli.start, cli.end)
        .await?;
    Ok(reviews)
}
