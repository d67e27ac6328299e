pub mod behavior;
pub mod browser;
pub mod date;
pub mod dedup;
pub mod dom;
pub mod error;
pub mod extract;
pub mod fixture;
pub mod output;
pub mod pagination;
pub mod pipeline;
pub mod review;
pub mod selectors;
pub mod session;
pub mod settings;

pub use behavior::{HumanBehavior, Jitter, NoBehavior};
pub use browser::{ChromeSession, SessionOptions};
pub use date::{Clock, DateNormalizer};
pub use dedup::{dedup_key, DedupEngine};
pub use dom::{Element, LookupError};
pub use error::{Result, ScrapeError};
pub use extract::{extract, FieldExtractor};
pub use fixture::{fixture_key, FixtureSession};
pub use output::{output_file_name, write_reviews};
pub use pagination::{page_url, CancelToken, Pacing, PaginationController, PaginationState, ReviewTarget};
pub use pipeline::{parse_sites, ReviewPipeline, RunReport};
pub use review::{Review, ReviewDate};
pub use selectors::{SelectorList, SiteSelectors};
pub use session::{BrowserSession, SessionGuard};
pub use settings::ScraperSettings;
