use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Scrape failures.
///
/// `PageLoad` is recovered where it happens (an empty page or an unresolved
/// product); the other variants end the invocation. Lookup misses
/// (timeouts, absent elements, absent attributes) are not represented here;
/// they degrade to unset fields or empty pages.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Browser session error: {0}")]
    Session(String),

    /// One page failed to load while the browser itself is still usable.
    #[error("Failed to load {url}: {reason}")]
    PageLoad { url: String, reason: String },

    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    pub fn session(err: impl std::fmt::Display) -> Self {
        ScrapeError::Session(err.to_string())
    }
}
