//! Review date normalization.
//!
//! Dates on review sites show up as ISO strings, `datetime` attributes,
//! English month formats, or relative phrases such as "3 months ago".
//! [`DateNormalizer::parse`] tries a fixed ladder of strategies and returns
//! the first calendar date that comes out of it.

use chrono::{Days, Local, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Absolute formats, tried in order before anything else.
pub const ABSOLUTE_FORMATS: &[&str] = &[
    "%Y-%m-%d",  // 2024-06-18
    "%Y/%m/%d",  // 2024/06/18
    "%B %d, %Y", // June 18, 2024
    "%b %d, %Y", // Jun 18, 2024
    "%d %b %Y",  // 18 Jun 2024
    "%d %B %Y",  // 18 June 2024
];

static RELATIVE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(a|an|\d+)\s+(days?|months?|years?)\s+ago\b")
        .expect("relative date pattern is valid")
});

/// Year-first numeric dates must carry two-digit months and days.
static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}[-/]\d{2}[-/]\d{2}$").expect("numeric date pattern is valid"));

static EMBEDDED_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("ISO date pattern is valid"));

/// Source of "today" for relative dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Local wall-clock date, read at each parse
    #[default]
    System,
    /// Pinned date (tests, replays of saved pages)
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(&self) -> NaiveDate {
        match self {
            Clock::System => Local::now().date_naive(),
            Clock::Fixed(date) => *date,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateNormalizer {
    clock: Clock,
}

impl DateNormalizer {
    pub fn system() -> Self {
        Self { clock: Clock::System }
    }

    pub fn fixed(today: NaiveDate) -> Self {
        Self {
            clock: Clock::Fixed(today),
        }
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Parse a raw date string. `None` means no strategy matched; callers keep
    /// the raw text in that case.
    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let numeric = NUMERIC_DATE.is_match(raw);

        // 1. Absolute formats
        if let Some(date) = ABSOLUTE_FORMATS
            .iter()
            .filter(|fmt| numeric || !fmt.starts_with("%Y"))
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        {
            return Some(date);
        }

        // 2. Strict ISO-8601 calendar date
        if numeric {
            if let Ok(date) = raw.parse::<NaiveDate>() {
                return Some(date);
            }
        }

        // 3. Relative phrase
        if let Some(date) = self.parse_relative(raw) {
            return Some(date);
        }

        // 4. ISO date embedded in longer text (timestamps, "Reviewed 2024-01-02")
        EMBEDDED_ISO_DATE
            .find_iter(raw)
            .find_map(|m| m.as_str().parse::<NaiveDate>().ok())
    }

    fn parse_relative(&self, raw: &str) -> Option<NaiveDate> {
        let caps = RELATIVE_DATE.captures(raw)?;
        let quantity_token = caps.get(1)?.as_str().to_ascii_lowercase();
        let unit = caps.get(2)?.as_str().to_ascii_lowercase();

        let quantity: u32 = match quantity_token.as_str() {
            "a" | "an" => 1,
            digits => digits.parse().ok()?,
        };

        let today = self.clock.today();
        if unit.starts_with("day") {
            today.checked_sub_days(Days::new(u64::from(quantity)))
        } else if unit.starts_with("month") {
            today.checked_sub_months(Months::new(quantity))
        } else {
            today.checked_sub_months(Months::new(quantity.checked_mul(12)?))
        }
    }
}
