use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Review Records
// ============================================================================

/// Review date as stored on a record.
///
/// Either a normalized calendar date or the verbatim text read from the page
/// when no parse strategy succeeded. Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewDate {
    Parsed(NaiveDate),
    Raw(String),
}

impl ReviewDate {
    pub fn parsed(&self) -> Option<NaiveDate> {
        match self {
            ReviewDate::Parsed(date) => Some(*date),
            ReviewDate::Raw(_) => None,
        }
    }
}

impl fmt::Display for ReviewDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewDate::Parsed(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            ReviewDate::Raw(raw) => f.write_str(raw),
        }
    }
}

/// One extracted review
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Review {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<ReviewDate>,
    /// Date text exactly as read from the page (attribute or element text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Site tag, e.g. "g2"
    pub source: String,
    /// Page the block was read from
    pub source_url: String,
    /// Resolved product page
    pub product_url: String,
}
