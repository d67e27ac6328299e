use std::collections::HashSet;

use crate::review::Review;

/// Characters of the body that take part in the identity key
pub const BODY_PREFIX_CHARS: usize = 120;

const DELIMITER: char = '|';

/// In-run duplicate filter. Create one per pipeline run.
#[derive(Debug, Default)]
pub struct DedupEngine {
    seen: HashSet<String>,
}

impl DedupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the review's key; `false` if it was already seen this run.
    pub fn should_keep(&mut self, review: &Review) -> bool {
        self.seen.insert(dedup_key(review))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// `date-or-raw|title|body[..120 chars]|reviewer`, each part trimmed.
pub fn dedup_key(review: &Review) -> String {
    let date = review
        .date
        .as_ref()
        .map(ToString::to_string)
        .or_else(|| review.raw_date.clone())
        .unwrap_or_default();
    let title = review.title.as_deref().unwrap_or_default();
    let body: String = review
        .body
        .as_deref()
        .unwrap_or_default()
        .trim()
        .chars()
        .take(BODY_PREFIX_CHARS)
        .collect();
    let reviewer = review.reviewer.as_deref().unwrap_or_default();

    [date.trim(), title.trim(), body.trim(), reviewer.trim()].join(&DELIMITER.to_string())
}
