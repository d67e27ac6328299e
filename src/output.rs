use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::review::Review;

static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("file name pattern is valid"));

/// `reviews_{source}_{company}_{start}_{end}.json`
pub fn output_file_name(source: &str, company: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "reviews_{}_{}_{}_{}.json",
        UNSAFE_FILE_CHARS.replace_all(source, "_"),
        UNSAFE_FILE_CHARS.replace_all(company, "_"),
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
    )
}

/// Write `reviews` as pretty JSON under `dir`, creating it if needed.
pub fn write_reviews(
    dir: &Path,
    source: &str,
    company: &str,
    start: NaiveDate,
    end: NaiveDate,
    reviews: &[Review],
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(output_file_name(source, company, start, end));

    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, reviews)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    info!("💾 Saved {} reviews to {}", reviews.len(), path.display());
    Ok(path)
}
