use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::browser::SessionOptions;
use crate::pagination::Pacing;

/// Every tunable of a scrape run.
///
/// Loaded from `REVIEW_*` environment variables (the binary honors `.env`),
/// then overridden by command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperSettings {
    pub headless: bool,
    pub max_pages: u32,
    pub page_delay: Duration,
    pub link_timeout: Duration,
    pub block_timeout: Duration,
    pub selectors_dir: PathBuf,
    pub output_dir: PathBuf,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub window_size: (u32, u32),
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            headless: true,
            max_pages: 10,
            page_delay: Duration::from_millis(800),
            link_timeout: Duration::from_secs(10),
            block_timeout: Duration::from_secs(15),
            selectors_dir: PathBuf::from("config"),
            output_dir: PathBuf::from("."),
            proxy: None,
            user_agent: None,
            window_size: (1400, 900),
        }
    }
}

impl ScraperSettings {
    /// Reads the process environment as it stands; the binary loads `.env`
    /// once at startup before calling this.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; unset or unparseable values keep
    /// the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parsed = |key: &str| text(key).and_then(|v| parse_or_warn::<u64>(key, &v));

        Self {
            headless: text("REVIEW_HEADLESS")
                .and_then(|v| parse_flag("REVIEW_HEADLESS", &v))
                .unwrap_or(defaults.headless),
            max_pages: text("REVIEW_MAX_PAGES")
                .and_then(|v| parse_or_warn("REVIEW_MAX_PAGES", &v))
                .unwrap_or(defaults.max_pages),
            page_delay: parsed("REVIEW_PAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.page_delay),
            link_timeout: parsed("REVIEW_LINK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.link_timeout),
            block_timeout: parsed("REVIEW_BLOCK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.block_timeout),
            selectors_dir: text("REVIEW_SELECTORS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.selectors_dir),
            output_dir: text("REVIEW_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            proxy: text("REVIEW_PROXY"),
            user_agent: text("REVIEW_USER_AGENT"),
            window_size: text("REVIEW_WINDOW_SIZE")
                .and_then(|v| parse_window_size(&v))
                .unwrap_or(defaults.window_size),
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            max_pages: self.max_pages,
            page_delay: self.page_delay,
            link_timeout: self.link_timeout,
            block_timeout: self.block_timeout,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            headless: self.headless,
            user_agent: self.user_agent.clone(),
            window_size: self.window_size,
            proxy: self.proxy.clone(),
            ..SessionOptions::default()
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("⚠️ Ignoring {}={:?}: not a valid number", key, value);
            None
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("⚠️ Ignoring {}={:?}: expected true/false", key, value);
            None
        }
    }
}

/// "1920x1080" -> (1920, 1080)
fn parse_window_size(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ScraperSettings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ScraperSettings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(from_pairs(&[]), ScraperSettings::default());
    }

    #[test]
    fn reads_review_variables() {
        let settings = from_pairs(&[
            ("REVIEW_HEADLESS", "false"),
            ("REVIEW_MAX_PAGES", "3"),
            ("REVIEW_PAGE_DELAY_MS", "50"),
            ("REVIEW_PROXY", "socks5://127.0.0.1:9050"),
            ("REVIEW_WINDOW_SIZE", "1920x1080"),
        ]);
        assert!(!settings.headless);
        assert_eq!(settings.max_pages, 3);
        assert_eq!(settings.pacing().page_delay, Duration::from_millis(50));
        assert_eq!(settings.window_size, (1920, 1080));
        assert_eq!(settings.session_options().proxy.as_deref(), Some("socks5://127.0.0.1:9050"));
    }

    #[test]
    fn bad_values_keep_defaults() {
        let settings = from_pairs(&[
            ("REVIEW_MAX_PAGES", "many"),
            ("REVIEW_HEADLESS", "maybe"),
            ("REVIEW_WINDOW_SIZE", "wide"),
            ("REVIEW_PROXY", "   "),
        ]);
        assert_eq!(settings, ScraperSettings::default());
    }
}
