use headless_chrome::browser::tab::NavigationFailed;
use headless_chrome::{Browser, LaunchOptions, Tab};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

use crate::dom::{DomSnapshot, Element, LookupError};
use crate::error::{Result, ScrapeError};
use crate::selectors::SelectorList;
use crate::session::BrowserSession;

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    ]
});

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Injected before any page script runs.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 4 });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });

    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) return 'Intel Inc.';
        if (parameter === 37446) return 'Intel Iris OpenGL Engine';
        return getParameter.apply(this, [parameter]);
    };
    window.chrome = { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
"#;

/// Polling interval while waiting for selectors to render
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launch-time browser configuration. Fixed for the life of the session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    /// Random pick from a small pool when unset
    pub user_agent: Option<String>,
    pub window_size: (u32, u32),
    /// e.g. `http://host:port` or `socks5://host:port`
    pub proxy: Option<String>,
    /// Wait for `<body>` after each navigation
    pub load_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            window_size: (1400, 900),
            proxy: None,
            load_timeout: Duration::from_secs(15),
        }
    }
}

/// Headless Chrome session.
///
/// Lookups run against a snapshot of the rendered DOM taken by `find_all`,
/// so element handles stay valid until the next navigation or `find_all`.
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    snapshot: Option<DomSnapshot>,
    generation: u64,
    load_timeout: Duration,
}

impl ChromeSession {
    pub fn launch(options: &SessionOptions) -> Result<Self> {
        let user_agent = options.user_agent.clone().unwrap_or_else(|| {
            USER_AGENTS
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(DEFAULT_USER_AGENT)
                .to_string()
        });
        info!("Launching Chrome (headless: {}) with User-Agent: {}", options.headless, user_agent);

        let mut args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--window-position=0,0"),
        ];
        let ua_arg = format!("--user-agent={}", user_agent);
        args.push(OsStr::new(&ua_arg));

        let proxy_arg: String;
        if let Some(ref proxy) = options.proxy {
            info!("🔄 Using proxy: {}", proxy);
            proxy_arg = format!("--proxy-server={}", proxy);
            args.push(OsStr::new(&proxy_arg));
        }

        let browser = Browser::new(LaunchOptions {
            headless: options.headless,
            window_size: Some(options.window_size),
            idle_browser_timeout: Duration::from_secs(120),
            args,
            ..Default::default()
        })
        .map_err(ScrapeError::session)?;

        let tab = browser.new_tab().map_err(ScrapeError::session)?;
        tab.enable_debugger().map_err(ScrapeError::session)?;
        tab.call_method(headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument {
            source: STEALTH_SCRIPT.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(ScrapeError::session)?;

        Ok(Self {
            browser: Some(browser),
            tab,
            snapshot: None,
            generation: 0,
            load_timeout: options.load_timeout,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.browser.is_none() {
            return Err(ScrapeError::Session("browser already closed".to_string()));
        }
        Ok(())
    }

    /// A load error (`net::ERR_*`, proxy tunnel failure, timeout) is a
    /// `PageLoad` as long as the browser still answers; otherwise the session
    /// is gone.
    fn classify_navigation_error(&self, url: &str, err: anyhow::Error) -> ScrapeError {
        let page_load = ScrapeError::PageLoad {
            url: url.to_string(),
            reason: err.to_string(),
        };
        if err.downcast_ref::<NavigationFailed>().is_some() {
            return page_load;
        }
        match self.browser.as_ref().map(Browser::get_version) {
            Some(Ok(_)) => page_load,
            _ => ScrapeError::session(err),
        }
    }

    fn poll_for(&mut self, selectors: &SelectorList, timeout: Duration) -> Vec<Element> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(snapshot) = self.take_snapshot() {
                let found = snapshot.select_all(selectors);
                if !found.is_empty() {
                    return found;
                }
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                debug!("Timed out after {:?} waiting for {}", timeout, selectors);
                return Vec::new();
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn take_snapshot(&mut self) -> Option<&DomSnapshot> {
        match self.tab.get_content() {
            Ok(html) => {
                self.generation += 1;
                self.snapshot = Some(DomSnapshot::parse(self.generation, &html));
                self.snapshot.as_ref()
            }
            Err(e) => {
                debug!("Could not read page content: {}", e);
                None
            }
        }
    }
}

impl BrowserSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.ensure_open()?;
        debug!("Navigating to: {}", url);
        self.snapshot = None;
        if let Err(e) = self.tab.navigate_to(url) {
            return Err(self.classify_navigation_error(url, e));
        }

        // Soft wait: ads and trackers often keep the load event from firing.
        let body_wait = blocking(|| {
            self.tab
                .wait_for_element_with_custom_timeout("body", self.load_timeout)
                .map(|_| ())
        });
        if let Err(e) = body_wait {
            warn!("⚠️ Body wait timed out for {}: {}. Continuing anyway", url, e);
        }
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.browser.as_ref().map(|_| self.tab.get_url())
    }

    fn page_title(&self) -> Option<String> {
        self.browser.as_ref()?;
        self.tab.get_title().ok().filter(|t| !t.is_empty())
    }

    fn find_all(&mut self, selectors: &SelectorList, timeout: Duration) -> Vec<Element> {
        if self.browser.is_none() {
            return Vec::new();
        }
        blocking(|| self.poll_for(selectors, timeout))
    }

    fn find_first(&self, scope: &Element, selectors: &SelectorList) -> Option<Element> {
        self.snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.select_first(scope, selectors).ok().flatten())
    }

    fn attribute(&self, element: &Element, name: &str) -> std::result::Result<Option<String>, LookupError> {
        self.snapshot
            .as_ref()
            .ok_or(LookupError::NoPage)?
            .attribute(element, name)
    }

    fn text(&self, element: &Element) -> std::result::Result<String, LookupError> {
        self.snapshot.as_ref().ok_or(LookupError::NoPage)?.text(element)
    }

    fn execute_script(&mut self, code: &str) -> Result<serde_json::Value> {
        self.ensure_open()?;
        let result = self.tab.evaluate(code, false).map_err(ScrapeError::session)?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    fn scroll_to_bottom(&mut self) -> Result<()> {
        self.execute_script("window.scrollTo(0, document.body.scrollHeight);")
            .map(|_| ())
    }

    fn close(&mut self) {
        self.snapshot = None;
        if self.browser.take().is_some() {
            // Dropping the Browser kills the Chrome process.
            info!("🧹 Browser session closed");
        }
    }
}

/// Run a blocking browser wait without stalling other tasks on a
/// multi-threaded runtime. `block_in_place` panics on a current-thread
/// runtime, so there the call runs inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.close();
    }
}
