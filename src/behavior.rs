use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::debug;

use crate::session::BrowserSession;

/// Human-like activity between page loads.
pub trait HumanBehavior {
    /// Interact with the current page and return an extra pause to wait
    /// before the next fetch.
    fn between_pages(&mut self, session: &mut dyn BrowserSession) -> Duration;
}

/// Does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBehavior;

impl HumanBehavior for NoBehavior {
    fn between_pages(&mut self, _session: &mut dyn BrowserSession) -> Duration {
        Duration::ZERO
    }
}

/// Random mouse movement, a partial scroll and a random pause.
#[derive(Debug)]
pub struct Jitter {
    rng: StdRng,
    min_pause_ms: u64,
    max_pause_ms: u64,
}

impl Jitter {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible sequence for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            min_pause_ms: 300,
            max_pause_ms: 900,
        }
    }

    fn mouse_script(&mut self) -> String {
        let (x0, y0) = (self.rng.gen_range(50..400), self.rng.gen_range(50..300));
        let (x1, y1) = (self.rng.gen_range(400..900), self.rng.gen_range(300..700));
        let steps: u32 = self.rng.gen_range(12..30);
        format!(
            r#"(function() {{
                const steps = {steps};
                for (let i = 0; i <= steps; i++) {{
                    const t = i / steps;
                    document.dispatchEvent(new MouseEvent('mousemove', {{
                        view: window, bubbles: true, cancelable: true,
                        clientX: {x0} + ({x1} - {x0}) * t,
                        clientY: {y0} + ({y1} - {y0}) * t * t
                    }}));
                }}
            }})();"#
        )
    }

    fn scroll_script(&mut self) -> String {
        let down: u32 = self.rng.gen_range(300..700);
        let back: u32 = if self.rng.gen_bool(0.1) { self.rng.gen_range(100..200) } else { 0 };
        format!("window.scrollBy(0, {}); window.scrollBy(0, -{});", down, back)
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanBehavior for Jitter {
    fn between_pages(&mut self, session: &mut dyn BrowserSession) -> Duration {
        for script in [self.mouse_script(), self.scroll_script()] {
            if let Err(e) = session.execute_script(&script) {
                debug!("Behavior script failed: {}", e);
            }
        }
        Duration::from_millis(self.rng.gen_range(self.min_pause_ms..=self.max_pause_ms))
    }
}
