//! Once-per-window failure logging
//!
//! A collaborator that stays down would otherwise produce one warning per
//! evaluation. The throttle remembers when each failure key was last logged
//! and lets it through again only after the window has elapsed.

use dashmap::DashMap;
use std::time::{Duration, Instant};

pub struct FailureThrottle {
    window: Duration,
    last_logged: DashMap<String, Instant>,
}

impl FailureThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_logged: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a failure under `key` should be logged now.
    ///
    /// Returns true at most once per window per key and records the time
    /// when it does.
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut allowed = true;

        self.last_logged
            .entry(key.to_string())
            .and_modify(|last| {
                if now.duration_since(*last) >= self.window {
                    *last = now;
                } else {
                    allowed = false;
                }
            })
            .or_insert(now);

        allowed
    }

    /// Forget a key so its next failure is logged immediately.
    pub fn reset(&self, key: &str) {
        self.last_logged.remove(key);
    }

    /// Drop keys whose window has elapsed.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.last_logged
            .retain(|_, logged| now.duration_since(*logged) < window);
    }

    pub fn tracked(&self) -> usize {
        self.last_logged.len()
    }
}

impl Default for FailureThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
