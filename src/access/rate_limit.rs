//! Sliding-window rate limiting per caller identity

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Counts requests per identity inside a rolling window
pub struct RateLimiter {
    default_limit: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// `default_limit` requests per `window`
    pub fn new(default_limit: u32, window: Duration) -> Self {
        Self {
            default_limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request if `identity` is under its limit.
    ///
    /// Returns false (and records nothing) when the limit is reached.
    pub fn check(&self, identity: &str, limit: Option<u32>) -> bool {
        self.check_at(identity, limit, Instant::now())
    }

    fn check_at(&self, identity: &str, limit: Option<u32>, now: Instant) -> bool {
        let limit = limit.unwrap_or(self.default_limit) as usize;
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let window = hits.entry(identity.to_string()).or_default();
        while let Some(oldest) = window.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit {
            debug!("Rate limit reached for identity ({} in window)", window.len());
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drop identities with no requests left in the window
    pub fn prune(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        hits.retain(|_, window| {
            window
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
        });
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.hits.lock().map(|h| h.is_empty()).unwrap_or(false)
    }
}
