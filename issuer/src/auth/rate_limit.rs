//! Per-principal sliding-window rate limit

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    max: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// `max` commands per `window`; a `max` of zero disables limiting
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max: usize) -> Self {
        Self::new(max, Duration::from_secs(60))
    }

    /// Count one command for `principal`, or refuse if the window is full
    pub async fn try_acquire(&self, principal: &str) -> bool {
        if self.max == 0 {
            return true;
        }

        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let recent = hits.entry(principal.to_string()).or_default();

        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            recent.pop_front();
        }

        if recent.len() >= self.max {
            return false;
        }
        recent.push_back(now);
        true
    }
}
