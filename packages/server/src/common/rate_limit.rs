//! Sliding-window request limiter keyed by client identity.
//!
//! An explicitly owned component, not ambient state: constructed once with
//! `{window, max_requests}`, consulted by middleware on the trigger routes,
//! and cleaned up by a periodic eviction sweep so idle clients do not
//! accumulate forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Per-client sliding window of request timestamps.
pub struct SlidingWindowLimiter {
    window: Duration,
    max_requests: usize,
    clients: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `key` and decide whether it is admitted.
    ///
    /// Expired timestamps for this client are pruned on the way in, so the
    /// decision only counts requests inside the current window.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap();
        let hits = clients.entry(key.to_string()).or_default();

        hits.retain(|t| now.duration_since(*t) < self.window);
        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push(now);
        true
    }

    /// Drop clients whose every recorded request has left the window.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap();
        let before = clients.len();
        clients.retain(|_, hits| hits.iter().any(|t| now.duration_since(*t) < self.window));
        let evicted = before - clients.len();
        if evicted > 0 {
            debug!(evicted, remaining = clients.len(), "rate limiter sweep");
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Run the eviction sweep once per window on a background task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        let interval = limiter.window;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                limiter.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_max_then_rejects() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 3);

        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));

        // Another client has its own window.
        assert!(limiter.check("5.6.7.8"));
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 2);

        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("1.2.3.4"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_expired_clients() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 2);

        limiter.check("1.2.3.4");
        limiter.check("5.6.7.8");
        assert_eq!(limiter.tracked_clients(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.check("5.6.7.8");
        limiter.sweep();

        // Only the client active inside the window survives.
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
