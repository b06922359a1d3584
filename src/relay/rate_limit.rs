//! Sliding-window rate limiter keyed by caller identity

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::utils::{system_clock, Clock};

/// Per-identifier sliding-window request counter
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    clock: Arc<dyn Clock>,
    /// Request instants per identifier, oldest first
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self::with_clock(window, max_requests, system_clock())
    }

    pub fn with_clock(window: Duration, max_requests: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            max_requests,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request for `identifier` if it is under the threshold
    ///
    /// Rejected requests are not recorded.
    pub fn allow(&self, identifier: &str) -> bool {
        let now = self.clock.now();
        let mut windows = self.windows.lock();
        let entries = windows.entry(identifier.to_string()).or_default();
        prune(entries, now, self.window);

        if entries.len() >= self.max_requests {
            return false;
        }

        entries.push_back(now);
        true
    }

    /// Drop identifiers whose requests have all left the window
    pub fn sweep(&self) {
        let now = self.clock.now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, entries| {
            prune(entries, now, self.window);
            !entries.is_empty()
        });
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, remaining = windows.len(), "swept rate limit windows");
        }
    }

    /// Number of identifiers currently tracked
    pub fn tracked_identifiers(&self) -> usize {
        self.windows.lock().len()
    }

    /// Run [`RateLimiter::sweep`] once per window until the task is aborted
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }
}

fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while matches!(entries.front(), Some(front) if now.duration_since(*front) >= window) {
        entries.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn limiter(max: usize) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(Duration::from_secs(60), max, clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_rejects_only_the_call_over_threshold() {
        let (limiter, _clock) = limiter(100);
        let results: Vec<bool> = (0..101).map(|_| limiter.allow("10.0.0.1")).collect();
        assert!(results[..100].iter().all(|ok| *ok));
        assert!(!results[100]);
    }

    #[test]
    fn test_window_expiry_resets_count() {
        let (limiter, clock) = limiter(3);
        for _ in 0..3 {
            assert!(limiter.allow("ip"));
        }
        assert!(!limiter.allow("ip"));

        clock.advance(Duration::from_secs(60));
        assert!(limiter.allow("ip"));
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock) = limiter(2);
        assert!(limiter.allow("ip"));
        clock.advance(Duration::from_secs(30));
        assert!(limiter.allow("ip"));
        assert!(!limiter.allow("ip"));

        // Only the first request has left the window
        clock.advance(Duration::from_secs(30));
        assert!(limiter.allow("ip"));
        assert!(!limiter.allow("ip"));
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.allow("ip"));
        clock.advance(Duration::from_secs(59));
        assert!(!limiter.allow("ip"));
        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow("ip"));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let (limiter, _clock) = limiter(1);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[test]
    fn test_sweep_drops_decayed_identifiers() {
        let (limiter, clock) = limiter(10);
        limiter.allow("old");
        clock.advance(Duration::from_secs(45));
        limiter.allow("recent");
        assert_eq!(limiter.tracked_identifiers(), 2);

        clock.advance(Duration::from_secs(15));
        limiter.sweep();
        assert_eq!(limiter.tracked_identifiers(), 1);

        clock.advance(Duration::from_secs(60));
        limiter.sweep();
        assert_eq!(limiter.tracked_identifiers(), 0);
    }
}
