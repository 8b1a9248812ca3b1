//! Fixed-window rate limiter
//!
//! One counter per key (user id or client IP). The window resets fully when
//! it expires, so a burst straddling a boundary can reach twice the limit.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Counter state for a single key
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    fn expired(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= window
    }
}

/// Result of a limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Time until the window resets
    pub reset_in: Duration,
}

/// Fixed-window limiter keyed by string
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request for `key` now
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Count a request for `key` at `now`
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if entry.expired(self.window, now) {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let reset_in = (entry.started + self.window).saturating_duration_since(now);

        if entry.count < self.limit {
            entry.count += 1;
            RateLimitDecision {
                allowed: true,
                remaining: self.limit - entry.count,
                reset_in,
            }
        } else {
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_in,
            }
        }
    }

    /// Evict windows that have expired; returns how many were removed
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.expired(self.window, now));
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Run `cleanup` on a tokio interval until the task is aborted
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = limiter.cleanup();
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = limiter.len(), "rate limiter cleanup");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        let first = limiter.check_at("fan_1", now);
        assert!(first.allowed);
        assert_eq!(first.remaining, 2);
        assert_eq!(first.reset_in, Duration::from_secs(60));

        assert!(limiter.check_at("fan_1", now).allowed);
        let third = limiter.check_at("fan_1", now);
        assert!(third.allowed);
        assert_eq!(third.remaining, 0);

        let fourth = limiter.check_at("fan_1", now + Duration::from_secs(10));
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.reset_in, Duration::from_secs(50));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("fan_1", now).allowed);
        assert!(!limiter.check_at("fan_1", now).allowed);
        assert!(limiter.check_at("fan_2", now).allowed);
    }

    #[test]
    fn test_window_resets_fully() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("ip", now).allowed);
        assert!(limiter.check_at("ip", now).allowed);
        assert!(!limiter.check_at("ip", now + Duration::from_secs(59)).allowed);

        let after = limiter.check_at("ip", now + Duration::from_secs(60));
        assert!(after.allowed);
        assert_eq!(after.remaining, 1);
    }

    #[test]
    fn test_cleanup_evicts_expired_only() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let now = Instant::now();

        limiter.check_at("old", now);
        limiter.check_at("fresh", now + Duration::from_secs(30));
        assert_eq!(limiter.len(), 2);

        let evicted = limiter.cleanup_at(now + Duration::from_secs(61));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_cleanup_runs() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_millis(10)));
        limiter.check("fan_1");

        let handle = limiter.spawn_cleanup(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(limiter.is_empty());
    }
}
