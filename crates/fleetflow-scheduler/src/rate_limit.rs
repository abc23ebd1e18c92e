//! Hourly request budget for upstream calls.
//! No waiting: a `false` from `try_acquire` means "do not call now".

use std::time::Duration;

use fleetflow_core::config::RateLimitConfig;
use serde::Serialize;
use tokio::time::Instant;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// Counts requests in the current window and refuses once the ceiling is hit.
#[derive(Debug)]
pub struct RateLimiter {
    requests_this_window: u32,
    window_start: Instant,
    max_per_window: u32,
    window: Duration,
    throttled: bool,
}

impl RateLimiter {
    /// Limiter over a one-hour window.
    pub fn new(max_per_window: u32) -> Self {
        Self::with_window(max_per_window, HOUR)
    }

    pub fn with_window(max_per_window: u32, window: Duration) -> Self {
        Self {
            requests_this_window: 0,
            window_start: Instant::now(),
            max_per_window,
            window,
            throttled: false,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_per_window())
    }

    /// Take one request slot if the window has room.
    pub fn try_acquire(&mut self) -> bool {
        self.roll_window();
        if self.throttled || self.requests_this_window >= self.max_per_window {
            self.throttle();
            return false;
        }
        self.requests_this_window += 1;
        if self.requests_this_window >= self.max_per_window {
            self.throttle();
        }
        true
    }

    fn throttle(&mut self) {
        if !self.throttled {
            tracing::warn!(
                "🚦 Rate limit reached: {}/{} requests this window",
                self.requests_this_window,
                self.max_per_window
            );
        }
        self.throttled = true;
    }

    /// Upstream told us to back off: refuse everything until the window rolls.
    pub fn mark_throttled(&mut self) {
        self.throttled = true;
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled && !self.window_elapsed()
    }

    /// Slots left in the current window.
    pub fn remaining(&self) -> u32 {
        if self.window_elapsed() {
            return self.max_per_window;
        }
        if self.throttled {
            return 0;
        }
        self.max_per_window.saturating_sub(self.requests_this_window)
    }

    /// Time until the current window resets.
    pub fn resets_in(&self) -> Duration {
        self.window.saturating_sub(self.window_start.elapsed())
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        let fresh = self.window_elapsed();
        RateLimitSnapshot {
            requests_this_window: if fresh { 0 } else { self.requests_this_window },
            max_per_window: self.max_per_window,
            throttled: self.is_throttled(),
            resets_in_secs: self.resets_in().as_secs(),
        }
    }

    fn window_elapsed(&self) -> bool {
        self.window_start.elapsed() >= self.window
    }

    fn roll_window(&mut self) {
        if self.window_elapsed() {
            if self.throttled {
                tracing::info!("🚦 Rate limit window reset, resuming upstream calls");
            }
            self.window_start = Instant::now();
            self.requests_this_window = 0;
            self.throttled = false;
        }
    }
}

/// Point-in-time view for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitSnapshot {
    pub requests_this_window: u32,
    pub max_per_window: u32,
    pub throttled: bool,
    pub resets_in_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_allows_exactly_max_per_window() {
        let mut limiter = RateLimiter::new(5);
        for _ in 0..4 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.is_throttled());
        assert!(limiter.try_acquire());

        // Ceiling reached: flagged before any call is refused.
        assert!(limiter.is_throttled());
        assert!(limiter.snapshot().throttled);
        assert_eq!(limiter.remaining(), 0);
        assert!(!limiter.try_acquire());
        assert!(limiter.is_throttled());

        // Still inside the hour: nothing more gets through.
        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        for _ in 0..10 {
            assert!(!limiter.try_acquire());
        }
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_an_hour() {
        let mut limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(HOUR).await;
        assert!(!limiter.is_throttled());
        assert_eq!(limiter.remaining(), 2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_throttled_blocks_until_reset() {
        let mut limiter = RateLimiter::new(100);
        assert!(limiter.try_acquire());
        limiter.mark_throttled();
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.snapshot().requests_this_window, 1);

        tokio::time::advance(HOUR).await;
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_from_config_applies_headroom() {
        let limiter = RateLimiter::from_config(&RateLimitConfig {
            hourly_quota: 1000,
            headroom_pct: 90,
        });
        let snap = limiter.snapshot();
        assert_eq!(snap.max_per_window, 900);
        assert!(!snap.throttled);
    }
}
