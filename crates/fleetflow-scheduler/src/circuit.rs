//! Circuit breaker for the upstream opportunity source.
//!
//! ```text
//! Closed ──(max_failures consecutive failures)──► Open
//! Open ──(reset_timeout since last failure)──► HalfOpen (next call probes)
//! HalfOpen ──success──► Closed
//! HalfOpen ──failure──► Open
//! ```

use std::time::Duration;

use fleetflow_core::config::CircuitBreakerConfig;
use serde::Serialize;
use tokio::time::Instant;

/// Breaker state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    /// Cooldown elapsed; one probing call is allowed.
    HalfOpen,
}

/// Consecutive-failure breaker with a cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    tripped: bool,
    max_failures: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            last_failure: None,
            tripped: false,
            max_failures,
            reset_timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(
            config.max_failures,
            Duration::from_secs(config.reset_timeout_secs),
        )
    }

    pub fn record_success(&mut self) {
        if self.tripped {
            tracing::info!(
                "🔌 Circuit closed after {} failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.tripped = false;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_failure = Some(Instant::now());
        if self.consecutive_failures >= self.max_failures {
            if !self.tripped {
                tracing::warn!(
                    "🔌 Circuit opened after {} consecutive failures (cooldown {}s)",
                    self.consecutive_failures,
                    self.reset_timeout.as_secs()
                );
            }
            self.tripped = true;
        }
    }

    /// True while tripped and the cooldown has not elapsed.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn state(&self) -> CircuitState {
        if !self.tripped {
            return CircuitState::Closed;
        }
        match self.last_failure {
            Some(at) if at.elapsed() < self.reset_timeout => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    /// Time left before a probe is allowed; zero unless open.
    pub fn retry_in(&self) -> Duration {
        match (self.state(), self.last_failure) {
            (CircuitState::Open, Some(at)) => self.reset_timeout.saturating_sub(at.elapsed()),
            _ => Duration::ZERO,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_half_opens_after_cooldown() {
        let reset = Duration::from_secs(300);
        let mut breaker = CircuitBreaker::new(5, reset);

        for _ in 0..4 {
            breaker.record_failure();
            assert!(!breaker.is_open());
        }
        breaker.record_failure();
        assert!(breaker.is_open());
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(reset - Duration::from_millis(1)).await;
        assert!(breaker.is_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!breaker.is_open());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let reset = Duration::from_secs(60);
        let mut breaker = CircuitBreaker::new(2, reset);
        breaker.record_failure();
        breaker.record_failure();
        tokio::time::advance(reset).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert!(breaker.is_open());
        assert_eq!(breaker.retry_in(), reset);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_probe_closes() {
        let reset = Duration::from_secs(60);
        let mut breaker = CircuitBreaker::new(1, reset);
        breaker.record_failure();
        assert!(breaker.is_open());
        tokio::time::advance(reset).await;

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);

        // Needs the full threshold again to trip.
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_resets_count() {
        let mut breaker = CircuitBreaker::default();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.retry_in(), Duration::ZERO);
    }
}
