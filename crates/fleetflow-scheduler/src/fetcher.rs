//! Retrying fetcher — one guarded upstream call with exponential backoff.
//!
//! Order per cycle: circuit breaker → rate limiter → call (bounded by a
//! timeout) → on retryable failure back off and try again, up to
//! `max_attempts`. A 429 from upstream ends the cycle as `RateLimited`.

use std::sync::Arc;
use std::time::Duration;

use fleetflow_core::config::{FleetFlowConfig, RetryConfig};
use fleetflow_core::error::{FleetFlowError, Result};
use fleetflow_core::traits::OpportunitySource;
use fleetflow_core::types::{Opportunity, OpportunityQuery};
use rand::Rng;
use serde::Serialize;

use crate::circuit::{CircuitBreaker, CircuitState};
use crate::rate_limit::{RateLimitSnapshot, RateLimiter};

/// Attempt budget and backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
    /// Hard cap on any single delay.
    pub max_delay: Duration,
    /// Add random jitter of up to half the base delay, still within the cap.
    pub jitter: bool,
    /// Bound on a single upstream call.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Saturating shift so absurd attempt counts just hit the cap.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return capped;
        }
        let half_base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let headroom = u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let limit = half_base.min(headroom);
        if limit == 0 {
            return capped;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..limit);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Guarded, retrying access to one opportunity source.
pub struct RetryingFetcher {
    source: Arc<dyn OpportunitySource>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(
        source: Arc<dyn OpportunitySource>,
        limiter: RateLimiter,
        breaker: CircuitBreaker,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            limiter,
            breaker,
            policy,
        }
    }

    /// Build guards and policy from the config sections.
    pub fn from_config(source: Arc<dyn OpportunitySource>, config: &FleetFlowConfig) -> Self {
        Self::new(
            source,
            RateLimiter::from_config(&config.rate_limit),
            CircuitBreaker::from_config(&config.circuit_breaker),
            RetryPolicy::from_config(&config.retry),
        )
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fetch once through the guards. `RateLimited` and `CircuitOpen` are
    /// returned without touching the network.
    pub async fn fetch(&mut self, query: &OpportunityQuery) -> Result<Vec<Opportunity>> {
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for_attempt(attempt - 1);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "⏳ Retrying {} after upstream error",
                    self.source.name()
                );
                tokio::time::sleep(delay).await;
            }

            self.check_guards()?;

            let outcome = tokio::time::timeout(self.policy.request_timeout, self.source.fetch(query))
                .await
                .unwrap_or_else(|_| Err(FleetFlowError::Timeout(self.policy.request_timeout.as_secs())));

            match outcome {
                Ok(items) => {
                    self.breaker.record_success();
                    tracing::debug!(
                        "📥 {} returned {} opportunities (attempt {})",
                        self.source.name(),
                        items.len(),
                        attempt + 1
                    );
                    return Ok(items);
                }
                Err(FleetFlowError::UpstreamThrottled) => {
                    self.limiter.mark_throttled();
                    return Err(FleetFlowError::RateLimited(format!(
                        "{} answered 429",
                        self.source.name()
                    )));
                }
                Err(e) if e.is_retryable() => {
                    self.breaker.record_failure();
                    tracing::warn!(
                        "⚠️ {} attempt {} failed: {}",
                        self.source.name(),
                        attempt + 1,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| FleetFlowError::Upstream("no attempts made".into())))
    }

    fn check_guards(&mut self) -> Result<()> {
        if self.breaker.is_open() {
            return Err(FleetFlowError::CircuitOpen {
                retry_in_secs: self.breaker.retry_in().as_secs(),
            });
        }
        if !self.limiter.try_acquire() {
            return Err(FleetFlowError::RateLimited(format!(
                "hourly budget spent, resets in {}s",
                self.limiter.resets_in().as_secs()
            )));
        }
        Ok(())
    }

    pub fn status(&self) -> FetcherStatus {
        FetcherStatus {
            source: self.source.name().to_string(),
            circuit: self.breaker.state(),
            consecutive_failures: self.breaker.consecutive_failures(),
            rate_limit: self.limiter.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetcherStatus {
    pub source: String,
    pub circuit: CircuitState,
    pub consecutive_failures: u32,
    pub rate_limit: RateLimitSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted outcomes and records when each call happened.
    struct ScriptedSource {
        script: Mutex<Vec<Result<Vec<Opportunity>>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn new(mut script: Vec<Result<Vec<Opportunity>>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OpportunitySource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch(&self, _query: &OpportunityQuery) -> Result<Vec<Opportunity>> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(FleetFlowError::Upstream("script exhausted".into())))
        }
    }

    fn query() -> OpportunityQuery {
        OpportunityQuery::lookback(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), 7)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            jitter: false,
            request_timeout: Duration::from_secs(30),
        }
    }

    fn fetcher(source: Arc<ScriptedSource>, max_failures: u32) -> RetryingFetcher {
        RetryingFetcher::new(
            source,
            RateLimiter::new(100),
            CircuitBreaker::new(max_failures, Duration::from_secs(300)),
            policy(),
        )
    }

    fn upstream(msg: &str) -> Result<Vec<Opportunity>> {
        Err(FleetFlowError::Upstream(msg.into()))
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(p.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(p.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_under_cap() {
        let p = RetryPolicy {
            jitter: true,
            ..policy()
        };
        for attempt in 0..8 {
            let d = p.delay_for_attempt(attempt);
            assert!(d <= Duration::from_secs(10));
            assert!(d >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success() {
        let source = ScriptedSource::new(vec![
            upstream("502"),
            upstream("503"),
            Ok(vec![Opportunity::new("A", "Fleet fuel cards", "scripted")]),
        ]);
        let mut f = fetcher(source.clone(), 5);

        let items = f.fetch(&query()).await.unwrap();
        assert_eq!(items.len(), 1);

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert!(second_gap > first_gap);
        assert_eq!(first_gap, Duration::from_millis(1000));
        assert_eq!(second_gap, Duration::from_millis(2000));

        // Success resets the breaker.
        assert_eq!(f.breaker().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let source = ScriptedSource::new(vec![upstream("500"), upstream("502"), upstream("504")]);
        let mut f = fetcher(source.clone(), 5);

        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::Upstream(ref m) if m == "504"));
        assert_eq!(source.calls().len(), 3);
        assert_eq!(f.breaker().consecutive_failures(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_stops_retrying_and_throttles() {
        let source = ScriptedSource::new(vec![Err(FleetFlowError::UpstreamThrottled)]);
        let mut f = fetcher(source.clone(), 5);

        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::RateLimited(_)));
        assert_eq!(source.calls().len(), 1);
        assert!(f.limiter().is_throttled());
        assert_eq!(f.breaker().consecutive_failures(), 0);

        // Next cycle fails fast without a call.
        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::RateLimited(_)));
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast() {
        let source = ScriptedSource::new(vec![upstream("500"), upstream("500")]);
        let mut f = fetcher(source.clone(), 2);

        // Breaker trips on the second failure; the third attempt is suppressed.
        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::CircuitOpen { .. }));
        assert_eq!(source.calls().len(), 2);

        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::CircuitOpen { .. }));
        assert_eq!(source.calls().len(), 2);
        assert_eq!(f.status().circuit, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_one_call_then_reopens() {
        let source = ScriptedSource::new(vec![upstream("500"), upstream("500"), upstream("503")]);
        let mut f = fetcher(source.clone(), 2);

        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::CircuitOpen { .. }));
        assert_eq!(source.calls().len(), 2);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(f.status().circuit, CircuitState::HalfOpen);

        // One call goes through; its failure re-opens the breaker before the retry.
        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::CircuitOpen { .. }));
        assert_eq!(source.calls().len(), 3);
        assert_eq!(f.status().circuit, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_blocks_before_call() {
        let source = ScriptedSource::new(vec![Ok(vec![])]);
        let mut f = RetryingFetcher::new(
            source.clone(),
            RateLimiter::new(0),
            CircuitBreaker::default(),
            policy(),
        );
        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::RateLimited(_)));
        assert!(source.calls().is_empty());
    }

    struct StalledSource;

    #[async_trait]
    impl OpportunitySource for StalledSource {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn fetch(&self, _query: &OpportunityQuery) -> Result<Vec<Opportunity>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_upstream_times_out() {
        let mut f = RetryingFetcher::new(
            Arc::new(StalledSource),
            RateLimiter::new(100),
            CircuitBreaker::default(),
            RetryPolicy {
                max_attempts: 1,
                ..policy()
            },
        );
        let err = f.fetch(&query()).await.unwrap_err();
        assert!(matches!(err, FleetFlowError::Timeout(30)));
        assert_eq!(f.breaker().consecutive_failures(), 1);
    }
}
