//! FIFO rate limiter for RPC calls.
//!
//! Tasks run strictly one at a time in the order they were scheduled. Each
//! attempt is paced against the previous one, and rate-limited attempts are
//! retried with exponential backoff. A shared consecutive-error counter adds
//! a congestion delay in front of every attempt until a task succeeds again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::clock::Clock;
use crate::error::{AssetError, Result};

/// Default pacing for the shared limiter.
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 3.0;

/// Slowest accepted pacing: one attempt every 1000 seconds.
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

// =============================================================================
// Backoff Policy
// =============================================================================

/// Retry and congestion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts allowed for one task, including the first.
    pub max_attempts: u32,
    /// Base of the exponential backoff.
    pub base_delay: Duration,
    /// Upper bound of a single backoff delay.
    pub max_delay: Duration,
    /// Extra pacing added per consecutive failed task.
    pub congestion_step: Duration,
    /// Upper bound of the congestion delay.
    pub max_congestion: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            congestion_step: Duration::from_secs(1),
            max_congestion: Duration::from_secs(5),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

impl BackoffPolicy {
    /// `min(base * 2^(attempt + consecutive_errors), max_delay)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, consecutive_errors: u32) -> Duration {
        let exponent = attempt.saturating_add(consecutive_errors).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// `min(consecutive_errors * step, max_congestion)`.
    #[must_use]
    pub fn congestion_delay(&self, consecutive_errors: u32) -> Duration {
        self.congestion_step
            .saturating_mul(consecutive_errors)
            .min(self.max_congestion)
    }

    /// Only rate-limited attempts are retried, and only while attempts remain.
    #[must_use]
    pub fn decide(&self, attempt: u32, consecutive_errors: u32, error: &AssetError) -> RetryDecision {
        if error.is_rate_limited() && attempt < self.max_attempts {
            RetryDecision::Retry {
                delay: self.backoff_delay(attempt, consecutive_errors),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Progress of one scheduled task through its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<String>,
    pub next_delay: Option<Duration>,
}

impl RetryState {
    const fn first() -> Self {
        Self {
            attempt: 1,
            last_error: None,
            next_delay: None,
        }
    }
}

// =============================================================================
// Rate Limiter
// =============================================================================

#[derive(Debug, Default)]
struct LimiterState {
    last_attempt: Option<Duration>,
    consecutive_errors: u32,
}

/// Serializes tasks and paces their attempts.
pub struct RateLimiter {
    min_interval: Duration,
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
    // Held for the whole lifetime of a task; tokio's mutex grants the lock in FIFO order.
    state: Mutex<LimiterState>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_interval", &self.min_interval)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` attempts.
    #[must_use]
    pub fn new(requests_per_second: f64, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(requests_per_second, BackoffPolicy::default(), clock)
    }

    /// Non-positive or non-finite rates fall back to the default; tiny rates
    /// are raised to [`MIN_REQUESTS_PER_SECOND`].
    #[must_use]
    pub fn with_policy(requests_per_second: f64, policy: BackoffPolicy, clock: Arc<dyn Clock>) -> Self {
        let rps = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second.max(MIN_REQUESTS_PER_SECOND)
        } else {
            DEFAULT_REQUESTS_PER_SECOND
        };
        Self {
            min_interval: Duration::from_secs_f64(1.0 / rps),
            policy,
            clock,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Minimum gap between the starts of two attempts.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Number of tasks that failed since the last success.
    pub async fn consecutive_errors(&self) -> u32 {
        self.state.lock().await.consecutive_errors
    }

    /// Run `task` once every previously scheduled task has finished.
    ///
    /// `task` is called again for each retry, so it must be able to rebuild
    /// its request.
    ///
    /// # Errors
    ///
    /// Returns the task's last error once retries are exhausted, or
    /// immediately for errors that are not rate limits.
    pub async fn schedule<T, F, Fut>(&self, mut task: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = self.state.lock().await;
        let mut retry = RetryState::first();

        loop {
            self.pace(&mut state).await;
            match task().await {
                Ok(value) => {
                    state.consecutive_errors = 0;
                    return Ok(value);
                }
                Err(error) => match self.policy.decide(retry.attempt, state.consecutive_errors, &error) {
                    RetryDecision::Retry { delay } => {
                        tracing::warn!(
                            attempt = retry.attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Rate limited, backing off before retry"
                        );
                        retry.last_error = Some(error.to_string());
                        retry.next_delay = Some(delay);
                        self.clock.sleep(delay).await;
                        retry.attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        state.consecutive_errors = state.consecutive_errors.saturating_add(1);
                        tracing::debug!(
                            attempts = retry.attempt,
                            consecutive_errors = state.consecutive_errors,
                            error = %error,
                            "Scheduled task failed"
                        );
                        return Err(error);
                    }
                },
            }
        }
    }

    async fn pace(&self, state: &mut LimiterState) {
        let now = self.clock.now();
        let since_last = state
            .last_attempt
            .map_or(self.min_interval, |last| now.saturating_sub(last));
        let wait = self.min_interval.saturating_sub(since_last)
            + self.policy.congestion_delay(state.consecutive_errors);
        if !wait.is_zero() {
            self.clock.sleep(wait).await;
        }
        state.last_attempt = Some(self.clock.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;

    fn rate_limited() -> AssetError {
        AssetError::RateLimited {
            retry_after: None,
            message: "429".to_string(),
        }
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.backoff_delay(1, 0), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2, 0), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3, 1), Duration::from_secs(16));
        assert_eq!(policy.backoff_delay(5, 0), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(40, 40), Duration::from_secs(30));
    }

    #[test]
    fn congestion_delay_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.congestion_delay(0), Duration::ZERO);
        assert_eq!(policy.congestion_delay(3), Duration::from_secs(3));
        assert_eq!(policy.congestion_delay(9), Duration::from_secs(5));
    }

    #[test]
    fn only_rate_limits_are_retried() {
        let policy = BackoffPolicy::default();
        let other = AssetError::HttpStatus {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(policy.decide(1, 0, &other), RetryDecision::GiveUp);
        assert!(matches!(
            policy.decide(1, 0, &rate_limited()),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide(5, 0, &rate_limited()), RetryDecision::GiveUp);
    }

    #[tokio::test]
    async fn consecutive_attempts_are_paced() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(4.0, clock.clone());
        let mut starts = Vec::new();
        for _ in 0..4 {
            let started = limiter
                .schedule(|| {
                    let clock = clock.clone();
                    async move { Ok::<_, AssetError>(clock.now()) }
                })
                .await
                .unwrap();
            starts.push(started);
        }
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test]
    async fn rate_limited_task_retries_with_growing_delays_then_fails() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(3.0, clock.clone());
        let mut calls = 0u32;
        let result: Result<()> = limiter
            .schedule(|| {
                calls += 1;
                async { Err(rate_limited()) }
            })
            .await;

        assert!(matches!(result, Err(AssetError::RateLimited { .. })));
        assert_eq!(calls, 5);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
        assert_eq!(limiter.consecutive_errors().await, 1);
    }

    #[tokio::test]
    async fn non_rate_limit_error_is_not_retried() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(3.0, clock.clone());
        let mut calls = 0u32;
        let result: Result<()> = limiter
            .schedule(|| {
                calls += 1;
                async {
                    Err(AssetError::AuthFailed {
                        status: 401,
                        endpoint: "rpc".to_string(),
                    })
                }
            })
            .await;
        assert!(result.unwrap_err().is_auth_failure());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn failure_adds_congestion_until_next_success() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(1000.0, clock.clone());

        let _ = limiter
            .schedule(|| async { Err::<(), _>(AssetError::Network("reset".to_string())) })
            .await;
        assert_eq!(limiter.consecutive_errors().await, 1);

        clock.clear_sleeps();
        limiter.schedule(|| async { Ok::<_, AssetError>(()) }).await.unwrap();
        assert_eq!(limiter.consecutive_errors().await, 0);
        assert!(clock.sleeps().iter().any(|d| *d >= Duration::from_secs(1)));
    }

    #[test]
    fn tiny_rate_is_clamped_instead_of_overflowing() {
        let limiter = RateLimiter::new(1e-20, Arc::new(ManualClock::new()));
        assert_eq!(limiter.min_interval(), Duration::from_secs(1000));
        let limiter = RateLimiter::new(f64::NAN, Arc::new(ManualClock::new()));
        assert_eq!(
            limiter.min_interval(),
            Duration::from_secs_f64(1.0 / DEFAULT_REQUESTS_PER_SECOND)
        );
    }

    #[tokio::test]
    async fn queued_tasks_run_one_at_a_time_in_order() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::new(1000.0, clock));
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));

        // join_all polls every future once in order, so the tasks queue on the limiter as 0..6.
        let tasks = (0..6u8).map(|i| {
            let limiter = limiter.clone();
            let events = events.clone();
            async move {
                limiter
                    .schedule(|| {
                        let events = events.clone();
                        async move {
                            events.lock().unwrap().push(format!("start {i}"));
                            tokio::task::yield_now().await;
                            events.lock().unwrap().push(format!("end {i}"));
                            if i == 2 {
                                Err(AssetError::AuthFailed {
                                    status: 401,
                                    endpoint: "rpc".to_string(),
                                })
                            } else {
                                Ok(i)
                            }
                        }
                    })
                    .await
            }
        });
        let results = futures::future::join_all(tasks).await;

        let expected: Vec<String> = (0..6)
            .flat_map(|i| [format!("start {i}"), format!("end {i}")])
            .collect();
        assert_eq!(*events.lock().unwrap(), expected);
        assert!(results[2].as_ref().unwrap_err().is_auth_failure());
        let succeeded: Vec<u8> = results.into_iter().filter_map(Result::ok).collect();
        assert_eq!(succeeded, vec![0, 1, 3, 4, 5]);
        assert_eq!(limiter.consecutive_errors().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spawned_tasks_never_overlap() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let limiter = Arc::new(RateLimiter::new(1000.0, Arc::new(ManualClock::new())));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let limiter = limiter.clone();
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    limiter
                        .schedule(|| {
                            let in_flight = in_flight.clone();
                            let peak = peak.clone();
                            async move {
                                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                tokio::task::yield_now().await;
                                in_flight.fetch_sub(1, Ordering::SeqCst);
                                if i % 3 == 0 {
                                    Err(AssetError::Network("reset".to_string()))
                                } else {
                                    Ok(i)
                                }
                            }
                        })
                        .await
                })
            })
            .collect();

        let mut finished = 0;
        for handle in handles {
            let _ = handle.await.unwrap();
            finished += 1;
        }
        assert_eq!(finished, 8);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_task_does_not_block_queue() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(10.0, clock);
        let failed: Result<u8> = limiter
            .schedule(|| async { Err(AssetError::Network("down".to_string())) })
            .await;
        assert!(failed.is_err());
        let ok = limiter.schedule(|| async { Ok::<_, AssetError>(7u8) }).await;
        assert_eq!(ok.unwrap(), 7);
    }
}
