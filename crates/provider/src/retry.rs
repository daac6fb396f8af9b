//! Bounded exponential-backoff retry for provider calls.
//!
//! Transient upstream errors (rate limits, timeouts, 5xx-class signatures)
//! are retried with doubling, capped delays; non-retryable errors propagate
//! immediately.

use docent_core::AppResult;
use std::future::Future;
use std::time::Duration;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// HTTP status codes treated as transient
    pub retryable_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            retryable_status: vec![503, 429, 500],
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): base * 2^attempt,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }
}

/// Run `operation` with the given policy.
///
/// Performs exactly `max_retries + 1` attempts when every attempt fails
/// transiently. Non-transient errors propagate on the spot.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient(&policy.retryable_status) {
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(
                        label,
                        attempts = policy.max_retries + 1,
                        error = %err,
                        "all attempts failed"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    label,
                    attempt = attempt + 1,
                    total = policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_core::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            retryable_status: vec![503, 429, 500],
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            retryable_status: vec![503],
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8_000));
        // Capped
        assert_eq!(policy.delay_for(4), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_delays_non_decreasing() {
        let policy = fast_policy();
        let mut last = Duration::ZERO;
        for attempt in 0..8 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= last);
            assert!(delay <= policy.max_delay);
            last = delay;
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_perform_exact_attempt_count() {
        let policy = fast_policy();
        let attempts = AtomicUsize::new(0);

        let result: AppResult<()> = retry(&policy, "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::provider(Some(503), "unavailable")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            attempts.load(Ordering::SeqCst),
            policy.max_retries as usize + 1
        );
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let policy = fast_policy();
        let attempts = AtomicUsize::new(0);

        let result: AppResult<()> = retry(&policy, "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::provider(Some(400), "bad request")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let policy = fast_policy();
        let attempts = AtomicUsize::new(0);

        let result = retry(&policy, "test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::provider(Some(429), "rate limited"))
                } else {
                    Ok("answer")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
