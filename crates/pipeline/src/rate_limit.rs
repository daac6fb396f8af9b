//! Suspending rate limiter for the web stage.
//!
//! Two constraints hold at once: at most N requests in any rolling
//! one-minute window, and a minimum spacing between consecutive requests.
//! `acquire` suspends until both are satisfied; it never rejects.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Window {
    sent: VecDeque<Instant>,
}

/// Rolling-window rate limiter.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    min_interval: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, min_interval: Duration) -> Self {
        Self::with_window(max_requests, Duration::from_secs(60), min_interval)
    }

    pub fn with_window(max_requests: u32, window: Duration, min_interval: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1) as usize,
            window,
            min_interval,
            state: Mutex::new(Window {
                sent: VecDeque::new(),
            }),
        }
    }

    /// Wait until a request is allowed, then record it.
    ///
    /// The internal lock is held while waiting, so concurrent callers are
    /// released one at a time in acquisition order.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&front) = state.sent.front() {
                if now.duration_since(front) >= self.window {
                    state.sent.pop_front();
                } else {
                    break;
                }
            }

            let mut wait = Duration::ZERO;
            if let Some(&last) = state.sent.back() {
                let since_last = now.duration_since(last);
                if since_last < self.min_interval {
                    wait = self.min_interval - since_last;
                }
            }
            if state.sent.len() >= self.max_requests {
                if let Some(&front) = state.sent.front() {
                    let until_window_frees = self.window - now.duration_since(front);
                    wait = wait.max(until_window_frees);
                }
            }

            if wait.is_zero() {
                state.sent.push_back(now);
                return;
            }
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_minimum_spacing_between_requests() {
        let limiter = RateLimiter::new(100, Duration::from_millis(1_000));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        // Two spacing delays of one second each
        assert!(start.elapsed() >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_cap_suspends_until_slot_frees() {
        let limiter = RateLimiter::with_window(2, Duration::from_secs(60), Duration::ZERO);

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        // Third request must wait for the first to leave the window
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_never_rejects_under_contention() {
        let limiter = std::sync::Arc::new(RateLimiter::with_window(
            3,
            Duration::from_secs(60),
            Duration::from_millis(100),
        ));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = std::sync::Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
