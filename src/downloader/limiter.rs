//! Token-bucket admission control shared by every network caller
//!
//! One limiter instance is shared by the pagination loop and every worker, so
//! the aggregate request rate is bounded rather than each path's own rate.
//! Tokens refill one per interval up to a burst equal to the worker count.
//!
//! Waiters are admitted in arrival order, so a caller looping on `acquire`
//! cannot take every refill ahead of a worker already waiting.

use crate::config::Config;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

type DirectLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Returned when a wait for a token is abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limiter wait cancelled by shutdown")]
    Cancelled,
}

/// Shared token bucket; clones refer to the same bucket
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DirectLimiter>,
    /// Fair lock held while waiting for a token
    queue: Arc<Mutex<()>>,
    interval: Duration,
    burst: NonZeroU32,
}

impl RateLimiter {
    /// Creates a limiter adding one token every `interval`, holding at most `burst`
    ///
    /// A zero interval or burst is clamped to the smallest valid value.
    pub fn new(interval: Duration, burst: u32) -> Self {
        let interval = interval.max(Duration::from_nanos(1));
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        Self {
            inner: Arc::new(GovernorRateLimiter::direct(quota)),
            queue: Arc::new(Mutex::new(())),
            interval,
            burst,
        }
    }

    /// Limiter for one run: configured interval, burst = worker count
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.rate_interval(), config.download.workers)
    }

    /// Waits for a token unless `cancel` fires first
    ///
    /// Returns `Err(Cancelled)` at once if `cancel` is already cancelled. A
    /// cancelled wait does not consume a token and gives up its place in line.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RateLimitError::Cancelled),
            _ = self.take_turn() => Ok(()),
        }
    }

    /// Waits for a token; used where shutdown must not abandon the caller
    pub async fn wait(&self) {
        self.take_turn().await;
    }

    async fn take_turn(&self) {
        let _turn = self.queue.lock().await;
        self.inner.until_ready().await;
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .field("burst", &self.burst)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_burst_then_one_per_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 3);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut admitted_at = Vec::new();
        for _ in 0..5 {
            limiter.acquire(&cancel).await.unwrap();
            admitted_at.push(start.elapsed());
        }

        // First three come out of the burst
        for elapsed in &admitted_at[..3] {
            assert!(*elapsed < Duration::from_millis(200), "burst delayed: {:?}", elapsed);
        }

        // Fourth and fifth wait roughly one and two intervals
        assert!(admitted_at[3] >= Duration::from_millis(900), "4th: {:?}", admitted_at[3]);
        assert!(admitted_at[3] < Duration::from_millis(1500), "4th: {:?}", admitted_at[3]);
        assert!(admitted_at[4] >= Duration::from_millis(1900), "5th: {:?}", admitted_at[4]);
        assert!(admitted_at[4] < Duration::from_millis(2500), "5th: {:?}", admitted_at[4]);
    }

    #[tokio::test]
    async fn test_acquire_with_cancelled_token_returns_immediately() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let start = Instant::now();
        assert_eq!(limiter.acquire(&cancel).await, Err(RateLimitError::Cancelled));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let cancel = CancellationToken::new();

        // Drain the only token
        limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled wait should return promptly")
            .unwrap();
        assert_eq!(result, Err(RateLimitError::Cancelled));
    }

    #[tokio::test]
    async fn test_clones_share_one_bucket() {
        let limiter = RateLimiter::new(Duration::from_millis(200), 2);
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.wait().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Two from the burst, two more at ~200ms and ~400ms
        assert!(start.elapsed() >= Duration::from_millis(350), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn test_zero_burst_admits_one_caller() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 0);
        tokio::time::timeout(Duration::from_millis(100), limiter.wait())
            .await
            .expect("a zero burst is clamped to one token");
    }

    #[tokio::test]
    async fn test_waiting_worker_not_starved_by_looping_producer() {
        let limiter = RateLimiter::new(Duration::from_millis(20), 1);
        let cancel = CancellationToken::new();

        let producer = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut admitted = 0u32;
                while limiter.acquire(&cancel).await.is_ok() {
                    admitted += 1;
                }
                admitted
            })
        };

        // Let the producer drain the burst and start competing for refills
        tokio::time::sleep(Duration::from_millis(30)).await;

        tokio::time::timeout(Duration::from_millis(500), limiter.wait())
            .await
            .expect("worker should be admitted in turn");

        cancel.cancel();
        let admitted = producer.await.unwrap();
        assert!(admitted >= 1);
    }
}
