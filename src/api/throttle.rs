use crate::api::error::GatewayError;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

// Type alias for the rate limiter to simplify signatures
type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Wraps every gateway call with the shared inter-call cool-down and a
/// bounded fixed-delay retry for transient failures.
///
/// Cloneable; all clones share one rate limiter so the aggregate call rate
/// stays under the exchange limit no matter how many components hold one.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DirectRateLimiter>,
    max_retries: u32,
    retry_delay: Duration,
}

impl Throttle {
    /// `cooldown` is the minimum spacing between any two gateway calls.
    pub fn new(cooldown: Duration, max_retries: u32, retry_delay: Duration) -> Self {
        let quota = Quota::with_period(cooldown.max(Duration::from_millis(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(1).unwrap()));
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    /// Run one gateway operation under the rate limiter.
    ///
    /// Retryable errors (network, 429) get up to `max_retries` attempts with
    /// a fixed delay in between; exhausting them surfaces the last error as a
    /// normal failure. Non-retryable errors are returned after one attempt.
    pub async fn call<T, F, Fut>(&self, op: &str, f: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        for attempt in 1..=self.max_retries {
            // Wait for rate limiter
            self.limiter.until_ready().await;

            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded after {} attempts", op, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        op,
                        attempt,
                        self.max_retries,
                        e,
                        self.retry_delay
                    );
                    sleep(self.retry_delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(
                            "{} failed after {} attempts: {}",
                            op,
                            self.max_retries,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }

        unreachable!("retry loop always returns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_throttle() -> Throttle {
        Throttle::new(Duration::from_millis(1), 3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let throttle = fast_throttle();
        let result = throttle.call("op", || async { Ok::<_, GatewayError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success() {
        let throttle = fast_throttle();
        let attempts = AtomicU32::new(0);

        let result = throttle
            .call("op", || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(GatewayError::RateLimited)
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_gets_single_attempt() {
        let throttle = fast_throttle();
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = throttle
            .call("op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Rejected {
                    code: -1111,
                    message: "Precision is over the maximum".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Rejected { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_error() {
        let throttle = fast_throttle();
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = throttle
            .call("op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::RateLimited)
            })
            .await;

        assert!(matches!(result, Err(GatewayError::RateLimited)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
