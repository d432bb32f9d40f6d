//! Retry with exponential backoff
//!
//! Every call to the vector store is wrapped in this policy: up to 3
//! retries when the error is transient (connection refused, timeout,
//! 502/503), starting at 100 ms and doubling up to a 5 s cap, with 30%
//! jitter so that concurrent failures do not retry in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{MemoryError, Result};

// ============================================================================
// RETRY POLICY
// ============================================================================

/// Backoff configuration for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Fraction of the delay randomized away (0.3 = up to 30% shorter/longer)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.3,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries (used by tests and dry-run paths)
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay for the given retry attempt (0-based), jitter applied
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..self.jitter);
        base.mul_f64(factor.max(0.0))
    }
}

/// Run `op` under the policy, retrying transient failures.
///
/// The operation is re-created on every attempt; non-transient errors and
/// exhausted retries surface unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt > 0 {
                    debug!(op = op_name, attempts = attempt + 1, "retries exhausted");
                }
                return Err(err);
            }
        }
    }
}

/// Wrap a future with a per-call timeout, surfacing a transient
/// `Database` error on expiry so the retry wrapper may retry it.
pub async fn with_timeout<T, Fut>(duration: Duration, op_name: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(MemoryError::database_with_transience(
            format!("{} timed out after {:?}", op_name, duration),
            true,
        )),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, MemoryError>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_recovers_within_budget() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MemoryError::database("connection refused"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MemoryError::database("request timed out")) }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MemoryError::validation("bad input")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let result: Result<()> = with_timeout(Duration::from_millis(5), "probe", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(result.unwrap_err().is_transient());
    }

    #[test]
    fn test_delay_growth_capped() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        // Far attempts hit the 5s cap
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }
}
