//! Retry with exponential backoff and jitter.
//!
//! Lock conflicts are the expected failure mode of this system: the server
//! refuses a lock immediately instead of queueing, and the losing client
//! backs off and reruns its transaction body. Only conflicts are retried;
//! every other error propagates on the first occurrence.

use std::time::Duration;

use rand::Rng;

use surge_common::error::TransactionError;
use surge_common::prelude::*;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        assert!(max_attempts > 0);
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Tuning used by the transfer workload.
    pub fn transfers() -> Self {
        Self::new(15, Duration::from_millis(20), Duration::from_secs(2))
    }

    /// Tuning used by balance-check transactions.
    pub fn balance_checks() -> Self {
        Self::new(10, Duration::from_millis(50), Duration::from_secs(2))
    }

    /// Backoff before retry number `attempt` (0-based):
    /// `min(base * 2^attempt, cap)` plus uniform jitter in `[0, delay/2]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(20));
        let capped = exp.min(self.max_delay);
        let half_ms = capped.as_millis() as u64 / 2;
        let jitter = if half_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=half_ms)
        };
        capped + Duration::from_millis(jitter)
    }

    /// Run `body` until it succeeds, fails with a non-conflict error, or the
    /// attempt budget runs out.
    ///
    /// The body must be idempotent by construction: each run begins its own
    /// transaction, so a conflicted attempt leaves nothing behind to undo.
    pub async fn run<T, F>(&self, mut body: F) -> Result<T>
    where
        F: AsyncFnMut() -> Result<T>,
    {
        for attempt in 0..self.max_attempts {
            match body().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_lock_conflict() => {
                    if attempt + 1 == self.max_attempts {
                        break;
                    }
                    let delay = self.backoff(attempt);
                    debug!(attempt, ?delay, "lock conflict, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(TransactionError::RetriesExhausted(self.max_attempts).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_common::{ConflictReason, Error};

    fn conflict() -> Error {
        TransactionError::LockConflict(ConflictReason::WriteLocked).into()
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(20), Duration::from_secs(2));

        for attempt in 0..10 {
            let delay = policy.backoff(attempt);
            let expected = Duration::from_millis(20 * (1 << attempt)).min(Duration::from_secs(2));
            assert!(delay >= expected, "attempt {attempt}: {delay:?} < {expected:?}");
            // Jitter adds at most half the capped delay.
            assert!(
                delay <= expected + expected / 2 + Duration::from_millis(1),
                "attempt {attempt}: {delay:?} too large"
            );
        }
    }

    #[tokio::test]
    async fn test_retries_only_lock_conflicts() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2));

        let mut calls = 0;
        let result: Result<u32> = policy
            .run(async || {
                calls += 1;
                if calls < 3 {
                    Err(conflict())
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_propagate_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2));

        let mut calls = 0;
        let result: Result<()> = policy
            .run(async || {
                calls += 1;
                Err(TransactionError::ServerSide("boom".into()).into())
            })
            .await;
        assert!(matches!(
            result,
            Err(Error::Transaction(TransactionError::ServerSide(_)))
        ));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));

        let mut calls = 0;
        let result: Result<()> = policy
            .run(async || {
                calls += 1;
                Err(conflict())
            })
            .await;
        assert!(matches!(
            result,
            Err(Error::Transaction(TransactionError::RetriesExhausted(3)))
        ));
        assert_eq!(calls, 3);
    }
}
