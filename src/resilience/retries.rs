//! Retry execution.
//!
//! # Responsibilities
//! - Re-attempt a failing operation sequentially, up to `max_attempts`
//! - Wait `backoff(attempt)` between attempts, never after the last one
//! - Return the last failure unchanged once attempts are exhausted
//! - Guard state-changing submissions with idempotency keys
//!
//! # Design Decisions
//! - The executor holds no per-call state; one instance serves all callers
//! - Reads and writes share `execute`; `execute_write` adds deduplication
//! - The backoff sleep only suspends the calling task

use alloy::primitives::TxHash;
use std::future::Future;
use std::time::Duration;

use crate::config::{BackoffStrategy, RetryConfig};
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::observability::metrics;
use crate::resilience::backoff::BackoffFn;
use crate::resilience::idempotency::{Claim, IdempotencyKey, WriteLedger};

/// Retry policy. Immutable per invocation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: BackoffFn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff: BackoffFn::Linear,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: BackoffFn::Linear,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffFn) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt, self.base_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let backoff = match config.strategy {
            BackoffStrategy::Linear => BackoffFn::Linear,
            BackoffStrategy::Exponential => BackoffFn::Exponential {
                max_delay: Duration::from_millis(config.max_delay_ms),
                jitter: config.jitter,
            },
        };
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff,
        }
    }
}

/// Sequential retry executor.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    ledger: WriteLedger,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ledger: WriteLedger::new(),
        }
    }

    /// Replace the write ledger, e.g. to change its retention.
    pub fn with_ledger(mut self, ledger: WriteLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &WriteLedger {
        &self.ledger
    }

    /// Run `operation` under the executor's default policy.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        execute(operation, &self.policy).await
    }

    /// Run `operation` under an explicit policy.
    pub async fn execute_with<T, E, F, Fut>(&self, policy: &RetryPolicy, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        execute(operation, policy).await
    }

    /// Run a state-changing submission at most once per `key`.
    ///
    /// A key that already completed returns its recorded hash without
    /// invoking `operation`. A key in flight elsewhere fails with
    /// `DUPLICATE_SUBMISSION`. When all attempts fail, or the returned future
    /// is dropped before finishing, the key is released.
    pub async fn execute_write<F, Fut>(
        &self,
        key: IdempotencyKey,
        operation: F,
    ) -> ServiceResult<TxHash>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<TxHash>>,
    {
        let claim = match self.ledger.acquire(&key) {
            Ok(claim) => claim,
            Err(Claim::Completed(tx_hash)) => {
                tracing::debug!(key = %key, tx_hash = %tx_hash, "Write already completed, skipping");
                return Ok(tx_hash);
            }
            Err(_) => {
                return Err(ServiceError::new(
                    ErrorCode::DuplicateSubmission,
                    format!("A submission with key '{}' is already in flight", key),
                )
                .with_details(serde_json::json!({ "idempotencyKey": key.as_str() })));
            }
        };

        let tx_hash = execute(operation, &self.policy).await?;
        claim.complete(tx_hash);
        Ok(tx_hash)
    }
}

/// Invoke `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// Attempts are strictly sequential. The delay after failed attempt `n` is
/// `policy.backoff(n)`; no delay follows the final attempt. The error of the
/// final attempt is returned as is.
pub async fn execute<T, E, F, Fut>(mut operation: F, policy: &RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                metrics::record_retry_attempt("success");
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!(attempt, max_attempts, error = %e, "Operation failed, retries exhausted");
                metrics::record_retry_attempt("exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(attempt, max_attempts, delay = ?delay, error = %e, "Operation failed, retrying");
                metrics::record_retry_attempt("retry");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            },
            &fast_policy(3),
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            },
            &fast_policy(0),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_error_is_returned() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = execute(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(format!("failure {}", n)) }
            },
            &fast_policy(4),
        )
        .await;

        assert_eq!(result.unwrap_err(), "failure 4");
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig::default();
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_write_completed_key_is_not_resubmitted() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let key = IdempotencyKey::from("list-1");

        for _ in 0..2 {
            let calls = calls.clone();
            let hash = executor
                .execute_write(key.clone(), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(TxHash::repeat_byte(9)) }
                })
                .await
                .unwrap();
            assert_eq!(hash, TxHash::repeat_byte(9));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_failure_releases_key() {
        let executor = RetryExecutor::new(fast_policy(2));
        let key = IdempotencyKey::from("list-2");

        let err = executor
            .execute_write(key.clone(), || async {
                Err(ServiceError::new(ErrorCode::RpcError, "rejected"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RpcError);
        assert!(executor.ledger().is_empty());

        let hash = executor
            .execute_write(key, || async { Ok(TxHash::repeat_byte(3)) })
            .await
            .unwrap();
        assert_eq!(hash, TxHash::repeat_byte(3));
    }

    #[tokio::test]
    async fn test_write_in_flight_is_rejected() {
        let executor = RetryExecutor::new(fast_policy(1));
        let key = IdempotencyKey::from("list-3");
        assert_eq!(executor.ledger().claim(&key), Claim::Acquired);

        let err = executor
            .execute_write(key, || async { Ok(TxHash::ZERO) })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateSubmission);
    }

    #[tokio::test]
    async fn test_aborted_write_releases_key() {
        let executor = RetryExecutor::new(fast_policy(1));
        let key = IdempotencyKey::from("list-4");

        let pending = {
            let executor = executor.clone();
            let key = key.clone();
            tokio::spawn(async move {
                executor
                    .execute_write(key, || std::future::pending::<ServiceResult<TxHash>>())
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(executor.ledger().len(), 1);

        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());
        assert!(executor.ledger().is_empty());
    }
}
