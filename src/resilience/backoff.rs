//! Backoff functions: linear (default), exponential with jitter, or custom.

use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maps an attempt number (starting at 1) to the delay before the next one.
#[derive(Clone)]
pub enum BackoffFn {
    /// `base × attempt`.
    Linear,
    /// `base × 2^(attempt-1)`, capped at `max_delay`, optionally with up to
    /// 10% jitter.
    Exponential { max_delay: Duration, jitter: bool },
    /// Caller supplied function of the attempt number.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl BackoffFn {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        BackoffFn::Custom(Arc::new(f))
    }

    /// Delay to wait after failed attempt `attempt`.
    pub fn delay(&self, attempt: u32, base: Duration) -> Duration {
        match self {
            BackoffFn::Linear => linear_backoff(attempt, base),
            BackoffFn::Exponential { max_delay, jitter } => {
                calculate_backoff(attempt, base, *max_delay, *jitter)
            }
            BackoffFn::Custom(f) => f(attempt),
        }
    }
}

impl Default for BackoffFn {
    fn default() -> Self {
        BackoffFn::Linear
    }
}

impl fmt::Debug for BackoffFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffFn::Linear => f.write_str("Linear"),
            BackoffFn::Exponential { max_delay, jitter } => f
                .debug_struct("Exponential")
                .field("max_delay", max_delay)
                .field("jitter", jitter)
                .finish(),
            BackoffFn::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Linear backoff: attempt 1 waits `base`, attempt 2 waits `2 × base`.
pub fn linear_backoff(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(attempt)
}

/// Calculate exponential backoff delay with optional jitter.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter: bool) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // 0 to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter_ms = if jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter_ms)
}
