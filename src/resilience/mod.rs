//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Remote operation (read or write):
//!     → retries.rs (sequential attempts, backoff between failures)
//!     → backoff.rs (linear by default, exponential or custom)
//!     → idempotency.rs (writes: at most one successful submission per key)
//!     → timeouts.rs (optional deadline around the whole sequence)
//! ```
//!
//! # Design Decisions
//! - Linear backoff by default
//! - Final failure is surfaced unchanged
//! - Writes must carry an idempotency key before they may be retried

pub mod backoff;
pub mod idempotency;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffFn;
pub use idempotency::{IdempotencyKey, WriteLedger};
pub use retries::{execute, RetryExecutor, RetryPolicy};
pub use timeouts::with_timeout;
