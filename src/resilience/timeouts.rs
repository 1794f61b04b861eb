//! Deadline enforcement.
//!
//! Retry sequences carry no cancellation of their own; callers bound them by
//! racing the whole sequence against a deadline here.

use std::future::Future;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Run `fut`, failing with `TIMEOUT` if it does not finish within `after`.
///
/// The inner future is dropped on timeout.
pub async fn with_timeout<T, F>(operation: &str, after: Duration, fut: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout = ?after, "Deadline exceeded");
            Err(ServiceError::timeout(operation, after))
        }
    }
}
