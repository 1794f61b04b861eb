//! Subscription handlers and crash isolation.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::events::types::ContractEvent;
use crate::observability::metrics;

/// Error returned by a handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of one handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

/// Handler for new block heights.
pub type BlockHandler = Arc<dyn Fn(u64) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Handler for normalized contract events.
pub type EventHandler =
    Arc<dyn Fn(ContractEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

pub(crate) fn block_handler<F, Fut>(f: F) -> BlockHandler
where
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |height| f(height).boxed())
}

pub(crate) fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(ContractEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Run one handler invocation, containing errors and panics.
///
/// Returns `true` when the handler completed successfully. A failure is
/// logged and counted; it never propagates to the caller.
pub(crate) async fn invoke_isolated<F>(subscription: &'static str, invoke: F) -> bool
where
    F: FnOnce() -> BoxFuture<'static, HandlerResult>,
{
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(invoke)) {
        Ok(fut) => fut,
        Err(_) => {
            tracing::error!(subscription, "Handler panicked");
            metrics::record_handler_failure(subscription);
            return false;
        }
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(subscription, error = %e, "Handler failed");
            metrics::record_handler_failure(subscription);
            false
        }
        Err(_) => {
            tracing::error!(subscription, "Handler panicked");
            metrics::record_handler_failure(subscription);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success() {
        let handler = block_handler(|_| async { Ok(()) });
        assert!(invoke_isolated("block", || handler(1)).await);
    }

    #[tokio::test]
    async fn test_error_is_contained() {
        let handler = block_handler(|h| async move { Err(format!("bad block {}", h).into()) });
        assert!(!invoke_isolated("block", || handler(1)).await);
    }

    #[tokio::test]
    async fn test_async_panic_is_contained() {
        let handler = block_handler(|h| async move {
            if h > 0 {
                panic!("handler bug");
            }
            Ok(())
        });
        assert!(!invoke_isolated("block", || handler(1)).await);
        assert!(invoke_isolated("block", || handler(0)).await);
    }
}
