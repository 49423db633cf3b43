//! Store call wrappers shared by the delivery and lifecycle paths.

use parley_database::{StoreError, StoreResult};
use std::{future::Future, time::Duration};
use tracing::warn;

/// Bound a store operation to the configured deadline.
pub async fn with_timeout<T>(
    limit: Duration,
    operation: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Run a read, retrying once on a transient failure. Writes are never
/// retried; their callers surface the failure instead.
pub async fn read_with_retry<T, F, Fut>(limit: Duration, read: F) -> StoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    match with_timeout(limit, read()).await {
        Ok(value) => Ok(value),
        Err(error) if error.is_retryable() => {
            warn!(%error, "retrying store read after transient failure");
            with_timeout(limit, read()).await
        }
        Err(error) => Err(error),
    }
}
